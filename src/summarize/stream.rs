//! Consumers of a running task: a live event stream or one aggregated answer.
//!
//! A [`SummaryRun`] subscribes to the task before the pipeline is spawned, so
//! no event is missed. Dropping it (normal end, client disconnect, or handler
//! cancellation) cancels the pipeline, unsubscribes and destroys the task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::Stream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::bus::{EventBus, Subscription, TaskId};
use super::events::SummaryEvent;
use super::executor::{SummarizeError, Summarizer};
use super::job::SummaryJob;

/// Result of a task consumed in aggregating mode.
#[derive(Debug, Clone)]
pub struct AggregatedSummary {
    /// Concatenated final tokens, or the error message on failure.
    pub summary: String,
    pub time_taken: Duration,
    pub error: Option<SummarizeError>,
}

impl AggregatedSummary {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

enum Next {
    Event(Option<SummaryEvent>),
    Finished(Result<(), SummarizeError>),
}

/// One task in flight, owned by the connection that requested it.
pub struct SummaryRun {
    task_id: TaskId,
    bus: Arc<EventBus>,
    subscription: Subscription,
    pipeline: Option<JoinHandle<Result<(), SummarizeError>>>,
    outcome: Option<Result<(), SummarizeError>>,
    cancel: CancellationToken,
    finished: bool,
}

impl SummaryRun {
    /// Subscribe to `job.task_id` and launch the pipeline in the background.
    ///
    /// The pipeline inherits the caller's current span.
    pub fn start(summarizer: Arc<Summarizer>, job: SummaryJob) -> Self {
        let task_id = job.task_id;
        let bus = Arc::clone(summarizer.bus());
        let subscription = bus.subscribe(task_id);
        tracing::debug!(%task_id, "Created subscriber, starting summarization in background");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let pipeline = tokio::spawn(
            async move { summarizer.run(&job, token).await }.instrument(tracing::Span::current()),
        );

        Self {
            task_id,
            bus,
            subscription,
            pipeline: Some(pipeline),
            outcome: None,
            cancel,
            finished: false,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Next event for this task; `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<SummaryEvent> {
        if self.finished {
            return None;
        }

        let event = match self.pipeline.as_mut() {
            Some(handle) => {
                let next = tokio::select! {
                    biased;
                    event = self.subscription.recv() => Next::Event(event),
                    joined = handle => Next::Finished(joined.unwrap_or_else(|e| {
                        Err(SummarizeError::Unexpected(format!("Summarization task failed: {}", e)))
                    })),
                };
                match next {
                    Next::Event(event) => event,
                    Next::Finished(outcome) => {
                        self.pipeline = None;
                        self.outcome = Some(outcome);
                        self.drain_after_exit()
                    }
                }
            }
            None => self.drain_after_exit(),
        };

        match event {
            Some(event) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(event)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// The pipeline has exited, so everything it published is already
    /// queued. Once the queue is empty without a terminal event, one is
    /// derived from the outcome.
    fn drain_after_exit(&mut self) -> Option<SummaryEvent> {
        self.subscription
            .receiver
            .try_recv()
            .ok()
            .or_else(|| self.outcome.as_ref().map(fallback_terminal))
    }

    /// Forward every event until the terminal one, inside the caller's
    /// current span.
    pub fn into_stream(self) -> impl Stream<Item = SummaryEvent> + Send {
        let span = tracing::Span::current();
        async_stream::stream! {
            let mut run = self;
            while let Some(event) = run.next_event().instrument(span.clone()).await {
                yield event;
            }
        }
    }

    /// Consume the task, keeping only the final text (or the error message).
    pub async fn aggregate(mut self) -> AggregatedSummary {
        let start = Instant::now();
        let mut tokens = Vec::new();
        let mut error_message = None;

        while let Some(event) = self.next_event().await {
            match event {
                SummaryEvent::FinalSummary { token } => tokens.push(token),
                SummaryEvent::Error { message } => error_message = Some(message),
                _ => {}
            }
        }

        let outcome = self.wait_pipeline().await;
        let time_taken = start.elapsed();
        match (error_message, outcome) {
            (None, Ok(())) => AggregatedSummary {
                summary: tokens.concat(),
                time_taken,
                error: None,
            },
            (Some(message), outcome) => {
                let error = outcome
                    .err()
                    .unwrap_or_else(|| SummarizeError::Unexpected(message.clone()));
                AggregatedSummary {
                    summary: message,
                    time_taken,
                    error: Some(error),
                }
            }
            (None, Err(e)) => AggregatedSummary {
                summary: e.to_string(),
                time_taken,
                error: Some(e),
            },
        }
    }

    async fn wait_pipeline(&mut self) -> Result<(), SummarizeError> {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        match self.pipeline.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                Err(SummarizeError::Unexpected(format!("Summarization task failed: {}", e)))
            }),
            None => Ok(()),
        }
    }
}

fn fallback_terminal(outcome: &Result<(), SummarizeError>) -> SummaryEvent {
    match outcome {
        Ok(()) => SummaryEvent::Completed {
            message: SummaryEvent::COMPLETED.to_string(),
        },
        Err(e) => SummaryEvent::Error {
            message: e.to_string(),
        },
    }
}

impl Drop for SummaryRun {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(task_id = %self.task_id, "Consumer went away, cancelling summarization");
        }
        self.cancel.cancel();
        self.bus.unsubscribe(self.task_id, self.subscription.id);
        self.bus.destroy(self.task_id);
    }
}
