//! Map-reduce pipeline over the upstream generation capability.
//!
//! Three stages run back to back: primary groups, secondary groups, then one
//! streamed final reduction. Within a stage calls race, bounded by the
//! configured parallelism; each stage waits for all of its calls before the
//! next one starts. The first failed call aborts the task.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::llm::{ChatMessage, LlmClient, LlmError};

use super::bus::EventBus;
use super::events::{percent, SummaryEvent};
use super::job::{user_instruction, Instructions, SummaryJob};
use super::planner::{self, SECONDARY_GROUP_SIZE};

/// Why a task did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummarizeError {
    /// The generation backend was unreachable or refused a call.
    #[error("LLM unavailable. {0}")]
    ServiceUnavailable(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
    #[error("Task was cancelled")]
    Cancelled,
}

impl From<LlmError> for SummarizeError {
    fn from(e: LlmError) -> Self {
        if e.is_service_unavailable() {
            SummarizeError::ServiceUnavailable(e.to_string())
        } else {
            SummarizeError::Unexpected(e.to_string())
        }
    }
}

/// The two fan-out stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Primary,
    Secondary,
}

impl Stage {
    fn instruction(self, instructions: &Instructions) -> &str {
        match self {
            Stage::Primary => &instructions.primary,
            Stage::Secondary => &instructions.secondary,
        }
    }

    fn progress_event(
        self,
        progress: u8,
        chunk_index: usize,
        total: usize,
        result: String,
    ) -> SummaryEvent {
        match self {
            Stage::Primary => SummaryEvent::PrimaryProgress {
                progress,
                chunk_index,
                total,
                result,
            },
            Stage::Secondary => SummaryEvent::SecondaryProgress {
                progress,
                chunk_index,
                total,
                result,
            },
        }
    }
}

/// Drives summarization tasks, publishing their events on the shared bus.
pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
    bus: Arc<EventBus>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmClient>, bus: Arc<EventBus>) -> Self {
        Self { llm, bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Run one task to completion.
    ///
    /// Publishes `completed` on success and exactly one `error` on failure.
    /// Cancellation stops the pipeline at its next suspension point, drops
    /// in-flight upstream calls and publishes nothing further.
    pub async fn run(
        &self,
        job: &SummaryJob,
        cancel: CancellationToken,
    ) -> Result<(), SummarizeError> {
        let task_id = job.task_id;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SummarizeError::Cancelled),
            r = self.pipeline(job) => r,
        };

        match &result {
            Ok(()) => {
                tracing::info!(%task_id, "Summary generation completed");
                self.bus.publish(
                    task_id,
                    SummaryEvent::Completed {
                        message: SummaryEvent::COMPLETED.to_string(),
                    },
                );
            }
            Err(SummarizeError::Cancelled) => {
                tracing::info!(%task_id, "Summarization cancelled");
            }
            Err(e) => {
                tracing::error!(%task_id, "Summarization failed: {}", e);
                self.bus.publish(
                    task_id,
                    SummaryEvent::Error {
                        message: e.to_string(),
                    },
                );
            }
        }
        result
    }

    async fn pipeline(&self, job: &SummaryJob) -> Result<(), SummarizeError> {
        let config = &job.config;
        let plan = planner::plan(
            &job.paragraphs,
            config.primary_chunk_size,
            config.secondary_chunk_size,
        );
        tracing::info!(
            task_id = %job.task_id,
            "Primary count: {}, secondary count: {}",
            plan.primary_groups.len(),
            plan.secondary_group_count
        );

        let primary_results = if plan.skips_primary_stage() {
            tracing::info!("Skipping to secondary processing as there is a single primary chunk");
            plan.primary_groups.into_iter().next().unwrap_or_default()
        } else {
            self.reduce(Stage::Primary, job, plan.primary_groups)
                .instrument(tracing::info_span!("primary_summarization"))
                .await?
        };

        let secondary_groups = planner::group(&primary_results, SECONDARY_GROUP_SIZE);
        let secondary_results = self
            .reduce(Stage::Secondary, job, secondary_groups)
            .instrument(tracing::info_span!("secondary_summarization"))
            .await?;

        self.bus.publish(
            job.task_id,
            SummaryEvent::Status {
                message: SummaryEvent::FINAL_STAGE_STARTED.to_string(),
            },
        );

        self.reduce_final(job, &secondary_results)
            .instrument(tracing::info_span!("final_summarization"))
            .await
    }

    /// Summarize every group concurrently, at most `max_parallel_requests` at a time.
    ///
    /// Results come back in group order regardless of completion order.
    async fn reduce(
        &self,
        stage: Stage,
        job: &SummaryJob,
        groups: Vec<Vec<String>>,
    ) -> Result<Vec<String>, SummarizeError> {
        let total = groups.len();
        // More permits than groups never helps, and tokio caps the count.
        let permits = job
            .config
            .max_parallel_requests
            .clamp(1, total.max(1))
            .min(Semaphore::MAX_PERMITS);
        let limiter = Semaphore::new(permits);
        let options = job.config.chat_options();
        let instruction = stage.instruction(&job.instructions);

        let mut in_flight = FuturesUnordered::new();
        for (index, group) in groups.iter().enumerate() {
            let limiter = &limiter;
            let options = &options;
            in_flight.push(async move {
                let _permit = limiter
                    .acquire()
                    .await
                    .map_err(|e| SummarizeError::Unexpected(e.to_string()))?;
                let messages = ChatMessage::instruction_pair(
                    &job.instructions.system,
                    &user_instruction(instruction, group),
                );
                let text = self.llm.complete(&messages, options).await?;
                Ok::<_, SummarizeError>((index, text))
            });
        }

        let mut results: Vec<Option<String>> = vec![None; total];
        let mut completed = 0;
        while let Some(outcome) = in_flight.next().await {
            // Returning here drops the remaining calls.
            let (index, text) = outcome?;
            completed += 1;
            tracing::debug!(?stage, chunk = index + 1, total, "Chunk summarized");
            self.bus.publish(
                job.task_id,
                stage.progress_event(percent(completed, total), index + 1, total, text.clone()),
            );
            results[index] = Some(text);
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Stream the final summary, publishing each token as it arrives.
    async fn reduce_final(
        &self,
        job: &SummaryJob,
        summaries: &[String],
    ) -> Result<(), SummarizeError> {
        let messages = ChatMessage::instruction_pair(
            &job.instructions.system,
            &user_instruction(&job.instructions.final_reduction, summaries),
        );
        let mut tokens = self
            .llm
            .complete_streaming(&messages, &job.config.chat_options())
            .await?;

        let mut count = 0usize;
        while let Some(token) = tokens.next().await {
            let token = token?;
            if token.is_empty() {
                continue;
            }
            count += 1;
            self.bus
                .publish(job.task_id, SummaryEvent::FinalSummary { token });
        }
        tracing::debug!(tokens = count, "Final summary streamed");
        Ok(())
    }
}
