//! Per-task publish/subscribe registry.
//!
//! Each task id owns a set of unbounded subscriber channels plus the running
//! progress of its stages. The registry lock is held only for structural
//! changes and bookkeeping; sends happen after it is released.
//!
//! Delivery is best-effort: an event published for a task with no
//! subscribers is dropped, and nothing is replayed to late subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::SummaryEvent;

/// Identifier of one summarization run.
pub type TaskId = Uuid;

/// Identifier of one subscriber channel within a task.
pub type SubscriberId = u64;

/// Receiving half handed to a subscriber.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::UnboundedReceiver<SummaryEvent>,
}

impl Subscription {
    /// Wait for the next event, `None` once the task has been destroyed.
    pub async fn recv(&mut self) -> Option<SummaryEvent> {
        self.receiver.recv().await
    }
}

#[derive(Debug, Default)]
struct TaskState {
    primary_progress: u8,
    secondary_progress: u8,
    primary_results: Vec<String>,
    secondary_results: Vec<String>,
    subscribers: HashMap<SubscriberId, mpsc::UnboundedSender<SummaryEvent>>,
}

/// Point-in-time view of a live task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgress {
    pub primary_progress: u8,
    pub secondary_progress: u8,
    pub primary_results: usize,
    pub secondary_results: usize,
    pub subscribers: usize,
}

/// Registry of live tasks and their subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    tasks: RwLock<HashMap<TaskId, TaskState>>,
    next_subscriber: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber, creating the task on first use.
    pub fn subscribe(&self, task_id: TaskId) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);

        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.entry(task_id).or_default().subscribers.insert(id, tx);
        tracing::debug!(%task_id, subscriber = id, "Subscriber registered");

        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber. Unknown tasks or ids are ignored.
    pub fn unsubscribe(&self, task_id: TaskId, subscriber: SubscriberId) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = tasks.get_mut(&task_id) {
            if task.subscribers.remove(&subscriber).is_some() {
                tracing::debug!(%task_id, subscriber, "Subscriber removed");
            }
        }
    }

    /// Deliver `event` to every subscriber currently registered for the task.
    ///
    /// Returns the number of subscribers the event was handed to.
    pub fn publish(&self, task_id: TaskId, event: SummaryEvent) -> usize {
        let senders: Vec<_> = {
            let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
            let Some(task) = tasks.get_mut(&task_id) else {
                tracing::trace!(%task_id, kind = event.kind(), "No task registered, event dropped");
                return 0;
            };
            if task.subscribers.is_empty() {
                tracing::trace!(%task_id, kind = event.kind(), "No subscribers, event dropped");
                return 0;
            }
            task.record(&event);
            task.subscribers.values().cloned().collect()
        };

        let mut delivered = 0;
        for tx in senders {
            // A closed channel means the subscriber is going away; its
            // unsubscribe will follow.
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Release everything held for the task. Unknown tasks are ignored.
    pub fn destroy(&self, task_id: TaskId) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        if tasks.remove(&task_id).is_some() {
            tracing::debug!(%task_id, "Task state released");
        }
    }

    /// Snapshot of a live task, `None` if it does not exist.
    pub fn progress(&self, task_id: TaskId) -> Option<TaskProgress> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(&task_id).map(|task| TaskProgress {
            primary_progress: task.primary_progress,
            secondary_progress: task.secondary_progress,
            primary_results: task.primary_results.len(),
            secondary_results: task.secondary_results.len(),
            subscribers: task.subscribers.len(),
        })
    }

    /// Number of tasks currently holding state.
    pub fn task_count(&self) -> usize {
        self.tasks.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl TaskState {
    fn record(&mut self, event: &SummaryEvent) {
        match event {
            SummaryEvent::PrimaryProgress {
                progress, result, ..
            } => {
                self.primary_progress = self.primary_progress.max(*progress);
                self.primary_results.push(result.clone());
            }
            SummaryEvent::SecondaryProgress {
                progress, result, ..
            } => {
                self.secondary_progress = self.secondary_progress.max(*progress);
                self.secondary_results.push(result.clone());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(message: &str) -> SummaryEvent {
        SummaryEvent::Status {
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = EventBus::new();
        let task_id = Uuid::new_v4();
        let mut sub = bus.subscribe(task_id);

        assert_eq!(bus.publish(task_id, status("update")), 1);
        assert_eq!(sub.recv().await, Some(status("update")));
    }

    #[tokio::test]
    async fn test_fan_out_preserves_order() {
        let bus = EventBus::new();
        let task_id = Uuid::new_v4();
        let mut a = bus.subscribe(task_id);
        let mut b = bus.subscribe(task_id);

        for i in 0..5 {
            assert_eq!(bus.publish(task_id, status(&i.to_string())), 2);
        }
        for i in 0..5 {
            assert_eq!(a.recv().await, Some(status(&i.to_string())));
            assert_eq!(b.recv().await, Some(status(&i.to_string())));
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        tokio_test::block_on(async {
            let bus = EventBus::new();
            let task_id = Uuid::new_v4();
            assert_eq!(bus.publish(task_id, status("lost")), 0);
            assert_eq!(bus.task_count(), 0);

            // A later subscriber does not see the earlier event.
            let mut sub = bus.subscribe(task_id);
            bus.publish(task_id, status("seen"));
            assert_eq!(sub.recv().await, Some(status("seen")));
        });
    }

    #[test]
    fn test_publish_after_last_unsubscribe_keeps_nothing() {
        let bus = EventBus::new();
        let task_id = Uuid::new_v4();
        let sub = bus.subscribe(task_id);
        bus.unsubscribe(task_id, sub.id);

        let delivered = bus.publish(
            task_id,
            SummaryEvent::SecondaryProgress {
                progress: 100,
                chunk_index: 1,
                total: 1,
                result: "orphaned result".into(),
            },
        );
        assert_eq!(delivered, 0);
        let progress = bus.progress(task_id).unwrap();
        assert_eq!(progress.subscribers, 0);
        assert_eq!(progress.secondary_results, 0);
        assert_eq!(progress.secondary_progress, 0);
    }

    #[test]
    fn test_unsubscribe_and_destroy_unknown_are_noops() {
        let bus = EventBus::new();
        let task_id = Uuid::new_v4();
        bus.unsubscribe(task_id, 42);
        bus.destroy(task_id);
        assert_eq!(bus.task_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let task_id = Uuid::new_v4();
        let sub = bus.subscribe(task_id);
        let mut other = bus.subscribe(task_id);

        bus.unsubscribe(task_id, sub.id);
        assert_eq!(bus.publish(task_id, status("x")), 1);
        assert_eq!(other.recv().await, Some(status("x")));
        assert_eq!(bus.progress(task_id).unwrap().subscribers, 1);
    }

    #[tokio::test]
    async fn test_destroy_closes_channels_and_forgets_state() {
        let bus = EventBus::new();
        let task_id = Uuid::new_v4();
        let mut sub = bus.subscribe(task_id);
        bus.publish(
            task_id,
            SummaryEvent::SecondaryProgress {
                progress: 50,
                chunk_index: 1,
                total: 2,
                result: "r".into(),
            },
        );
        assert_eq!(bus.progress(task_id).unwrap().secondary_results, 1);

        bus.destroy(task_id);
        assert!(sub.recv().await.is_some());
        assert_eq!(sub.recv().await, None);
        assert!(bus.progress(task_id).is_none());

        // Same id starts from scratch.
        let _fresh = bus.subscribe(task_id);
        let progress = bus.progress(task_id).unwrap();
        assert_eq!(progress.secondary_progress, 0);
        assert_eq!(progress.secondary_results, 0);
    }

    #[tokio::test]
    async fn test_progress_tracks_highest_percentage() {
        let bus = EventBus::new();
        let task_id = Uuid::new_v4();
        let _sub = bus.subscribe(task_id);
        for (progress, idx) in [(50, 2), (100, 1)] {
            bus.publish(
                task_id,
                SummaryEvent::PrimaryProgress {
                    progress,
                    chunk_index: idx,
                    total: 2,
                    result: format!("summary {}", idx),
                },
            );
        }
        let progress = bus.progress(task_id).unwrap();
        assert_eq!(progress.primary_progress, 100);
        assert_eq!(progress.primary_results, 2);
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = std::sync::Arc::new(EventBus::new());
        let task_id = Uuid::new_v4();
        let mut sub = bus.subscribe(task_id);

        let mut handles = Vec::new();
        for i in 0..8 {
            let bus = std::sync::Arc::clone(&bus);
            handles.push(tokio::spawn(async move {
                for j in 0..10 {
                    bus.publish(task_id, status(&format!("{}-{}", i, j)));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut received = 0;
        while let Ok(_event) = sub.receiver.try_recv() {
            received += 1;
        }
        assert_eq!(received, 80);
    }
}
