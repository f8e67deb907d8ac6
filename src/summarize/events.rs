//! Events published while a summarization task runs.

use serde::{Deserialize, Serialize};

/// A progress or result notification for one task.
///
/// Serialized as `{"type": "<variant>", ...fields}`, which is the exact shape
/// written to the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SummaryEvent {
    /// One primary group has been summarized.
    PrimaryProgress {
        progress: u8,
        chunk_index: usize,
        total: usize,
        result: String,
    },
    /// One secondary group has been summarized.
    SecondaryProgress {
        progress: u8,
        chunk_index: usize,
        total: usize,
        result: String,
    },
    Status { message: String },
    /// A fragment of the final summary.
    FinalSummary { token: String },
    Completed { message: String },
    Error { message: String },
}

impl SummaryEvent {
    pub const FINAL_STAGE_STARTED: &'static str = "Generating final summary...";
    pub const COMPLETED: &'static str = "Summary generation completed";

    /// `completed` and `error` end a task's event sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SummaryEvent::Completed { .. } | SummaryEvent::Error { .. }
        )
    }

    /// The wire name of this event's variant.
    pub fn kind(&self) -> &'static str {
        match self {
            SummaryEvent::PrimaryProgress { .. } => "primary_progress",
            SummaryEvent::SecondaryProgress { .. } => "secondary_progress",
            SummaryEvent::Status { .. } => "status",
            SummaryEvent::FinalSummary { .. } => "final_summary",
            SummaryEvent::Completed { .. } => "completed",
            SummaryEvent::Error { .. } => "error",
        }
    }
}

/// Integer percentage of `done` out of `total`, truncated.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}
