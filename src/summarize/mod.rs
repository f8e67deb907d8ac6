//! Map-reduce summarization core.
//!
//! - `planner`: splits paragraphs into primary groups
//! - `bus`: per-task event fan-out
//! - `executor`: the three reduction stages
//! - `stream`: live stream / aggregated consumers of a task
//! - `job`, `prompts`: per-request parameters and default instructions

pub mod bus;
pub mod events;
pub mod executor;
pub mod job;
pub mod planner;
pub mod prompts;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use bus::{EventBus, Subscription, TaskId, TaskProgress};
pub use events::SummaryEvent;
pub use executor::{SummarizeError, Summarizer};
pub use job::{InstructionOverrides, Instructions, SummaryConfig, SummaryJob};
pub use planner::{plan, ChunkPlan, SECONDARY_GROUP_SIZE};
pub use prompts::{PromptKind, PromptTemplates, TemplateError};
pub use stream::{AggregatedSummary, SummaryRun};
