//! Per-request parameters, fixed for the lifetime of one task.

use crate::llm::ChatOptions;

use super::bus::TaskId;
use super::prompts::{PromptKind, PromptTemplates};

/// Everything the pipeline needs for one task.
#[derive(Debug, Clone)]
pub struct SummaryJob {
    pub task_id: TaskId,
    pub paragraphs: Vec<String>,
    pub config: SummaryConfig,
    pub instructions: Instructions,
}

/// Sizing and sampling parameters of one summarization run.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryConfig {
    pub primary_chunk_size: usize,
    /// Accepted and logged; the secondary stage always groups in threes.
    pub secondary_chunk_size: usize,
    /// Upper bound on upstream calls in flight within one stage.
    pub max_parallel_requests: usize,
    pub temperature: f64,
    pub max_tokens_per_request: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            primary_chunk_size: 15,
            secondary_chunk_size: 10,
            max_parallel_requests: 10,
            temperature: 0.3,
            max_tokens_per_request: 700,
        }
    }
}

impl SummaryConfig {
    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens_per_request),
        }
    }
}

/// The four instruction texts of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    pub system: String,
    pub primary: String,
    pub secondary: String,
    pub final_reduction: String,
}

/// Caller-supplied replacements for the default instruction texts.
#[derive(Debug, Clone, Default)]
pub struct InstructionOverrides {
    pub system: Option<String>,
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub final_reduction: Option<String>,
}

impl Instructions {
    /// Use each override when present and non-blank, the template otherwise.
    pub fn resolve(overrides: InstructionOverrides, templates: &PromptTemplates) -> Self {
        let pick = |value: Option<String>, kind: PromptKind| match value {
            Some(v) if !v.trim().is_empty() => v,
            _ => {
                tracing::info!("No {} provided. Proceeding with default prompt", kind.name());
                templates.get(kind).to_string()
            }
        };

        Self {
            system: pick(overrides.system, PromptKind::System),
            primary: pick(overrides.primary, PromptKind::Primary),
            secondary: pick(overrides.secondary, PromptKind::SecondaryReduction),
            final_reduction: pick(overrides.final_reduction, PromptKind::FinalReduction),
        }
    }
}

/// Build the user message for one reduction call.
pub fn user_instruction(instruction: &str, items: &[String]) -> String {
    format!("{}\n\nContent:\n{}", instruction, items.join("\n\n"))
}
