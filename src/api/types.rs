//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::summarize::{
    InstructionOverrides, Instructions, PromptTemplates, SummaryConfig, SummaryJob,
};

/// Upper bound on paragraphs per request.
pub const MAX_PARAGRAPHS: usize = 400;
/// Minimum length of a caller-supplied instruction.
pub const MIN_PROMPT_LEN: usize = 10;
/// Upper bound on concurrent upstream calls a caller may ask for.
pub const MAX_PARALLEL_REQUESTS: usize = 100;

/// Body of `POST /summarize`.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryRequest {
    pub paragraphs: Vec<String>,
    #[serde(default)]
    pub primary_prompt: Option<String>,
    #[serde(default)]
    pub secondary_reduction_prompt: Option<String>,
    #[serde(default)]
    pub final_reduction_prompt: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub primary_chunk_size: Option<usize>,
    #[serde(default)]
    pub secondary_chunk_size: Option<usize>,
    #[serde(default)]
    pub max_parallel_requests: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens_per_request: Option<u64>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl SummaryRequest {
    /// Check every field constraint, collecting all violations.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.paragraphs.is_empty() {
            errors.push("List should have at least 1 item".to_string());
        } else if self.paragraphs.len() > MAX_PARAGRAPHS {
            errors.push(format!(
                "List should have at most {} items, got {}",
                MAX_PARAGRAPHS,
                self.paragraphs.len()
            ));
        }
        if self.paragraphs.iter().any(|p| p.trim().is_empty()) {
            errors.push("All paragraph elements must be non-empty strings".to_string());
        }

        for (name, prompt) in [
            ("primary_prompt", &self.primary_prompt),
            ("secondary_reduction_prompt", &self.secondary_reduction_prompt),
            ("final_reduction_prompt", &self.final_reduction_prompt),
            ("system_prompt", &self.system_prompt),
        ] {
            if let Some(p) = prompt {
                if p.chars().count() < MIN_PROMPT_LEN {
                    errors.push(format!(
                        "{} should have at least {} characters",
                        name, MIN_PROMPT_LEN
                    ));
                }
            }
        }

        for (name, value) in [
            ("primary_chunk_size", self.primary_chunk_size),
            ("secondary_chunk_size", self.secondary_chunk_size),
            ("max_parallel_requests", self.max_parallel_requests),
        ] {
            if value == Some(0) {
                errors.push(format!("{} should be at least 1", name));
            }
        }
        if let Some(n) = self.max_parallel_requests {
            if n > MAX_PARALLEL_REQUESTS {
                errors.push(format!(
                    "max_parallel_requests should be at most {}",
                    MAX_PARALLEL_REQUESTS
                ));
            }
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                errors.push("temperature should be between 0 and 2".to_string());
            }
        }
        if self.max_tokens_per_request == Some(0) {
            errors.push("max_tokens_per_request should be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Resolve defaults and build the job for a fresh task.
    pub fn into_job(self, task_id: Uuid, templates: &PromptTemplates) -> SummaryJob {
        let defaults = SummaryConfig::default();
        let config = SummaryConfig {
            primary_chunk_size: self.primary_chunk_size.unwrap_or(defaults.primary_chunk_size),
            secondary_chunk_size: self
                .secondary_chunk_size
                .unwrap_or(defaults.secondary_chunk_size),
            max_parallel_requests: self
                .max_parallel_requests
                .unwrap_or(defaults.max_parallel_requests),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens_per_request: self
                .max_tokens_per_request
                .unwrap_or(defaults.max_tokens_per_request),
        };
        let instructions = Instructions::resolve(
            InstructionOverrides {
                system: self.system_prompt,
                primary: self.primary_prompt,
                secondary: self.secondary_reduction_prompt,
                final_reduction: self.final_reduction_prompt,
            },
            templates,
        );

        SummaryJob {
            task_id,
            paragraphs: self.paragraphs,
            config,
            instructions,
        }
    }
}

/// Aggregated (non-streaming) answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub time_taken_sec: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
