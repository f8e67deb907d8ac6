//! Default instruction templates.
//!
//! Loaded once from `<dir>/<name>.txt`; any file that is missing falls back to
//! the built-in text so the service can run without a templates directory.

use std::path::{Path, PathBuf};

/// The four named templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    System,
    Primary,
    SecondaryReduction,
    FinalReduction,
}

impl PromptKind {
    pub const ALL: [PromptKind; 4] = [
        PromptKind::System,
        PromptKind::Primary,
        PromptKind::SecondaryReduction,
        PromptKind::FinalReduction,
    ];

    /// File stem of the template, also the request field name.
    pub fn name(self) -> &'static str {
        match self {
            PromptKind::System => "system_prompt",
            PromptKind::Primary => "primary_prompt",
            PromptKind::SecondaryReduction => "secondary_reduction_prompt",
            PromptKind::FinalReduction => "final_reduction_prompt",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            PromptKind::System => {
                "You are a careful summarization assistant. Preserve names, dates, figures \
                 and locations exactly as they appear in the source."
            }
            PromptKind::Primary => {
                "You are performing the first phase of a nested map-reduce summarization. \
                 Summarize the following sections, keeping every concrete detail."
            }
            PromptKind::SecondaryReduction => {
                "Combine the following partial summaries into one coherent summary. \
                 Merge duplicates but do not drop distinct facts."
            }
            PromptKind::FinalReduction => {
                "You are performing the final phase of a nested map-reduce summarization. \
                 Write a polished final summary that integrates all major themes and details."
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Template {} is empty", .0.display())]
    Empty(PathBuf),
}

/// Resolved default texts for all four instructions.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    system: String,
    primary: String,
    secondary_reduction: String,
    final_reduction: String,
}

impl PromptTemplates {
    /// Templates made only of the built-in texts.
    pub fn builtin() -> Self {
        Self {
            system: PromptKind::System.builtin().to_string(),
            primary: PromptKind::Primary.builtin().to_string(),
            secondary_reduction: PromptKind::SecondaryReduction.builtin().to_string(),
            final_reduction: PromptKind::FinalReduction.builtin().to_string(),
        }
    }

    /// Load every template from `dir`, keeping the built-in text for missing files.
    ///
    /// Unreadable or empty files are errors; a missing file is not.
    pub fn load(dir: &Path) -> Result<Self, TemplateError> {
        let mut templates = Self::builtin();
        for kind in PromptKind::ALL {
            let path = dir.join(format!("{}.txt", kind.name()));
            if !path.exists() {
                tracing::info!(
                    "No template at {}, using built-in {}",
                    path.display(),
                    kind.name()
                );
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|source| TemplateError::Read {
                path: path.clone(),
                source,
            })?;
            if text.trim().is_empty() {
                return Err(TemplateError::Empty(path));
            }
            tracing::debug!("Loaded template {}", path.display());
            templates.set(kind, text);
        }
        Ok(templates)
    }

    pub fn get(&self, kind: PromptKind) -> &str {
        match kind {
            PromptKind::System => &self.system,
            PromptKind::Primary => &self.primary,
            PromptKind::SecondaryReduction => &self.secondary_reduction,
            PromptKind::FinalReduction => &self.final_reduction,
        }
    }

    fn set(&mut self, kind: PromptKind, text: String) {
        match kind {
            PromptKind::System => self.system = text,
            PromptKind::Primary => self.primary = text,
            PromptKind::SecondaryReduction => self.secondary_reduction = text,
            PromptKind::FinalReduction => self.final_reduction = text,
        }
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}
