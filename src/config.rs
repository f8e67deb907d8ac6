//! Process configuration.
//!
//! Read once at startup from environment variables:
//! - `HOST`, `PORT` - listen address (default `127.0.0.1:8000`)
//! - `OPENAI_API_KEY` - bearer key for the generation backend (required)
//! - `BASE_URL` - OpenAI-compatible API root (default `https://api.openai.com/v1`)
//! - `LLM_MODEL` - model identifier (required)
//! - `PROMPT_TEMPLATES_DIR` - default instruction templates (default `prompt_templates`)
//! - `LLM_REQUEST_TIMEOUT_SECS` - per-call timeout for non-streaming calls (default 120)

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub templates_dir: PathBuf,
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(p) => p
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port: {}", p))?,
            None => 8000,
        };
        let request_timeout = match var("LLM_REQUEST_TIMEOUT_SECS") {
            Some(s) => Duration::from_secs(
                s.parse::<u64>()
                    .with_context(|| format!("LLM_REQUEST_TIMEOUT_SECS is not a number: {}", s))?,
            ),
            None => Duration::from_secs(120),
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            api_key: var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            base_url: var("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: var("LLM_MODEL").context("LLM_MODEL must be set")?,
            templates_dir: var("PROMPT_TEMPLATES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("prompt_templates")),
            request_timeout,
        })
    }
}
