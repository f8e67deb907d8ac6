//! LLM client module for interacting with language models.
//!
//! This module provides a trait-based abstraction over the text-generation
//! backend, with an OpenAI-compatible HTTP API as the primary implementation.
//! The summarization pipeline only ever sends one system and one user message
//! per call, either waiting for the full completion or consuming it as a
//! token stream.

mod error;
mod openai;

pub use error::{classify_http_status, LlmError, LlmErrorKind};
pub use openai::OpenAiClient;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a simple text message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
        }
    }

    /// The `[system, user]` pair every summarization call sends.
    pub fn instruction_pair(system: &str, user: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::new(Role::System, system),
            ChatMessage::new(Role::User, user),
        ]
    }
}

/// Sampling parameters for a completion.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Sampling temperature (0 = deterministic).
    pub temperature: Option<f64>,
    /// Maximum output tokens to generate.
    pub max_tokens: Option<u64>,
}

/// Incremental text fragments of a streamed completion.
///
/// Dropping the stream abandons the upstream request.
pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

/// Trait for LLM clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a completion and return the generated text in one piece.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, LlmError>;

    /// Run a completion and return the generated text as it is produced.
    ///
    /// Errors establishing the call are returned directly; errors mid-stream
    /// arrive as items of the stream.
    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<TokenStream, LlmError>;
}
