//! Scripted in-memory LLM used by the pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use uuid::Uuid;

use crate::llm::{ChatMessage, ChatOptions, LlmClient, LlmError, Role, TokenStream};

use super::job::{Instructions, SummaryConfig, SummaryJob};

type DelayFn = Box<dyn Fn(&str) -> Duration + Send + Sync>;

/// Answers `complete` with `"summary of <first item>"` and streams `tokens`.
pub struct ScriptedLlm {
    pub delay: Duration,
    /// Per-call delay chosen from the first content item, overriding `delay`.
    delay_by: Option<DelayFn>,
    pub tokens: Vec<String>,
    /// Fail any call whose user message contains this text.
    pub fail_when: Option<(String, LlmError)>,
    pub calls: AtomicUsize,
    pub completed_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// User messages of every call, in call order.
    pub prompts: Mutex<Vec<String>>,
}

/// First item after the `Content:` header of a user instruction.
pub fn first_item(user: &str) -> &str {
    user.split_once("Content:\n")
        .map(|(_, content)| content.split("\n\n").next().unwrap_or(content))
        .unwrap_or(user)
}

fn user_message(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(5),
            tokens: vec!["The ".into(), "final ".into(), "summary.".into()],
            fail_when: None,
            calls: AtomicUsize::new(0),
            completed_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            delay_by: None,
        }
    }

    pub fn with_delay_by(
        mut self,
        delay_by: impl Fn(&str) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay_by = Some(Box::new(delay_by));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn record(&self, messages: &[ChatMessage]) -> String {
        let user = user_message(messages).to_string();
        self.prompts.lock().unwrap().push(user.clone());
        user
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, needle: &str, error: LlmError) -> Self {
        self.fail_when = Some((needle.to_string(), error));
        self
    }

    fn check(&self, messages: &[ChatMessage]) -> Result<(), LlmError> {
        if let Some((needle, error)) = &self.fail_when {
            if messages.iter().any(|m| m.content.contains(needle.as_str())) {
                return Err(error.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = self.record(messages);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let item = first_item(&user);
        let delay = self.delay_by.as_ref().map_or(self.delay, |f| f(item));
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.check(messages)?;
        self.completed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("summary of {}", item))
    }

    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<TokenStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.record(messages);
        self.check(messages)?;
        let delay = self.delay;
        let tokens = self.tokens.clone();
        Ok(futures::stream::iter(tokens)
            .then(move |t| async move {
                tokio::time::sleep(delay).await;
                Ok(t)
            })
            .boxed())
    }
}

pub fn instructions() -> Instructions {
    Instructions {
        system: "system instruction".into(),
        primary: "primary instruction".into(),
        secondary: "secondary instruction".into(),
        final_reduction: "final instruction".into(),
    }
}

pub fn job(paragraphs: usize, config: SummaryConfig) -> SummaryJob {
    SummaryJob {
        task_id: Uuid::new_v4(),
        paragraphs: (0..paragraphs).map(|i| format!("paragraph {}", i)).collect(),
        config,
        instructions: instructions(),
    }
}
