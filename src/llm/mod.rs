//! LLM client contract, tier routing, resilience, and token accounting.
//!
//! The core never talks to a concrete provider. It consumes the
//! [`LlmClient`] trait and routes each agent through a [`TieredLlm`] proxy
//! that injects the agent's model tier; a [`ResilientClient`] decorator adds
//! truncation retries, rate-limit backoff, and a process-wide minimum
//! inter-request interval.

mod proxy;
mod resilient;
mod tracker;

pub use proxy::{TieredLlm, agent_tier};
pub use resilient::ResilientClient;
pub use tracker::{TokenSummary, TokenTracker, TokenUsage};

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::types::Tier;

/// One chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".into(),
            content: content.into(),
        }
    }
}

/// A chat call. Built by agents, completed (tier/caller) by the proxy.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Request a JSON object response where the provider supports it.
    pub json_response: bool,
    pub temperature: Option<f32>,
    pub thinking: bool,
    pub thinking_budget: u32,
    pub tier: Tier,
    /// Agent (and operation) this call is attributed to, e.g.
    /// `"researcher.distill"`. Drives token accounting and test stubs.
    pub caller: String,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            json_response: false,
            temperature: None,
            thinking: false,
            thinking_budget: 19_000,
            tier: Tier::Smart,
            caller: String::new(),
        }
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn thinking(mut self) -> Self {
        self.thinking = true;
        self
    }

    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }
}

/// Errors surfaced by LLM clients. `Truncated` and `RateLimited` are
/// retryable; the resilient decorator handles both.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("response truncated after {emitted} chars")]
    #[diagnostic(code(quillweave::llm::truncated))]
    Truncated { emitted: usize },

    #[error("rate limited (retry after: {retry_after_secs:?}s)")]
    #[diagnostic(code(quillweave::llm::rate_limited))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("empty response from model")]
    #[diagnostic(code(quillweave::llm::empty))]
    EmptyResponse,

    #[error("provider error: {message}")]
    #[diagnostic(code(quillweave::llm::provider))]
    Provider { message: String },

    #[error("operation not supported by this client: {what}")]
    #[diagnostic(code(quillweave::llm::unsupported))]
    Unsupported { what: &'static str },
}

impl LlmError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Truncated { .. } | LlmError::RateLimited { .. })
    }
}

/// Callback receiving streamed chunks.
pub type ChunkSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Contract every LLM backend fulfills.
///
/// `chat_stream` and `chat_with_image` have conservative defaults so
/// non-streaming, text-only clients stay trivial to implement.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError>;

    /// Stream a response; the default delegates to [`chat`](Self::chat) and
    /// delivers the full text as one chunk.
    async fn chat_stream(
        &self,
        request: ChatRequest,
        on_chunk: ChunkSink<'_>,
    ) -> Result<String, LlmError> {
        let full = self.chat(request).await?;
        on_chunk(&full);
        Ok(full)
    }

    /// Multimodal call; unsupported unless the backend overrides it.
    async fn chat_with_image(
        &self,
        _prompt: &str,
        _image_base64: &str,
        _mime_type: &str,
    ) -> Result<String, LlmError> {
        Err(LlmError::Unsupported {
            what: "chat_with_image",
        })
    }

    /// Token accounting hook; `None` when the backend does not report
    /// usage. Callers share the tracker, so the same instance must be
    /// returned on every call.
    fn token_tracker(&self) -> Option<std::sync::Arc<TokenTracker>> {
        None
    }
}
