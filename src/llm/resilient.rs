//! Resilience decorator for LLM clients.
//!
//! Adds three behaviors on top of any [`LlmClient`]:
//! - truncation retry (bounded),
//! - rate-limit retry with exponential backoff and jitter,
//! - a process-wide minimum inter-request interval, enforced through a
//!   mutex-guarded timestamp shared by all clones of the decorator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{ChatRequest, ChunkSink, LlmClient, LlmError, TokenTracker};

/// Shared pacing gate. Inject one instance into every client that must
/// share the rate budget; do not create one per call site.
#[derive(Clone, Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        RequestPacer {
            min_interval,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    async fn wait_turn(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        RequestPacer::new(Duration::from_secs(1))
    }
}

/// Retry/backoff wrapper around an inner client.
pub struct ResilientClient {
    inner: Arc<dyn LlmClient>,
    pacer: RequestPacer,
    max_retries: u32,
    base_backoff: Duration,
}

impl ResilientClient {
    pub fn new(inner: Arc<dyn LlmClient>, pacer: RequestPacer) -> Self {
        ResilientClient {
            inner,
            pacer,
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    fn backoff_for(&self, attempt: u32, error: &LlmError) -> Duration {
        if let LlmError::RateLimited {
            retry_after_secs: Some(secs),
        } = error
        {
            return Duration::from_secs(*secs);
        }
        let exp = self.base_backoff.saturating_mul(1u32 << attempt.min(6));
        let jitter_ms = rand::random::<u64>() % 250;
        exp + Duration::from_millis(jitter_ms)
    }
}

#[async_trait]
impl LlmClient for ResilientClient {
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        loop {
            self.pacer.wait_turn().await;
            match self.inner.chat(request.clone()).await {
                Ok(text) if text.trim().is_empty() => {
                    if attempt >= self.max_retries {
                        return Err(LlmError::EmptyResponse);
                    }
                }
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let wait = self.backoff_for(attempt, &err);
                    tracing::warn!(
                        caller = %request.caller,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        %err,
                        "retryable LLM failure, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
            attempt += 1;
        }
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
        on_chunk: ChunkSink<'_>,
    ) -> Result<String, LlmError> {
        self.pacer.wait_turn().await;
        self.inner.chat_stream(request, on_chunk).await
    }

    async fn chat_with_image(
        &self,
        prompt: &str,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<String, LlmError> {
        self.pacer.wait_turn().await;
        self.inner.chat_with_image(prompt, image_base64, mime_type).await
    }

    fn token_tracker(&self) -> Option<Arc<TokenTracker>> {
        self.inner.token_tracker()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        failures: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn chat(&self, _request: ChatRequest) -> Result<String, LlmError> {
            if self.failures.fetch_sub(1, Ordering::SeqCst) > 1 {
                Err(LlmError::RateLimited {
                    retry_after_secs: None,
                })
            } else {
                Ok("recovered".into())
            }
        }
    }

    #[tokio::test]
    async fn retries_rate_limits_until_success() {
        let client = ResilientClient::new(
            Arc::new(FlakyClient {
                failures: AtomicU32::new(3),
            }),
            RequestPacer::new(Duration::from_millis(0)),
        )
        .with_base_backoff(Duration::from_millis(1));
        let out = client.chat(ChatRequest::new("x")).await.unwrap();
        assert_eq!(out, "recovered");
    }

    struct AlwaysTruncated;

    #[async_trait]
    impl LlmClient for AlwaysTruncated {
        async fn chat(&self, _request: ChatRequest) -> Result<String, LlmError> {
            Err(LlmError::Truncated { emitted: 10 })
        }
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let client = ResilientClient::new(
            Arc::new(AlwaysTruncated),
            RequestPacer::new(Duration::from_millis(0)),
        )
        .with_max_retries(2)
        .with_base_backoff(Duration::from_millis(1));
        let err = client.chat(ChatRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, LlmError::Truncated { .. }));
    }

    #[tokio::test]
    async fn pacer_spaces_out_calls() {
        let pacer = RequestPacer::new(Duration::from_millis(30));
        let start = Instant::now();
        pacer.wait_turn().await;
        pacer.wait_turn().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
