//! Tier routing: the per-agent model-class registry and the transparent
//! tier-injecting proxy.

use std::sync::Arc;

use crate::types::Tier;

use super::{ChatRequest, ChunkSink, LlmClient, LlmError};

/// Default tier per agent. Overridable through
/// `AGENT_<NAME>_LLM_TIER=fast|smart|strategic`.
pub fn agent_tier(agent_name: &str) -> Tier {
    let env_key = format!("AGENT_{}_LLM_TIER", agent_name.to_ascii_uppercase());
    if let Ok(v) = std::env::var(&env_key)
        && let Some(tier) = Tier::parse(&v.to_ascii_lowercase())
    {
        return tier;
    }
    match agent_name {
        // Multi-step reasoning
        "planner" | "search_coordinator" => Tier::Strategic,
        // Cheap formatting and summarizing
        "researcher" | "artist" | "summary_generator" => Tier::Fast,
        // Quality-critical core work
        _ => Tier::Smart,
    }
}

/// Tier-injecting proxy around a shared [`LlmClient`].
///
/// Agents call it exactly as they would call the plain client; the proxy
/// stamps its tier on every request and fills in the caller when the agent
/// did not. Multimodal calls carry no tier and pass straight through to
/// the underlying client.
#[derive(Clone)]
pub struct TieredLlm {
    inner: Arc<dyn LlmClient>,
    tier: Tier,
    agent: String,
}

impl TieredLlm {
    pub fn new(inner: Arc<dyn LlmClient>, agent_name: &str) -> Self {
        TieredLlm {
            inner,
            tier: agent_tier(agent_name),
            agent: agent_name.to_string(),
        }
    }

    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    fn prepare(&self, mut request: ChatRequest) -> ChatRequest {
        request.tier = self.tier;
        if request.caller.is_empty() {
            request.caller = self.agent.clone();
        }
        request
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.inner.chat(self.prepare(request)).await
    }

    pub async fn chat_stream(
        &self,
        request: ChatRequest,
        on_chunk: ChunkSink<'_>,
    ) -> Result<String, LlmError> {
        self.inner.chat_stream(self.prepare(request), on_chunk).await
    }

    pub async fn chat_with_image(
        &self,
        prompt: &str,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<String, LlmError> {
        self.inner.chat_with_image(prompt, image_base64, mime_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Capture {
        seen: Mutex<Vec<(Tier, String)>>,
    }

    #[async_trait]
    impl LlmClient for Capture {
        async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
            self.seen
                .lock()
                .unwrap()
                .push((request.tier, request.caller.clone()));
            Ok("ok".into())
        }
    }

    #[test]
    fn registry_routes_known_agents() {
        assert_eq!(agent_tier("planner"), Tier::Strategic);
        assert_eq!(agent_tier("search_coordinator"), Tier::Strategic);
        assert_eq!(agent_tier("researcher"), Tier::Fast);
        assert_eq!(agent_tier("writer"), Tier::Smart);
        assert_eq!(agent_tier("something_new"), Tier::Smart);
    }

    #[tokio::test]
    async fn proxy_injects_tier_and_caller() {
        let capture = Arc::new(Capture {
            seen: Mutex::new(Vec::new()),
        });
        let proxy = TieredLlm::new(capture.clone(), "planner");
        proxy.chat(ChatRequest::new("hi")).await.unwrap();
        proxy
            .chat(ChatRequest::new("hi").caller("planner.outline"))
            .await
            .unwrap();
        let seen = capture.seen.lock().unwrap();
        assert_eq!(seen[0], (Tier::Strategic, "planner".to_string()));
        assert_eq!(seen[1], (Tier::Strategic, "planner.outline".to_string()));
    }
}
