//! Consistency checkers: narrative thread and authorial voice.
//!
//! Both run inside the consistency-check node (in parallel via the driver
//! wiring) and publish their findings into dedicated issue lists; the
//! reviewer merges them into the main review.

use async_trait::async_trait;

use crate::article::ReviewIssue;
use crate::llm::{ChatRequest, TieredLlm};
use crate::prompts;
use crate::state::ArticleState;
use crate::types::NodeKind;
use crate::utils::json_ext::extract_json_object;

use super::{Agent, AgentContext, AgentError};

fn sections_digest(state: &ArticleState) -> String {
    state
        .sections
        .iter()
        .map(|s| {
            format!(
                "## {} ({:?})\n{}",
                s.title,
                s.narrative_role,
                s.content.chars().take(1200).collect::<String>()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn parse_issues(response: &str) -> Vec<ReviewIssue> {
    extract_json_object(response)
        .ok()
        .and_then(|map| map.get("issues").cloned())
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Verifies the article actually follows its declared narrative mode.
pub struct ThreadCheckerAgent {
    llm: TieredLlm,
}

impl ThreadCheckerAgent {
    pub fn new(llm: TieredLlm) -> Self {
        ThreadCheckerAgent { llm }
    }

    pub async fn check(&self, state: &ArticleState) -> Result<Vec<ReviewIssue>, String> {
        let mode = state
            .outline
            .as_ref()
            .map(|o| format!("{:?}", o.narrative_mode))
            .unwrap_or_else(|| "WhatWhyHow".to_string());
        let prompt = prompts::thread_checker(&mode, &sections_digest(state));
        let response = self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("thread_checker"))
            .await
            .map_err(|e| e.to_string())?;
        Ok(parse_issues(&response))
    }
}

/// Verifies tone and person stay consistent across sections.
pub struct VoiceCheckerAgent {
    llm: TieredLlm,
}

impl VoiceCheckerAgent {
    pub fn new(llm: TieredLlm) -> Self {
        VoiceCheckerAgent { llm }
    }

    pub async fn check(&self, state: &ArticleState) -> Result<Vec<ReviewIssue>, String> {
        let prompt = prompts::voice_checker(&sections_digest(state));
        let response = self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("voice_checker"))
            .await
            .map_err(|e| e.to_string())?;
        Ok(parse_issues(&response))
    }
}

/// The consistency-check node: runs both checkers concurrently, honoring
/// the env and style double switches.
pub struct ConsistencyCheckAgent {
    thread: std::sync::Arc<ThreadCheckerAgent>,
    voice: std::sync::Arc<VoiceCheckerAgent>,
}

impl ConsistencyCheckAgent {
    pub fn new(
        thread: std::sync::Arc<ThreadCheckerAgent>,
        voice: std::sync::Arc<VoiceCheckerAgent>,
    ) -> Self {
        ConsistencyCheckAgent { thread, voice }
    }
}

#[async_trait]
impl Agent for ConsistencyCheckAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::ConsistencyCheck
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if state.sections.len() < 2 {
            state.thread_issues = Vec::new();
            state.voice_issues = Vec::new();
            return Ok(());
        }
        let thread_enabled = ctx.settings.thread_check_enabled && state.style.enable_thread_check;
        let voice_enabled = ctx.settings.voice_check_enabled && state.style.enable_voice_check;
        if !thread_enabled && !voice_enabled {
            state.thread_issues = Vec::new();
            state.voice_issues = Vec::new();
            return Ok(());
        }

        let snapshot = state.clone();
        let thread_fut = async {
            if thread_enabled {
                Some(self.thread.check(&snapshot).await)
            } else {
                None
            }
        };
        let voice_fut = async {
            if voice_enabled {
                Some(self.voice.check(&snapshot).await)
            } else {
                None
            }
        };
        let (thread_result, voice_result) = tokio::join!(thread_fut, voice_fut);

        state.thread_issues = match thread_result {
            Some(Ok(issues)) => issues,
            Some(Err(err)) => {
                state.record_node_error(format!("thread check failed: {err}"));
                Vec::new()
            }
            None => Vec::new(),
        };
        state.voice_issues = match voice_result {
            Some(Ok(issues)) => issues,
            Some(Err(err)) => {
                state.record_node_error(format!("voice check failed: {err}"));
                Vec::new()
            }
            None => Vec::new(),
        };
        tracing::info!(
            thread = state.thread_issues.len(),
            voice = state.voice_issues.len(),
            "consistency check complete"
        );
        Ok(())
    }
}
