//! Summary generator: TL;DR, SEO keywords, social summary, meta
//! description. The TL;DR is prepended to the assembled markdown as a
//! blockquote separated from the body by a rule.

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{ChatRequest, TieredLlm};
use crate::prompts;
use crate::state::ArticleState;
use crate::types::NodeKind;
use crate::utils::json_ext::extract_json_object;
use crate::utils::text::truncate_chars;

use super::{Agent, AgentContext, AgentError};

pub struct SummaryGeneratorAgent {
    llm: TieredLlm,
}

impl SummaryGeneratorAgent {
    pub fn new(llm: TieredLlm) -> Self {
        SummaryGeneratorAgent { llm }
    }
}

#[async_trait]
impl Agent for SummaryGeneratorAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::SummaryGenerator
    }

    async fn run(&self, state: &mut ArticleState, _ctx: &AgentContext) -> Result<(), AgentError> {
        if state.final_markdown.is_empty() {
            return Ok(());
        }
        let title = state
            .outline
            .as_ref()
            .map(|o| o.title.clone())
            .unwrap_or_else(|| state.topic.clone());
        let prompt = prompts::summary_generator(&title, &state.final_markdown);
        let response = match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("summary_generator"))
            .await
        {
            Ok(r) => r,
            Err(err) => {
                state.record_node_error(format!("summary generation failed: {err}"));
                return Ok(());
            }
        };
        let Ok(map) = extract_json_object(&response) else {
            state.record_node_error("summary payload unparseable".to_string());
            return Ok(());
        };

        let tldr = map
            .get("tldr")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        state.seo_keywords = map
            .get("seo_keywords")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        state.social_summary = map
            .get("social_summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        state.meta_description = truncate_chars(
            map.get("meta_description")
                .and_then(Value::as_str)
                .unwrap_or_default(),
            150,
        );

        if !tldr.is_empty() {
            state.final_markdown = format!(
                "> **TL;DR**: {tldr}\n\n---\n\n{}",
                state.final_markdown
            );
        }
        tracing::info!(
            keywords = state.seo_keywords.len(),
            tldr_chars = tldr.chars().count(),
            "summary generation complete"
        );
        Ok(())
    }
}
