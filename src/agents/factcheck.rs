//! Fact checker: claims are examined against the cited sources.

use async_trait::async_trait;

use crate::article::ReviewIssue;
use crate::llm::{ChatRequest, TieredLlm};
use crate::prompts;
use crate::state::ArticleState;
use crate::types::NodeKind;
use crate::utils::json_ext::extract_json_object;

use super::{Agent, AgentContext, AgentError};

pub struct FactCheckAgent {
    llm: TieredLlm,
}

impl FactCheckAgent {
    pub fn new(llm: TieredLlm) -> Self {
        FactCheckAgent { llm }
    }
}

#[async_trait]
impl Agent for FactCheckAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::FactCheck
    }

    async fn run(&self, state: &mut ArticleState, _ctx: &AgentContext) -> Result<(), AgentError> {
        if state.sections.is_empty() {
            return Ok(());
        }
        let document: String = state
            .sections
            .iter()
            .map(|s| format!("## {}\n\n{}", s.title, s.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = prompts::factcheck(&document, &state.search_results);
        match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("factcheck"))
            .await
        {
            Ok(response) => {
                if let Ok(map) = extract_json_object(&response) {
                    let issues: Vec<ReviewIssue> = map
                        .get("issues")
                        .cloned()
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    tracing::info!(count = issues.len(), "fact check complete");
                    state.factcheck_issues = issues;
                }
            }
            Err(err) => state.record_node_error(format!("fact check failed: {err}")),
        }
        Ok(())
    }
}
