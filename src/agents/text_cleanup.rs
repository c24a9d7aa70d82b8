//! Text cleanup node: the deterministic regex pass, zero LLM calls.

use async_trait::async_trait;

use crate::postprocess::apply_text_cleanup;
use crate::state::ArticleState;
use crate::types::NodeKind;

use super::{Agent, AgentContext, AgentError};

#[derive(Debug, Default)]
pub struct TextCleanupAgent;

#[async_trait]
impl Agent for TextCleanupAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::TextCleanup
    }

    async fn run(&self, state: &mut ArticleState, _ctx: &AgentContext) -> Result<(), AgentError> {
        let mut total_fixes = 0usize;
        for section in &mut state.sections {
            if section.content.is_empty() {
                continue;
            }
            let report = apply_text_cleanup(&section.content);
            if report.fixes > 0 {
                tracing::info!(section = %section.title, fixes = report.fixes, "text cleanup");
                total_fixes += report.fixes;
            }
            section.content = report.text;
        }
        tracing::info!(total_fixes, "text cleanup complete");
        Ok(())
    }
}
