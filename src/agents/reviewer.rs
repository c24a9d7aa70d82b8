//! Reviewer: whole-draft quality gate.
//!
//! Scores the assembled draft, lists issues, and merges the consistency
//! checkers' findings into the issue list. Approval requires no
//! high-severity issues and a score of at least 80.

use async_trait::async_trait;
use serde_json::Value;

use crate::article::ReviewIssue;
use crate::llm::{ChatRequest, TieredLlm};
use crate::prompts;
use crate::state::ArticleState;
use crate::types::{NodeKind, Severity};
use crate::utils::json_ext::extract_json_object;

use super::{Agent, AgentContext, AgentError};

const APPROVAL_SCORE: u32 = 80;

pub struct ReviewerAgent {
    llm: TieredLlm,
}

impl ReviewerAgent {
    pub fn new(llm: TieredLlm) -> Self {
        ReviewerAgent { llm }
    }
}

#[async_trait]
impl Agent for ReviewerAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::Reviewer
    }

    async fn run(&self, state: &mut ArticleState, _ctx: &AgentContext) -> Result<(), AgentError> {
        if state.sections.is_empty() {
            state.review_score = 0;
            state.review_approved = false;
            state.review_issues = Vec::new();
            return Ok(());
        }
        let outline = state
            .outline
            .clone()
            .ok_or(AgentError::MissingInput { what: "outline" })?;

        let document: String = state
            .sections
            .iter()
            .map(|s| format!("## {}\n\n{}", s.title, s.content))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        let prompt = prompts::reviewer(
            &document,
            &outline,
            &state.verbatim_data,
            &state.learning_objectives,
            &state.style.review_guidelines,
        );

        let (score, mut issues) = match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("reviewer"))
            .await
        {
            Ok(response) => match extract_json_object(&response) {
                Ok(map) => {
                    let score = map
                        .get("score")
                        .and_then(Value::as_u64)
                        .unwrap_or(80)
                        .min(100) as u32;
                    let issues: Vec<ReviewIssue> = map
                        .get("issues")
                        .cloned()
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    (score, issues)
                }
                Err(err) => {
                    state.record_node_error(format!("review parse failed: {err}"));
                    (80, Vec::new())
                }
            },
            Err(err) => {
                // A broken reviewer must not block the pipeline.
                state.record_node_error(format!("review failed: {err}"));
                (80, Vec::new())
            }
        };

        // Fold the consistency checkers' findings into the review.
        let consistency: Vec<ReviewIssue> = state
            .thread_issues
            .iter()
            .chain(state.voice_issues.iter())
            .cloned()
            .collect();
        if !consistency.is_empty() {
            tracing::info!(count = consistency.len(), "merging consistency issues into review");
            issues.extend(consistency);
        }

        let has_high = issues.iter().any(|i| i.severity == Severity::High);
        state.review_score = score;
        state.review_approved = !has_high && score >= APPROVAL_SCORE;
        for issue in &issues {
            tracing::info!(severity = ?issue.severity, desc = %issue.description, "review issue");
        }
        state.review_issues = issues;
        tracing::info!(
            score,
            approved = state.review_approved,
            issues = state.review_issues.len(),
            "review complete"
        );
        Ok(())
    }
}
