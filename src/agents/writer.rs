//! Writer: drafts every outlined section in parallel, and owns the three
//! section-rewrite operations used by the deepen, improve, and revision
//! loops.

use async_trait::async_trait;
use std::time::Duration;

use crate::article::{ReviewIssue, Section, SectionEvaluation, VaguePoint};
use crate::executor::{ParallelTask, TaskConfig};
use crate::llm::{ChatRequest, TieredLlm};
use crate::prompts;
use crate::state::ArticleState;
use crate::types::NodeKind;

use super::{Agent, AgentContext, AgentError};

#[derive(Clone)]
pub struct WriterAgent {
    llm: TieredLlm,
}

impl WriterAgent {
    pub fn new(llm: TieredLlm) -> Self {
        WriterAgent { llm }
    }

    /// The writer's LLM handle, for composite nodes that issue
    /// writer-voiced calls (knowledge enhancement).
    #[must_use]
    pub fn llm(&self) -> &TieredLlm {
        &self.llm
    }

    /// Deepen a section around flagged vague points.
    pub async fn enhance_section(
        &self,
        original_content: &str,
        vague_points: &[VaguePoint],
        section_title: &str,
    ) -> Result<String, String> {
        let prompt = prompts::writer_enhance(original_content, vague_points, section_title);
        self.llm
            .chat(ChatRequest::new(prompt).caller("writer.enhance"))
            .await
            .map_err(|e| e.to_string())
    }

    /// Correct-only rewrite: fix listed issues without expanding. The word
    /// count is capped at 110% of the original; an over-long result is
    /// discarded in favor of the original.
    pub async fn correct_section(
        &self,
        original_content: &str,
        issues: &[ReviewIssue],
        section_title: &str,
    ) -> Result<String, String> {
        let prompt = prompts::writer_correct(original_content, issues, section_title);
        let corrected = self
            .llm
            .chat(ChatRequest::new(prompt).caller("writer.correct"))
            .await
            .map_err(|e| e.to_string())?;
        let original_len = original_content.chars().count().max(1);
        let new_len = corrected.chars().count();
        if new_len * 10 > original_len * 11 {
            tracing::warn!(
                section = section_title,
                original_len,
                new_len,
                "correction exceeded 110% of original length, keeping original"
            );
            return Ok(original_content.to_string());
        }
        Ok(corrected)
    }

    /// Targeted rewrite against a critic evaluation.
    pub async fn improve_section(
        &self,
        original_content: &str,
        critique: &SectionEvaluation,
        section_title: &str,
    ) -> Result<String, String> {
        let prompt = prompts::writer_improve(original_content, critique, section_title);
        self.llm
            .chat(ChatRequest::new(prompt).caller("writer.improve"))
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Agent for WriterAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::Writer
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        let outline = state
            .outline
            .clone()
            .ok_or(AgentError::MissingInput { what: "outline" })?;

        let before_chars = state.content_word_count();
        let total = outline.sections.len();
        tracing::info!(sections = total, "writing sections");

        let tasks: Vec<ParallelTask<String>> = outline
            .sections
            .iter()
            .enumerate()
            .map(|(i, plan)| {
                let prev_summary = if i > 0 {
                    outline.sections[i - 1].title.clone()
                } else {
                    String::new()
                };
                let next_preview = outline
                    .sections
                    .get(i + 1)
                    .map(|s| s.title.clone())
                    .unwrap_or_default();
                let prompt = prompts::writer_section(
                    plan,
                    &state.topic,
                    &prev_summary,
                    &next_preview,
                    state.effective_knowledge(),
                    &state.search_results,
                    &state.verbatim_data,
                    &state.persona_prompt,
                );
                let llm = self.llm.clone();
                ParallelTask::new(format!("write-{}", plan.title), async move {
                    llm.chat(ChatRequest::new(prompt).caller("writer"))
                        .await
                        .map_err(|e| e.to_string())
                })
            })
            .collect();

        let outcomes = ctx
            .executor
            .run_parallel(
                tasks,
                TaskConfig::new("write_sections")
                    .timeout(Duration::from_secs(120))
                    .max_workers(ctx.workers()),
            )
            .await;

        // Sections land in outline order regardless of completion order;
        // a failed draft degrades to the key-concept sketch so the
        // section count always matches the outline.
        let mut sections = Vec::with_capacity(total);
        for (plan, outcome) in outline.sections.iter().zip(outcomes) {
            let content = match outcome.result {
                Some(content) if !content.trim().is_empty() => content,
                _ => {
                    let reason = outcome.error.unwrap_or_else(|| "empty draft".into());
                    state.record_node_error(format!("section '{}' draft failed: {reason}", plan.title));
                    format!("{}\n\n（本章内容待补充）", plan.key_concept)
                }
            };
            sections.push(Section::from_plan(plan, content));
        }
        state.sections = sections;

        if state.accumulated_knowledge.is_empty() {
            state.accumulated_knowledge = state.background_knowledge.clone();
        }
        let after_chars = state.content_word_count();
        tracing::info!(
            before = before_chars,
            after = after_chars,
            delta = after_chars as i64 - before_chars as i64,
            "writer word count"
        );
        ctx.emitter.log(
            "info",
            format!("drafted {total} sections ({after_chars} chars)"),
        );
        Ok(())
    }
}
