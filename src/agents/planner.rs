//! Planner: turns research into a narrative-aware outline.
//!
//! An empty or unparseable outline is fatal; everything downstream keys
//! off it. In interactive mode the driver pauses after this node and
//! resumes with an [`OutlineDecision`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::article::Outline;
use crate::events::EventKind;
use crate::llm::{ChatRequest, TieredLlm};
use crate::profile::LengthPreset;
use crate::prompts;
use crate::state::ArticleState;
use crate::types::NodeKind;
use crate::utils::json_ext::{extract_json_object, extract_typed};

use super::{Agent, AgentContext, AgentError};

/// Caller's answer to the outline-confirmation interrupt.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OutlineDecision {
    Accept,
    /// Replace the outline; already-written sections are discarded so the
    /// writer runs against the edited plan.
    Edit { outline: Outline },
}

pub struct PlannerAgent {
    llm: TieredLlm,
}

impl PlannerAgent {
    pub fn new(llm: TieredLlm) -> Self {
        PlannerAgent { llm }
    }

    fn normalize(outline: &mut Outline, word_count: usize) {
        for (i, section) in outline.sections.iter_mut().enumerate() {
            if section.id.is_empty() {
                section.id = format!("section_{}", i + 1);
            }
        }
        if outline.reading_time == 0 {
            outline.reading_time = crate::postprocess::estimate_reading_time(word_count);
        }
    }

    async fn plan_images(&self, state: &mut ArticleState) {
        let Some(outline) = &state.outline else { return };
        let prompt = prompts::planner_image_preplan(outline, &state.article_type);
        match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("planner.image_preplan"))
            .await
        {
            Ok(response) => {
                if let Ok(map) = extract_json_object(&response) {
                    let count = map
                        .get("pregeneratable")
                        .and_then(Value::as_array)
                        .map(Vec::len)
                        .unwrap_or(0);
                    tracing::info!(count, "image preplan complete");
                }
            }
            Err(err) => state.record_node_error(format!("image preplan failed: {err}")),
        }
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::Planner
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        let preset = LengthPreset::for_length(state.target_length);
        let concepts: Vec<String> = state
            .key_concepts
            .iter()
            .map(|c| format!("- {}: {}", c.name, c.description))
            .collect();
        let prompt = prompts::planner_outline(
            &state.topic,
            &state.article_type,
            &state.target_audience,
            preset.target_sections_count,
            preset.target_word_count,
            &state.background_knowledge,
            &concepts.join("\n"),
            &state.writing_recommendations.join("\n"),
        );

        // Stream partial outline text to the event feed for UI display.
        let emitter = ctx.emitter.clone();
        let on_chunk = move |chunk: &str| {
            emitter.emit(EventKind::LlmChunk {
                stage: "planner".into(),
                chunk: chunk.to_string(),
                is_final: false,
            });
        };
        let response = self
            .llm
            .chat_stream(
                ChatRequest::new(prompt).json().caller("planner.outline"),
                &on_chunk,
            )
            .await
            .map_err(|err| AgentError::Invariant {
                message: format!("planner LLM call failed: {err}"),
            })?;

        let mut outline: Outline =
            extract_typed(&response).map_err(|err| AgentError::Invariant {
                message: format!("outline parse failed: {err}"),
            })?;
        if outline.sections.is_empty() {
            return Err(AgentError::Invariant {
                message: "planner produced an outline with no sections".into(),
            });
        }
        Self::normalize(&mut outline, preset.target_word_count);

        tracing::info!(
            title = %outline.title,
            sections = outline.sections.len(),
            mode = ?outline.narrative_mode,
            "outline ready"
        );
        state.outline = Some(outline);
        state.persona_prompt = state.style.persona_prompt();

        if ctx.settings.image_preplan_enabled {
            self.plan_images(state).await;
        }
        Ok(())
    }
}

/// Apply a resume decision to the state. Editing clears written sections
/// so the writer re-runs against the new plan.
pub fn apply_outline_decision(state: &mut ArticleState, decision: OutlineDecision) {
    match decision {
        OutlineDecision::Accept => {
            tracing::info!("outline confirmed by user");
        }
        OutlineDecision::Edit { mut outline } => {
            for (i, section) in outline.sections.iter_mut().enumerate() {
                if section.id.is_empty() {
                    section.id = format!("section_{}", i + 1);
                }
            }
            tracing::info!(title = %outline.title, "outline edited by user");
            state.outline = Some(outline);
            state.sections.clear();
        }
    }
}
