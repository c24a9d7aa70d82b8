//! Questioner: the critic half of the depth and quality loops.
//!
//! As a node it runs the per-section depth check in parallel. Its
//! `evaluate_section` operation drives the section-evaluate node.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::article::{DepthVerdict, SectionEvaluation, SectionScores, VaguePoint};
use crate::executor::{ParallelTask, TaskConfig};
use crate::llm::{ChatRequest, TieredLlm};
use crate::prompts;
use crate::state::ArticleState;
use crate::types::{DepthRequirement, NodeKind};
use crate::utils::json_ext::extract_json_object;

use super::{Agent, AgentContext, AgentError};

#[derive(Clone)]
pub struct QuestionerAgent {
    llm: TieredLlm,
}

impl QuestionerAgent {
    pub fn new(llm: TieredLlm) -> Self {
        QuestionerAgent { llm }
    }

    /// Depth check for one section. Failures default to "detailed enough"
    /// so a flaky check never traps the workflow in the deepen loop.
    pub async fn check_depth(
        &self,
        section_content: &str,
        plan: &crate::article::SectionPlan,
        depth_requirement: DepthRequirement,
    ) -> DepthVerdict {
        let passed = DepthVerdict {
            section_id: plan.id.clone(),
            is_detailed_enough: true,
            depth_score: 80,
            vague_points: Vec::new(),
        };
        let prompt = prompts::questioner_depth(section_content, plan, depth_requirement);
        let response = match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("questioner"))
            .await
        {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(section = %plan.id, %err, "depth check failed, passing by default");
                return passed;
            }
        };
        let Ok(map) = extract_json_object(&response) else {
            return passed;
        };
        let depth_score = map
            .get("depth_score")
            .and_then(Value::as_u64)
            .unwrap_or(80)
            .min(100) as u32;
        let model_verdict = map
            .get("is_detailed_enough")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let vague_points: Vec<VaguePoint> = map
            .get("vague_points")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        DepthVerdict {
            section_id: plan.id.clone(),
            // Either signal flags the section: the model's own verdict or
            // a score under the configured bar.
            is_detailed_enough: model_verdict && depth_score >= depth_requirement.threshold(),
            depth_score,
            vague_points,
        }
    }

    /// Four-dimension critic evaluation for one section.
    pub async fn evaluate_section(
        &self,
        section_content: &str,
        section_title: &str,
        prev_summary: &str,
        next_preview: &str,
    ) -> SectionEvaluation {
        let default = SectionEvaluation {
            scores: SectionScores::default(),
            overall_quality: 7.0,
            ..Default::default()
        };
        let prompt =
            prompts::questioner_evaluate(section_content, section_title, prev_summary, next_preview);
        let response = match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("questioner.evaluate"))
            .await
        {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(section = section_title, %err, "section evaluation failed");
                return default;
            }
        };
        let Ok(map) = extract_json_object(&response) else {
            return default;
        };
        let scores: SectionScores = map
            .get("scores")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let overall = map
            .get("overall_quality")
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or_else(|| scores.mean());
        let strings = |key: &str| -> Vec<String> {
            map.get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        SectionEvaluation {
            section_idx: 0,
            scores,
            overall_quality: overall,
            specific_issues: strings("specific_issues"),
            improvement_suggestions: strings("improvement_suggestions"),
        }
    }
}

#[async_trait]
impl Agent for QuestionerAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::Questioner
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if state.sections.is_empty() {
            state.question_results = Vec::new();
            state.all_sections_detailed = true;
            return Ok(());
        }
        let plans = state
            .outline
            .as_ref()
            .map(|o| o.sections.clone())
            .unwrap_or_default();
        let depth_requirement = state.style.depth_requirement;

        let tasks: Vec<ParallelTask<DepthVerdict>> = state
            .sections
            .iter()
            .enumerate()
            .map(|(i, section)| {
                let plan = plans.get(i).cloned().unwrap_or_else(|| {
                    crate::article::SectionPlan {
                        id: section.id.clone(),
                        title: section.title.clone(),
                        ..Default::default()
                    }
                });
                let content = section.content.clone();
                let agent = self.clone();
                ParallelTask::new(format!("depth-{}", section.title), async move {
                    Ok(agent.check_depth(&content, &plan, depth_requirement).await)
                })
            })
            .collect();

        let outcomes = ctx
            .executor
            .run_parallel(
                tasks,
                TaskConfig::new("depth_check")
                    .timeout(Duration::from_secs(120))
                    .max_workers(ctx.workers()),
            )
            .await;

        let verdicts: Vec<DepthVerdict> = outcomes
            .into_iter()
            .zip(&state.sections)
            .map(|(outcome, section)| {
                outcome.result.unwrap_or(DepthVerdict {
                    section_id: section.id.clone(),
                    is_detailed_enough: true,
                    depth_score: 80,
                    vague_points: Vec::new(),
                })
            })
            .collect();

        state.all_sections_detailed = verdicts.iter().all(|v| v.is_detailed_enough);
        let shallow = verdicts.iter().filter(|v| !v.is_detailed_enough).count();
        tracing::info!(
            total = verdicts.len(),
            shallow,
            requirement = ?depth_requirement,
            "depth check complete"
        );
        state.question_results = verdicts;
        Ok(())
    }
}
