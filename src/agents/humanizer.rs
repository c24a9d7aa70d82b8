//! Humanizer: removes AI-writing tells section by section.
//!
//! Two-step flow per section: a lightweight 0-50 score first; only
//! sections under the skip threshold are rewritten. A rewrite that loses
//! any `{source_NNN}` placeholder is rolled back to the original; a length
//! change beyond plus or minus 10% is logged as a warning only. Rewritten
//! content is re-scored, with one more rewrite attempt if it still reads
//! as machine-written.

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{ChatRequest, TieredLlm};
use crate::postprocess::extract_source_placeholders;
use crate::prompts;
use crate::state::ArticleState;
use crate::types::NodeKind;
use crate::utils::json_ext::extract_json_object;

use super::{Agent, AgentContext, AgentError};

/// Re-score bar after a rewrite; below this the rewrite is retried.
const RESCORE_BAR: u32 = 35;

pub struct HumanizerAgent {
    llm: TieredLlm,
}

struct Rewrite {
    content: String,
    changes: usize,
}

impl HumanizerAgent {
    pub fn new(llm: TieredLlm) -> Self {
        HumanizerAgent { llm }
    }

    async fn score(&self, content: &str) -> Result<u32, String> {
        let prompt = prompts::humanizer_score(content);
        let response = self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("humanizer.score"))
            .await
            .map_err(|e| e.to_string())?;
        let map = extract_json_object(&response).map_err(|e| e.to_string())?;
        map.get("score")
            .and_then(|s| s.get("total"))
            .and_then(Value::as_u64)
            .map(|v| v.min(50) as u32)
            .ok_or_else(|| "score payload missing total".to_string())
    }

    async fn rewrite(&self, content: &str, audience: &str) -> Result<Rewrite, String> {
        let prompt = prompts::humanizer_rewrite(content, audience);
        let response = self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("humanizer"))
            .await
            .map_err(|e| e.to_string())?;
        let map = extract_json_object(&response).map_err(|e| e.to_string())?;
        let humanized = map
            .get("humanized_content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if humanized.trim().is_empty() {
            return Err("rewrite returned empty content".to_string());
        }
        let changes = map
            .get("changes")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        Ok(Rewrite {
            content: humanized,
            changes,
        })
    }

    /// All original placeholders must survive the rewrite.
    fn lost_placeholders(original: &str, rewritten: &str) -> Vec<String> {
        let before = extract_source_placeholders(original);
        let after = extract_source_placeholders(rewritten);
        before.into_iter().filter(|p| !after.contains(p)).collect()
    }
}

#[async_trait]
impl Agent for HumanizerAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::Humanizer
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if state.sections.is_empty() {
            return Ok(());
        }
        let skip_threshold = ctx.settings.humanizer_skip_threshold;
        let max_retries = ctx.settings.humanizer_max_retries;
        let audience = state.audience_adaptation.clone();
        let total = state.sections.len();
        let mut skipped = 0usize;
        let mut rewritten = 0usize;

        for idx in 0..total {
            let (title, content) = {
                let section = &state.sections[idx];
                (section.title.clone(), section.content.clone())
            };
            let stripped = content.trim();
            if stripped.is_empty() || (stripped.starts_with('#') && !stripped.contains('\n')) {
                skipped += 1;
                continue;
            }

            // Step 1: score. A scoring failure skips the section.
            let original_score = match self.score(&content).await {
                Ok(score) => score,
                Err(err) => {
                    tracing::warn!(section = %title, %err, "humanizer scoring failed, skipping");
                    skipped += 1;
                    continue;
                }
            };
            if original_score >= skip_threshold {
                tracing::info!(section = %title, score = original_score, "reads human enough, skipping rewrite");
                let section = &mut state.sections[idx];
                section.humanizer_score_before = Some(original_score);
                section.humanizer_skipped = true;
                skipped += 1;
                continue;
            }

            // Step 2: rewrite.
            let result = match self.rewrite(&content, &audience).await {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(section = %title, %err, "rewrite failed, keeping original");
                    let section = &mut state.sections[idx];
                    section.humanizer_score_before = Some(original_score);
                    section.humanizer_skipped = true;
                    skipped += 1;
                    continue;
                }
            };

            // Placeholder preservation gate: losing a citation rolls the
            // section back to its original content.
            let lost = Self::lost_placeholders(&content, &result.content);
            if !lost.is_empty() {
                tracing::error!(section = %title, ?lost, "rewrite lost source placeholders, rolling back");
                let section = &mut state.sections[idx];
                section.humanizer_score_before = Some(original_score);
                section.humanizer_skipped = true;
                section.humanizer_error = Some(format!("占位符丢失: {}", lost.join(", ")));
                skipped += 1;
                continue;
            }

            let original_len = content.chars().count().max(1);
            let new_len = result.content.chars().count();
            let change_ratio = (new_len as f64 - original_len as f64).abs() / original_len as f64;
            if change_ratio > 0.1 {
                tracing::warn!(
                    section = %title,
                    original_len,
                    new_len,
                    "rewrite length change exceeds 10%"
                );
            }

            // Re-score and retry once if it still reads machine-written.
            let mut humanized = result.content;
            let mut final_score = original_score;
            let mut retries = 0u32;
            while retries < max_retries {
                match self.score(&humanized).await {
                    Ok(new_score) if new_score >= RESCORE_BAR => {
                        final_score = new_score;
                        break;
                    }
                    Ok(new_score) => {
                        retries += 1;
                        tracing::info!(
                            section = %title,
                            score = new_score,
                            retries,
                            "rewritten section still scores low, retrying"
                        );
                        if let Ok(retry) = self.rewrite(&humanized, &audience).await {
                            let still_there =
                                Self::lost_placeholders(&content, &retry.content).is_empty();
                            if still_there {
                                humanized = retry.content;
                                final_score = new_score;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }

            let section = &mut state.sections[idx];
            section.content = humanized;
            section.humanizer_score_before = Some(original_score);
            section.humanizer_score_after = Some(final_score);
            section.humanizer_skipped = false;
            rewritten += 1;
            tracing::info!(
                section = %title,
                before = original_score,
                after = final_score,
                changes = result.changes,
                "section humanized"
            );
        }

        tracing::info!(total, skipped, rewritten, "humanizer complete");
        Ok(())
    }
}
