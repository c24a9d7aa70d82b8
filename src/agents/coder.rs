//! Coder: fills `[CODE: <id> - <description>]` placeholders with runnable
//! code blocks.
//!
//! Generation is split from application: `generate` fans out one LLM call
//! per placeholder over a state snapshot and returns blocks plus the text
//! replacements, so the coder-and-artist node can run it concurrently with
//! the artist and apply both result sets serially.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use crate::article::CodeBlock;
use crate::executor::{ParallelTask, TaskConfig};
use crate::llm::{ChatRequest, TieredLlm};
use crate::prompts;
use crate::state::ArticleState;
use crate::utils::json_ext::extract_json_object;

use super::AgentContext;

fn code_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[CODE:\s*([A-Za-z0-9_]+)\s*-\s*([^\]]+)\]").expect("valid regex")
    })
}

/// One placeholder found in a section.
#[derive(Clone, Debug)]
pub struct CodePlaceholder {
    pub section_idx: usize,
    pub placeholder_text: String,
    pub code_id: String,
    pub description: String,
}

/// Everything the coder wants to change, computed against a snapshot.
#[derive(Debug, Default)]
pub struct CoderOutput {
    pub blocks: Vec<CodeBlock>,
    /// `(section_idx, placeholder_text, code_id)` replacements.
    pub replacements: Vec<(usize, String, String)>,
}

#[derive(Clone)]
pub struct CoderAgent {
    llm: TieredLlm,
}

impl CoderAgent {
    pub fn new(llm: TieredLlm) -> Self {
        CoderAgent { llm }
    }

    /// Scan all sections for code placeholders, in section order.
    pub fn extract_placeholders(state: &ArticleState) -> Vec<CodePlaceholder> {
        let mut found = Vec::new();
        for (section_idx, section) in state.sections.iter().enumerate() {
            for caps in code_placeholder_re().captures_iter(&section.content) {
                found.push(CodePlaceholder {
                    section_idx,
                    placeholder_text: caps[0].to_string(),
                    code_id: caps[1].to_string(),
                    description: caps[2].trim().to_string(),
                });
            }
        }
        found
    }

    /// Generate blocks for every placeholder in parallel.
    pub async fn generate(&self, state: &ArticleState, ctx: &AgentContext) -> CoderOutput {
        let placeholders = Self::extract_placeholders(state);
        if placeholders.is_empty() {
            return CoderOutput::default();
        }
        tracing::info!(count = placeholders.len(), "generating code blocks");

        let tasks: Vec<ParallelTask<CodeBlock>> = placeholders
            .iter()
            .map(|ph| {
                let llm = self.llm.clone();
                let prompt = prompts::coder_generate(
                    &ph.code_id,
                    &ph.description,
                    state
                        .sections
                        .get(ph.section_idx)
                        .map(|s| s.content.as_str())
                        .unwrap_or(""),
                    &state.topic,
                );
                let code_id = ph.code_id.clone();
                ParallelTask::new(format!("code-{code_id}"), async move {
                    let response = llm
                        .chat(ChatRequest::new(prompt).json().caller("coder"))
                        .await
                        .map_err(|e| e.to_string())?;
                    let map = extract_json_object(&response).map_err(|e| e.to_string())?;
                    let field = |key: &str| -> String {
                        map.get(key)
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    };
                    let code = field("code");
                    if code.is_empty() {
                        return Err("model returned no code".to_string());
                    }
                    Ok(CodeBlock {
                        id: code_id,
                        language: field("language"),
                        code,
                        output: field("output"),
                        explanation: field("explanation"),
                    })
                })
            })
            .collect();

        let outcomes = ctx
            .executor
            .run_parallel(
                tasks,
                TaskConfig::new("code_generation")
                    .timeout(Duration::from_secs(120))
                    .max_workers(ctx.workers()),
            )
            .await;

        let mut output = CoderOutput::default();
        for (ph, outcome) in placeholders.into_iter().zip(outcomes) {
            match outcome.result {
                Some(block) => {
                    output.replacements.push((
                        ph.section_idx,
                        ph.placeholder_text,
                        block.id.clone(),
                    ));
                    output.blocks.push(block);
                }
                None => {
                    tracing::warn!(
                        id = %ph.code_id,
                        error = ?outcome.error,
                        "code generation failed, placeholder will be dropped at assembly"
                    );
                }
            }
        }
        output
    }

    /// Apply generated blocks: rewrite placeholders to `[CODE:id]`
    /// references and record the ids on their sections.
    pub fn apply(state: &mut ArticleState, output: CoderOutput) {
        for (section_idx, placeholder_text, code_id) in &output.replacements {
            if let Some(section) = state.sections.get_mut(*section_idx) {
                section.content = section
                    .content
                    .replace(placeholder_text, &format!("[CODE:{code_id}]"));
                if !section.code_ids.contains(code_id) {
                    section.code_ids.push(code_id.clone());
                }
            }
        }
        state.code_blocks.extend(output.blocks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Section;
    use crate::state::ArticleRequest;

    #[test]
    fn placeholders_are_extracted_in_order() {
        let mut state = ArticleState::new(&ArticleRequest::new("t"));
        state.sections = vec![
            Section {
                id: "s1".into(),
                title: "one".into(),
                content: "intro [CODE: code_1 - hello world example] end".into(),
                ..Default::default()
            },
            Section {
                id: "s2".into(),
                title: "two".into(),
                content: "[CODE: code_2 - async demo]".into(),
                ..Default::default()
            },
        ];
        let found = CoderAgent::extract_placeholders(&state);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].code_id, "code_1");
        assert_eq!(found[0].description, "hello world example");
        assert_eq!(found[1].section_idx, 1);
    }

    #[test]
    fn apply_rewrites_placeholders_and_records_ids() {
        let mut state = ArticleState::new(&ArticleRequest::new("t"));
        state.sections = vec![Section {
            id: "s1".into(),
            title: "one".into(),
            content: "before [CODE: code_1 - demo] after".into(),
            ..Default::default()
        }];
        let output = CoderOutput {
            blocks: vec![CodeBlock {
                id: "code_1".into(),
                language: "rust".into(),
                code: "fn main() {}".into(),
                ..Default::default()
            }],
            replacements: vec![(0, "[CODE: code_1 - demo]".into(), "code_1".into())],
        };
        CoderAgent::apply(&mut state, output);
        assert_eq!(state.sections[0].content, "before [CODE:code_1] after");
        assert_eq!(state.sections[0].code_ids, vec!["code_1"]);
        assert_eq!(state.code_blocks.len(), 1);
    }
}
