//! Assembler: deterministic composition of the final markdown.
//!
//! Header (title, subtitle, reading time, core value, TOC from extracted
//! subheadings), body (sections joined by separators with placeholders and
//! source references resolved), footer (summary points, next steps,
//! categorized references), then separator repair. Running it twice on
//! the same state produces byte-identical output.

use async_trait::async_trait;

use crate::article::Outline;
use crate::postprocess::{
    estimate_reading_time, extract_subheadings, fix_markdown_separators, replace_placeholders,
    replace_source_references,
};
use crate::state::ArticleState;
use crate::types::NodeKind;

use super::{Agent, AgentContext, AgentError};

#[derive(Debug, Default)]
pub struct AssemblerAgent;

impl AssemblerAgent {
    fn render_header(outline: &Outline, state: &ArticleState) -> String {
        let mut out = format!("# {}\n\n", outline.title);
        if !outline.subtitle.is_empty() {
            out.push_str(&format!("*{}*\n\n", outline.subtitle));
        }
        let reading_time = if outline.reading_time > 0 {
            outline.reading_time
        } else {
            estimate_reading_time(state.content_word_count())
        };
        out.push_str(&format!("> 预计阅读时间：{reading_time} 分钟"));
        if !outline.core_value.is_empty() {
            out.push_str(&format!("\u{ff5c}核心价值：{}", outline.core_value));
        }
        out.push_str("\n\n");
        if !outline.introduction.is_empty() {
            out.push_str(&format!("{}\n\n", outline.introduction));
        }

        // Table of contents from section titles plus their ###/####
        // subheadings.
        out.push_str("## 目录\n\n");
        for (i, section) in state.sections.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, section.title));
            for sub in extract_subheadings(&section.content) {
                out.push_str(&format!("   - {}\n", sub.title));
                for child in &sub.children {
                    out.push_str(&format!("     - {}\n", child.title));
                }
            }
        }
        out.push('\n');
        out
    }

    fn render_body(state: &ArticleState) -> String {
        let parts: Vec<String> = state
            .sections
            .iter()
            .map(|section| {
                let resolved = replace_placeholders(
                    &section.content,
                    &state.code_blocks,
                    &state.images,
                    &section.image_ids,
                );
                let linked = replace_source_references(&resolved, &state.search_results);
                format!("## {}\n\n{}", section.title, linked.trim())
            })
            .collect();
        parts.join("\n\n---\n\n")
    }

    fn render_footer(outline: &Outline, state: &ArticleState) -> String {
        let mut out = String::from("\n\n---\n\n## 总结\n\n");
        for point in &outline.conclusion.summary_points {
            out.push_str(&format!("- {point}\n"));
        }
        if !outline.conclusion.next_steps.is_empty() {
            out.push_str(&format!("\n**下一步**：{}\n", outline.conclusion.next_steps));
        }
        if !state.reference_links.is_empty() {
            out.push_str("\n## 参考资料\n\n");
            for link in state.reference_links.iter().take(20) {
                out.push_str(&format!("- [{}]({})\n", link.title, link.url));
            }
        }
        out
    }

    /// Pure assembly over the state; byte-stable for a given state.
    pub fn assemble(state: &ArticleState) -> Result<String, AgentError> {
        let outline = state
            .outline
            .as_ref()
            .ok_or(AgentError::MissingInput { what: "outline" })?;
        if state.sections.is_empty() {
            return Err(AgentError::MissingInput { what: "sections" });
        }
        let document = format!(
            "{}{}{}",
            Self::render_header(outline, state),
            Self::render_body(state),
            Self::render_footer(outline, state),
        );
        Ok(fix_markdown_separators(&document))
    }
}

#[async_trait]
impl Agent for AssemblerAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::Assembler
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        match Self::assemble(state) {
            Ok(markdown) => {
                tracing::info!(
                    chars = markdown.chars().count(),
                    images = state.images.len(),
                    code_blocks = state.code_blocks.len(),
                    "document assembled"
                );
                ctx.emitter
                    .log("info", format!("assembled {} chars", markdown.chars().count()));
                state.final_markdown = markdown;
                Ok(())
            }
            Err(err) => {
                state.final_markdown = String::new();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{Conclusion, Section, SectionPlan};
    use crate::state::{ArticleRequest, ArticleState};

    fn assembled_state() -> ArticleState {
        let mut state = ArticleState::new(&ArticleRequest::new("rust async"));
        state.outline = Some(Outline {
            title: "Async Rust in Practice".into(),
            subtitle: "from futures to runtimes".into(),
            core_value: "ship reliable async services".into(),
            sections: vec![SectionPlan {
                id: "section_1".into(),
                title: "The Event Loop".into(),
                ..Default::default()
            }],
            conclusion: Conclusion {
                summary_points: vec!["futures are lazy".into()],
                next_steps: "read the tokio docs".into(),
            },
            ..Default::default()
        });
        state.sections = vec![Section {
            id: "section_1".into(),
            title: "The Event Loop".into(),
            content: "### Polling\n\nFutures are polled.\n---## Glued heading".into(),
            ..Default::default()
        }];
        state
    }

    #[test]
    fn assembly_is_byte_idempotent() {
        let state = assembled_state();
        let first = AssemblerAgent::assemble(&state).unwrap();
        let second = AssemblerAgent::assemble(&state).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn assembly_contains_header_toc_and_footer() {
        let md = AssemblerAgent::assemble(&assembled_state()).unwrap();
        assert!(md.starts_with("# Async Rust in Practice"));
        assert!(md.contains("## 目录"));
        assert!(md.contains("- Polling"));
        assert!(md.contains("futures are lazy"));
        assert!(!md.contains("---#"));
    }

    #[test]
    fn missing_sections_fail_assembly() {
        let mut state = assembled_state();
        state.sections.clear();
        assert!(AssemblerAgent::assemble(&state).is_err());
    }
}
