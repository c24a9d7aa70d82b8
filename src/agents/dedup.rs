//! Cross-section semantic deduplication.
//!
//! Paragraphs repeated across sections are detected with a pluggable
//! similarity model and removed from the later section. The default model
//! is a deterministic lexical cosine over word counts; the threshold is a
//! tunable defaulting to 0.85.

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::state::ArticleState;
use crate::types::NodeKind;

use super::{Agent, AgentContext, AgentError};

/// Pluggable similarity over two text fragments, returning [0, 1].
pub trait SimilarityModel: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f32;
}

/// Cosine similarity over word-frequency vectors. Deterministic and
/// dependency-free; a host can swap in an embedding-backed model.
#[derive(Debug, Default)]
pub struct LexicalSimilarity;

impl SimilarityModel for LexicalSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f32 {
        let counts = |text: &str| -> FxHashMap<String, f32> {
            let mut map = FxHashMap::default();
            for token in text.to_lowercase().split_whitespace() {
                let cleaned: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
                if !cleaned.is_empty() {
                    *map.entry(cleaned).or_insert(0.0) += 1.0;
                }
            }
            map
        };
        let va = counts(a);
        let vb = counts(b);
        if va.is_empty() || vb.is_empty() {
            return 0.0;
        }
        let dot: f32 = va
            .iter()
            .filter_map(|(k, x)| vb.get(k).map(|y| x * y))
            .sum();
        let norm = |v: &FxHashMap<String, f32>| v.values().map(|x| x * x).sum::<f32>().sqrt();
        let denominator = norm(&va) * norm(&vb);
        if denominator == 0.0 { 0.0 } else { dot / denominator }
    }
}

pub struct CrossSectionDedup {
    model: Box<dyn SimilarityModel>,
    threshold: f32,
}

impl Default for CrossSectionDedup {
    fn default() -> Self {
        CrossSectionDedup {
            model: Box::new(LexicalSimilarity),
            threshold: 0.85,
        }
    }
}

impl CrossSectionDedup {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model(mut self, model: Box<dyn SimilarityModel>) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Remove paragraphs from later sections that near-duplicate a
    /// paragraph seen in an earlier section. Short paragraphs, headings,
    /// and fenced code are never touched.
    pub fn deduplicate(&self, state: &mut ArticleState) -> usize {
        let mut seen: Vec<String> = Vec::new();
        let mut removed = 0usize;
        for section in &mut state.sections {
            let mut kept: Vec<&str> = Vec::new();
            let mut in_code = false;
            for paragraph in section.content.split("\n\n") {
                let trimmed = paragraph.trim();
                if trimmed.contains("```") {
                    in_code = !in_code;
                    kept.push(paragraph);
                    continue;
                }
                if in_code
                    || trimmed.starts_with('#')
                    || trimmed.chars().count() < 80
                {
                    kept.push(paragraph);
                    continue;
                }
                let duplicate = seen
                    .iter()
                    .any(|prior| self.model.similarity(prior, trimmed) >= self.threshold);
                if duplicate {
                    removed += 1;
                } else {
                    seen.push(trimmed.to_string());
                    kept.push(paragraph);
                }
            }
            section.content = kept.join("\n\n");
        }
        removed
    }
}

#[async_trait]
impl Agent for CrossSectionDedup {
    fn kind(&self) -> NodeKind {
        NodeKind::CrossSectionDedup
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if !ctx.settings.cross_section_dedup_enabled || state.sections.len() < 2 {
            return Ok(());
        }
        let removed = self.deduplicate(state);
        tracing::info!(removed, "cross-section dedup complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Section;
    use crate::state::ArticleRequest;

    #[test]
    fn lexical_similarity_orders_sensibly() {
        let model = LexicalSimilarity;
        let a = "tokio uses a work stealing scheduler across worker threads";
        let same = "tokio uses a work stealing scheduler across worker threads";
        let near = "tokio uses a work stealing scheduler across its worker threads";
        let far = "markdown separators need surrounding blank lines";
        assert!(model.similarity(a, same) > 0.99);
        assert!(model.similarity(a, near) > 0.8);
        assert!(model.similarity(a, far) < 0.3);
    }

    #[test]
    fn duplicate_paragraphs_are_removed_from_later_sections() {
        let repeated = "The work-stealing scheduler distributes tasks across worker threads, and every worker owns a local run queue that others can steal from when idle.";
        let mut state = ArticleState::new(&ArticleRequest::new("t"));
        state.sections = vec![
            Section {
                id: "s1".into(),
                title: "a".into(),
                content: format!("intro\n\n{repeated}"),
                ..Default::default()
            },
            Section {
                id: "s2".into(),
                title: "b".into(),
                content: format!("{repeated}\n\nfresh closing thoughts"),
                ..Default::default()
            },
        ];
        let dedup = CrossSectionDedup::new();
        let removed = dedup.deduplicate(&mut state);
        assert_eq!(removed, 1);
        assert!(state.sections[0].content.contains("work-stealing"));
        assert!(!state.sections[1].content.contains("work-stealing"));
        assert!(state.sections[1].content.contains("fresh closing"));
    }
}
