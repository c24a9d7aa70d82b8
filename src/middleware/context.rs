//! Three-layer context management.
//!
//! Gated by the estimated share of the model's safe input window the state
//! already occupies:
//!
//! - below the fold threshold: no-op;
//! - between fold and summary: Layer 1, keep the search results most
//!   similar to the topic (cheap lexical filter);
//! - at or above summary with only research text: Layer 2, LLM active
//!   compression of the accumulated knowledge;
//! - at or above summary with extra context (distilled sources): Layer 3,
//!   a running full summary replaces the context fields.

use async_trait::async_trait;
use std::sync::Mutex;

use super::NodeMiddleware;
use crate::llm::{ChatRequest, TieredLlm};
use crate::state::ArticleState;
use crate::types::NodeKind;
use crate::utils::text::truncate_chars;

/// Chars-per-token heuristic used for the usage estimate.
const CHARS_PER_TOKEN: usize = 4;
const LAYER1_KEEP: usize = 10;

pub struct ContextManagementMiddleware {
    enabled: bool,
    llm: Option<TieredLlm>,
    fold_threshold: f32,
    summary_threshold: f32,
    /// Safe input window, in tokens.
    safe_input_limit: usize,
    last_summary: Mutex<Option<String>>,
}

impl ContextManagementMiddleware {
    pub fn new(
        enabled: bool,
        llm: Option<TieredLlm>,
        fold_threshold: f32,
        summary_threshold: f32,
    ) -> Self {
        ContextManagementMiddleware {
            enabled,
            llm,
            fold_threshold,
            summary_threshold,
            safe_input_limit: 96_000,
            last_summary: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_safe_input_limit(mut self, tokens: usize) -> Self {
        self.safe_input_limit = tokens.max(1);
        self
    }

    fn estimate_usage(&self, state: &ArticleState) -> f32 {
        let mut chars = state.background_knowledge.len() + state.accumulated_knowledge.len();
        chars += state
            .search_results
            .iter()
            .map(|r| r.content.len() + r.title.len())
            .sum::<usize>();
        chars += state.sections.iter().map(|s| s.content.len()).sum::<usize>();
        chars += state
            .distilled_sources
            .iter()
            .map(|v| v.to_string().len())
            .sum::<usize>();
        let tokens = chars / CHARS_PER_TOKEN;
        tokens as f32 / self.safe_input_limit as f32
    }

    /// Layer 1: keep the top-k search results by lexical overlap with the
    /// topic.
    fn apply_layer1(&self, state: &mut ArticleState, node: NodeKind) {
        if state.search_results.len() <= LAYER1_KEEP {
            return;
        }
        let topic_terms: Vec<String> = state
            .topic
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let mut scored: Vec<(f32, usize)> = state
            .search_results
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let haystack = format!("{} {}", r.title, r.content).to_lowercase();
                let hits = topic_terms.iter().filter(|t| haystack.contains(*t)).count();
                let score = hits as f32 / topic_terms.len().max(1) as f32;
                (score, i)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut keep: Vec<usize> = scored.iter().take(LAYER1_KEEP).map(|(_, i)| *i).collect();
        keep.sort_unstable();
        let before = state.search_results.len();
        state.search_results = keep
            .into_iter()
            .map(|i| state.search_results[i].clone())
            .collect();
        tracing::info!(
            node = %node,
            before,
            after = state.search_results.len(),
            "context layer 1: semantic filter applied"
        );
    }

    /// Layer 2: LLM compression of the accumulated research text.
    async fn apply_layer2(&self, state: &mut ArticleState, node: NodeKind) {
        let Some(llm) = &self.llm else {
            self.apply_layer1(state, node);
            return;
        };
        let research = state.effective_knowledge().to_string();
        if research.len() < 1000 {
            self.apply_layer1(state, node);
            return;
        }
        let prompt = format!(
            "你是上下文压缩专家。以下是关于「{}」的研究资料。\
             保留与主题直接相关的关键事实、数据和论据，删除重复信息和过渡性文字。\
             输出压缩后的精华内容。\n\n原始内容：\n{}",
            state.topic,
            truncate_chars(&research, 8000)
        );
        match llm
            .chat(ChatRequest::new(prompt).caller("context_compressor"))
            .await
        {
            Ok(compressed) if !compressed.trim().is_empty() => {
                tracing::info!(
                    node = %node,
                    before = research.len(),
                    after = compressed.len(),
                    "context layer 2: active compression applied"
                );
                state.accumulated_knowledge = compressed;
            }
            _ => self.apply_layer1(state, node),
        }
    }

    /// Layer 3: running full summary replacing the context fields.
    async fn apply_layer3(&self, state: &mut ArticleState, node: NodeKind) {
        let Some(llm) = &self.llm else {
            self.apply_layer1(state, node);
            return;
        };
        let mut parts = vec![format!(
            "[research]: {}",
            truncate_chars(state.effective_knowledge(), 3000)
        )];
        for source in state.distilled_sources.iter().take(5) {
            parts.push(format!("[source]: {}", truncate_chars(&source.to_string(), 1500)));
        }
        let context = parts.join("\n\n");
        let previous = self.last_summary.lock().expect("summary poisoned").clone();
        let prompt = match previous {
            Some(last) => format!(
                "以下是关于「{}」的上次摘要和新增研究上下文。以上次摘要为基线整合新增信息，\
                 保留所有引用来源，输出更新后的完整摘要。\n\n上次摘要：\n{last}\n\n新增上下文：\n{context}",
                state.topic
            ),
            None => format!(
                "分析以下关于「{}」的研究上下文，提取关键事实、数据和论据，\
                 保留所有引用来源，去除重复信息，输出结构化摘要。\n\n研究上下文：\n{context}",
                state.topic
            ),
        };
        match llm
            .chat(ChatRequest::new(prompt).caller("context_summarizer"))
            .await
        {
            Ok(summary) if !summary.trim().is_empty() => {
                tracing::info!(node = %node, chars = summary.len(), "context layer 3: full summary applied");
                *self.last_summary.lock().expect("summary poisoned") = Some(summary.clone());
                state.accumulated_knowledge = summary;
                state.distilled_sources.clear();
            }
            _ => self.apply_layer2(state, node).await,
        }
    }
}

#[async_trait]
impl NodeMiddleware for ContextManagementMiddleware {
    fn name(&self) -> &'static str {
        "context_management"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn before_node(&self, state: &mut ArticleState, node: NodeKind) {
        let usage = self.estimate_usage(state);
        state.context_usage_ratio = usage;
        if usage < self.fold_threshold {
            return;
        }
        if usage < self.summary_threshold {
            self.apply_layer1(state, node);
        } else if state.distilled_sources.is_empty() {
            self.apply_layer2(state, node).await;
        } else {
            self.apply_layer3(state, node).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::SearchResult;
    use crate::state::ArticleRequest;

    fn state_with_results(n: usize) -> ArticleState {
        let mut state = ArticleState::new(&ArticleRequest::new("tokio runtime internals"));
        for i in 0..n {
            state.search_results.push(SearchResult {
                title: format!("result {i}"),
                url: format!("https://example.com/{i}"),
                content: if i % 2 == 0 {
                    "tokio runtime scheduler details".repeat(40)
                } else {
                    "unrelated cooking recipe".repeat(40)
                },
                ..Default::default()
            });
        }
        state
    }

    #[tokio::test]
    async fn below_fold_threshold_is_a_noop() {
        let mw = ContextManagementMiddleware::new(true, None, 0.7, 0.9);
        let mut state = state_with_results(20);
        let before = state.search_results.len();
        mw.before_node(&mut state, NodeKind::Writer).await;
        assert_eq!(state.search_results.len(), before);
        assert!(state.context_usage_ratio < 0.7);
    }

    #[tokio::test]
    async fn layer1_keeps_topic_relevant_results() {
        let mw =
            ContextManagementMiddleware::new(true, None, 0.0, 2.0).with_safe_input_limit(1000);
        let mut state = state_with_results(30);
        mw.before_node(&mut state, NodeKind::Writer).await;
        assert_eq!(state.search_results.len(), LAYER1_KEEP);
        // The topical results win the filter.
        assert!(
            state
                .search_results
                .iter()
                .filter(|r| r.content.contains("tokio"))
                .count()
                >= LAYER1_KEEP / 2
        );
    }
}
