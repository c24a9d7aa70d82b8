//! Search coordinator: knowledge-gap detection and the bounded
//! refinement-search loop.
//!
//! As the check-knowledge node it scans the drafted sections against the
//! accumulated knowledge and reports gaps. The refine-search node (a thin
//! wrapper) takes the top gaps, runs targeted searches, deduplicates
//! against prior results, and folds a summary into the accumulated
//! knowledge.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::article::{KnowledgeGap, SearchResult, SearchRound};
use crate::knowledge::SmartSearchService;
use crate::llm::{ChatRequest, TieredLlm};
use crate::prompts;
use crate::services::SearchService;
use crate::state::ArticleState;
use crate::types::{GapType, NodeKind};
use crate::utils::json_ext::{extract_json_array, extract_json_object};

use super::{Agent, AgentContext, AgentError};

/// Gaps handled per refinement round.
const GAPS_PER_ROUND: usize = 2;
/// Results fetched per targeted query.
const RESULTS_PER_GAP: usize = 3;

pub struct SearchCoordinator {
    llm: TieredLlm,
    search: Option<Arc<dyn SearchService>>,
    smart_search: Option<Arc<SmartSearchService>>,
}

impl SearchCoordinator {
    pub fn new(llm: TieredLlm) -> Self {
        SearchCoordinator {
            llm,
            search: None,
            smart_search: None,
        }
    }

    #[must_use]
    pub fn with_search(mut self, search: Arc<dyn SearchService>) -> Self {
        self.search = Some(search);
        self
    }

    #[must_use]
    pub fn with_smart_search(mut self, smart: Arc<SmartSearchService>) -> Self {
        self.smart_search = Some(smart);
        self
    }

    #[must_use]
    pub fn can_search(&self, state: &ArticleState) -> bool {
        state.search_count < state.max_search_count
    }

    /// LLM gap detection over the concatenated sections.
    pub async fn detect_knowledge_gaps(&self, state: &ArticleState) -> Vec<KnowledgeGap> {
        let all_content: String = state
            .sections
            .iter()
            .map(|s| format!("## {}\n{}", s.title, s.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt =
            prompts::gap_detector(&all_content, state.effective_knowledge(), &state.topic);
        let response = match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("search_coordinator"))
            .await
        {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(%err, "gap detection failed");
                return Vec::new();
            }
        };
        let Ok(map) = extract_json_object(&response) else {
            return Vec::new();
        };
        map.get("gaps")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Lightweight gap detection over the raw search results (enhanced
    /// detector path). Each entry is `{gap, refined_query}`.
    async fn detect_gaps_from_results(&self, state: &ArticleState) -> Vec<KnowledgeGap> {
        let digest: Vec<String> = state
            .search_results
            .iter()
            .take(10)
            .map(|r| format!("- {}: {}", r.title, r.content.chars().take(200).collect::<String>()))
            .collect();
        let prompt = format!(
            "分析以下搜索结果，检测关于「{}」的知识空白：缺少的概念解释、数据支撑、实例说明。\n\
             输出 JSON 数组，元素为 {{\"gap\": \"...\", \"refined_query\": \"...\"}}；\
             没有明显空白返回 []。\n\n搜索结果摘要：\n{}",
            state.topic,
            digest.join("\n")
        );
        let response = match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("search_coordinator.detector"))
            .await
        {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        let Ok(items) = extract_json_array(&response) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let gap = item.get("gap").and_then(Value::as_str)?;
                let query = item.get("refined_query").and_then(Value::as_str)?;
                Some(KnowledgeGap {
                    gap_type: GapType::MissingData,
                    description: gap.to_string(),
                    suggested_query: query.to_string(),
                    section_id: String::new(),
                })
            })
            .collect()
    }

    /// One refinement round: top gaps, targeted searches, URL dedup,
    /// summary into the accumulated knowledge. Bumps `search_count`.
    pub async fn refine_search(&self, state: &mut ArticleState) {
        if !self.can_search(state) {
            tracing::warn!(
                count = state.search_count,
                max = state.max_search_count,
                "search quota exhausted"
            );
            return;
        }
        let gaps: Vec<KnowledgeGap> = state
            .knowledge_gaps
            .iter()
            .take(GAPS_PER_ROUND)
            .cloned()
            .collect();
        state.search_count += 1;
        let round = state.search_count;

        let mut queries_used = Vec::new();
        let mut gaps_addressed = Vec::new();
        let mut new_results: Vec<SearchResult> = Vec::new();
        for gap in &gaps {
            if gap.suggested_query.is_empty() {
                continue;
            }
            queries_used.push(gap.suggested_query.clone());
            gaps_addressed.push(gap.description.clone());
            let response = if let Some(smart) = &self.smart_search {
                smart.search(&gap.suggested_query, RESULTS_PER_GAP).await
            } else if let Some(search) = &self.search {
                search.search(&gap.suggested_query, RESULTS_PER_GAP).await
            } else {
                continue;
            };
            if response.success {
                new_results.extend(response.results);
            } else {
                tracing::warn!(query = %gap.suggested_query, "refinement search failed");
            }
        }

        // Drop anything already collected in earlier rounds.
        let known: rustc_hash::FxHashSet<&str> =
            state.search_results.iter().map(|r| r.url.as_str()).collect();
        new_results.retain(|r| r.url.is_empty() || !known.contains(r.url.as_str()));
        let new_results = crate::knowledge::dedup_by_url(new_results);

        state.search_history.push(SearchRound {
            round,
            queries: queries_used,
            results_count: new_results.len(),
            gaps_addressed,
        });

        if new_results.is_empty() {
            tracing::info!(round, "refinement search yielded nothing new");
            return;
        }

        let summary = self.summarize_results(&new_results, &gaps).await;
        state.search_results.extend(new_results);
        if !summary.is_empty() {
            if state.accumulated_knowledge.is_empty() {
                state.accumulated_knowledge = summary;
            } else {
                state.accumulated_knowledge =
                    format!("{}\n\n{summary}", state.accumulated_knowledge);
            }
        }
        tracing::info!(round, "refinement search complete");
    }

    async fn summarize_results(
        &self,
        results: &[SearchResult],
        gaps: &[KnowledgeGap],
    ) -> String {
        let prompt = prompts::search_summarizer(gaps, results);
        match self
            .llm
            .chat(ChatRequest::new(prompt).caller("search_coordinator.summarize"))
            .await
        {
            Ok(summary) => summary.trim().to_string(),
            Err(err) => {
                tracing::warn!(%err, "summary generation failed, joining raw snippets");
                results
                    .iter()
                    .take(3)
                    .map(|r| r.content.chars().take(200).collect::<String>())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }
}

#[async_trait]
impl Agent for SearchCoordinator {
    fn kind(&self) -> NodeKind {
        NodeKind::CheckKnowledge
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if state.sections.is_empty() {
            state.knowledge_gaps = Vec::new();
            return Ok(());
        }
        tracing::info!(
            count = state.search_count,
            max = state.max_search_count,
            "checking for knowledge gaps"
        );
        let gaps = if ctx.settings.knowledge_gap_detector_enabled {
            self.detect_gaps_from_results(state).await
        } else {
            self.detect_knowledge_gaps(state).await
        };
        tracing::info!(gaps = gaps.len(), "gap detection complete");
        state.knowledge_gaps = gaps;
        Ok(())
    }
}

/// The refine-search node: one bounded refinement round.
pub struct RefineSearchAgent {
    coordinator: Arc<SearchCoordinator>,
}

impl RefineSearchAgent {
    pub fn new(coordinator: Arc<SearchCoordinator>) -> Self {
        RefineSearchAgent { coordinator }
    }
}

#[async_trait]
impl Agent for RefineSearchAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::RefineSearch
    }

    async fn run(&self, state: &mut ArticleState, _ctx: &AgentContext) -> Result<(), AgentError> {
        self.coordinator.refine_search(state).await;
        Ok(())
    }
}
