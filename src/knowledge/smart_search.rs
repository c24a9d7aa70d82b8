//! Multi-source smart search.
//!
//! A query is routed to a subset of registered sources (LLM router when
//! available, keyword rules otherwise), fanned out in parallel over the
//! healthy ones, then merged: URL-deduplicated and ranked by source
//! quality. A short-window query deduplicator rejects repeats so bounded
//! retry loops cannot burn the search quota on the same query.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::article::SearchResult;
use crate::executor::{ParallelTask, ParallelTaskExecutor, TaskConfig};
use crate::llm::{ChatRequest, TieredLlm};
use crate::services::{SearchResponse, SearchService};
use crate::utils::json_ext::extract_json_array;

use super::SourceCurator;

/// One registered search source.
#[derive(Clone)]
pub struct SourceEntry {
    /// Stable id used for health accounting (`arxiv`, `google`, ...).
    pub id: String,
    /// Display name matching the curator's weight table.
    pub name: String,
    /// Domain keywords that route queries here.
    pub keywords: Vec<String>,
    /// Part of the default fan-out when no keywords match.
    pub general: bool,
    /// Included automatically for AI topics when the boost is on.
    pub ai_research: bool,
    pub service: Arc<dyn SearchService>,
}

const AI_TOPIC_KEYWORDS: &[&str] = &[
    "llm", "gpt", "claude", "gemini", "llama", "mistral", "transformer", "agent",
    "rag", "embedding", "fine-tun", "prompt", "diffusion", "机器学习", "大模型",
    "深度学习", "神经网络",
];

fn is_ai_topic(query: &str) -> bool {
    let lower = query.to_lowercase();
    AI_TOPIC_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Rejects repeats of the same query within a sliding window.
#[derive(Debug)]
pub struct QueryDeduplicator {
    window: Duration,
    recent: Mutex<Vec<(String, Instant)>>,
}

impl QueryDeduplicator {
    pub fn new(window: Duration) -> Self {
        QueryDeduplicator {
            window,
            recent: Mutex::new(Vec::new()),
        }
    }

    /// Returns true when the query was already seen inside the window.
    /// Fresh queries are recorded.
    pub fn seen_recently(&self, query: &str) -> bool {
        let normalized = query.trim().to_lowercase();
        let mut recent = self.recent.lock().expect("dedup poisoned");
        recent.retain(|(_, at)| at.elapsed() < self.window);
        if recent.iter().any(|(q, _)| *q == normalized) {
            return true;
        }
        recent.push((normalized, Instant::now()));
        false
    }
}

impl Default for QueryDeduplicator {
    fn default() -> Self {
        QueryDeduplicator::new(Duration::from_secs(300))
    }
}

/// The fan-out search front end.
pub struct SmartSearchService {
    sources: Vec<SourceEntry>,
    curator: Arc<SourceCurator>,
    executor: ParallelTaskExecutor,
    dedup: QueryDeduplicator,
    router: Option<TieredLlm>,
    ai_boost: bool,
}

impl SmartSearchService {
    pub fn new(sources: Vec<SourceEntry>, curator: Arc<SourceCurator>) -> Self {
        SmartSearchService {
            sources,
            curator,
            executor: ParallelTaskExecutor::new(),
            dedup: QueryDeduplicator::default(),
            router: None,
            ai_boost: true,
        }
    }

    /// Attach an LLM router; keyword rules stay as the fallback.
    #[must_use]
    pub fn with_router(mut self, router: TieredLlm) -> Self {
        self.router = Some(router);
        self
    }

    #[must_use]
    pub fn with_ai_boost(mut self, on: bool) -> Self {
        self.ai_boost = on;
        self
    }

    #[must_use]
    pub fn with_executor(mut self, executor: ParallelTaskExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Pick source ids for a query: LLM router first, keyword rules as
    /// fallback, general sources when nothing matches.
    async fn route(&self, query: &str) -> Vec<usize> {
        if let Some(router) = &self.router {
            if let Some(indices) = self.route_via_llm(router, query).await {
                if !indices.is_empty() {
                    return indices;
                }
            }
        }
        self.route_by_rules(query)
    }

    async fn route_via_llm(&self, router: &TieredLlm, query: &str) -> Option<Vec<usize>> {
        let catalog: Vec<String> = self
            .sources
            .iter()
            .map(|s| format!("- {}: {}", s.id, s.keywords.join(", ")))
            .collect();
        let prompt = format!(
            "为下面的搜索查询挑选最合适的搜索源（最多 4 个）。\n\n查询：{query}\n\n可用源：\n{}\n\n只输出 JSON 数组，元素为源 id 字符串。",
            catalog.join("\n")
        );
        let response = router
            .chat(ChatRequest::new(prompt).json().caller("search_router"))
            .await
            .ok()?;
        let ids = extract_json_array(&response).ok()?;
        let picked: Vec<usize> = ids
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|id| self.sources.iter().position(|s| s.id == id))
            .collect();
        Some(picked)
    }

    fn route_by_rules(&self, query: &str) -> Vec<usize> {
        let lower = query.to_lowercase();
        let mut picked: Vec<usize> = self
            .sources
            .iter()
            .enumerate()
            .filter(|(_, s)| s.keywords.iter().any(|kw| lower.contains(&kw.to_lowercase())))
            .map(|(i, _)| i)
            .collect();

        if self.ai_boost && is_ai_topic(query) {
            for (i, source) in self.sources.iter().enumerate() {
                if source.ai_research && !picked.contains(&i) {
                    picked.push(i);
                }
            }
        }
        if picked.is_empty() {
            picked = self
                .sources
                .iter()
                .enumerate()
                .filter(|(_, s)| s.general)
                .map(|(i, _)| i)
                .collect();
        }
        picked
    }

    /// Route, fan out, merge. Duplicate queries inside the dedup window
    /// return an empty successful response.
    pub async fn search(&self, query: &str, max_results: usize) -> SearchResponse {
        if self.dedup.seen_recently(query) {
            tracing::info!(%query, "duplicate query rejected by deduplicator");
            return SearchResponse {
                success: true,
                results: Vec::new(),
                summary: None,
                error: Some("duplicate query".into()),
            };
        }

        let picked = self.route(query).await;
        let healthy: Vec<usize> = picked
            .into_iter()
            .filter(|&i| self.curator.check_health(&self.sources[i].id))
            .collect();
        if healthy.is_empty() {
            return SearchResponse {
                success: false,
                results: Vec::new(),
                summary: None,
                error: Some("no healthy sources for query".into()),
            };
        }

        let tasks: Vec<ParallelTask<(usize, SearchResponse)>> = healthy
            .iter()
            .map(|&i| {
                let service = Arc::clone(&self.sources[i].service);
                let query = query.to_string();
                ParallelTask::new(self.sources[i].id.clone(), async move {
                    Ok((i, service.search(&query, max_results).await))
                })
            })
            .collect();
        let outcomes = self
            .executor
            .run_parallel(tasks, TaskConfig::new("smart_search").timeout(Duration::from_secs(30)))
            .await;

        let mut merged: Vec<SearchResult> = Vec::new();
        let mut any_success = false;
        for outcome in outcomes {
            let Some((idx, response)) = outcome.result else {
                // Timeout or panic counts against the source's health.
                self.curator.record_failure(&outcome.task_name);
                continue;
            };
            let source = &self.sources[idx];
            if response.success {
                self.curator.record_success(&source.id);
                any_success = true;
                for mut result in response.results {
                    if result.source.is_empty() {
                        result.source = source.name.clone();
                    }
                    merged.push(result);
                }
            } else {
                self.curator.record_failure(&source.id);
            }
        }

        let deduped = dedup_by_url(merged);
        let mut ranked = self.curator.rank(deduped);
        ranked.truncate(max_results.max(1));

        SearchResponse {
            success: any_success,
            results: ranked,
            summary: None,
            error: (!any_success).then(|| "all sources failed".to_string()),
        }
    }
}

/// Keep the first occurrence of each URL.
pub fn dedup_by_url(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = rustc_hash::FxHashSet::default();
    results
        .into_iter()
        .filter(|r| r.url.is_empty() || seen.insert(r.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedSearch {
        id: String,
        results: Vec<SearchResult>,
        fail: bool,
    }

    #[async_trait]
    impl SearchService for FixedSearch {
        async fn search(&self, _query: &str, _max: usize) -> SearchResponse {
            if self.fail {
                SearchResponse {
                    success: false,
                    error: Some("down".into()),
                    ..Default::default()
                }
            } else {
                SearchResponse {
                    success: true,
                    results: self.results.clone(),
                    summary: None,
                    error: None,
                }
            }
        }

        fn source_id(&self) -> &str {
            &self.id
        }
    }

    fn entry(id: &str, name: &str, keywords: &[&str], general: bool, results: Vec<SearchResult>) -> SourceEntry {
        SourceEntry {
            id: id.into(),
            name: name.into(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            general,
            ai_research: false,
            service: Arc::new(FixedSearch {
                id: id.into(),
                results,
                fail: false,
            }),
        }
    }

    fn result(url: &str, source: &str) -> SearchResult {
        SearchResult {
            title: url.into(),
            url: url.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn merges_dedups_and_ranks() {
        let curator = Arc::new(SourceCurator::new());
        let service = SmartSearchService::new(
            vec![
                entry(
                    "general",
                    "generic_search",
                    &[],
                    true,
                    vec![result("https://a", "generic_search"), result("https://b", "generic_search")],
                ),
                entry(
                    "arxiv",
                    "arXiv",
                    &["paper", "arxiv"],
                    true,
                    vec![result("https://a", "arXiv"), result("https://c", "arXiv")],
                ),
            ],
            curator,
        );
        let response = service.search("arxiv paper on attention", 10).await;
        assert!(response.success);
        let urls: Vec<&str> = response.results.iter().map(|r| r.url.as_str()).collect();
        // URL https://a appears once; arXiv results outrank generic ones.
        assert_eq!(urls.iter().filter(|u| **u == "https://a").count(), 1);
        assert_eq!(response.results[0].source, "arXiv");
    }

    #[tokio::test]
    async fn duplicate_queries_are_rejected() {
        let curator = Arc::new(SourceCurator::new());
        let service = SmartSearchService::new(
            vec![entry("g", "generic_search", &[], true, vec![result("https://x", "generic_search")])],
            curator,
        );
        let first = service.search("same query", 5).await;
        assert_eq!(first.results.len(), 1);
        let second = service.search("same query", 5).await;
        assert!(second.results.is_empty());
        assert_eq!(second.error.as_deref(), Some("duplicate query"));
    }

    #[tokio::test]
    async fn failing_source_is_recorded_against_health() {
        let curator = Arc::new(SourceCurator::new().with_max_failures(1));
        let failing = SourceEntry {
            id: "flaky".into(),
            name: "Flaky".into(),
            keywords: vec![],
            general: true,
            ai_research: false,
            service: Arc::new(FixedSearch {
                id: "flaky".into(),
                results: vec![],
                fail: true,
            }),
        };
        let service = SmartSearchService::new(vec![failing], Arc::clone(&curator));
        let response = service.search("anything", 5).await;
        assert!(!response.success);
        assert!(!curator.check_health("flaky"));
    }

    #[test]
    fn ai_topics_are_detected() {
        assert!(is_ai_topic("building a RAG pipeline with embeddings"));
        assert!(!is_ai_topic("gardening tips for spring"));
    }
}
