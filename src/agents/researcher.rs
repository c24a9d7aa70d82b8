//! Researcher: collects web material, distills it into structured
//! knowledge, and maps content gaps before any planning happens.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::article::{KeyConcept, ReferenceLink, SearchResult};
use crate::knowledge::{DeepScraper, DiskCache, SmartSearchService, dedup_by_url};
use crate::llm::{ChatRequest, TieredLlm};
use crate::prompts;
use crate::services::{DocumentService, SearchService};
use crate::state::ArticleState;
use crate::types::NodeKind;
use crate::utils::json_ext::{extract_json_object, extract_typed};

use super::{Agent, AgentContext, AgentError};

const RESULTS_PER_QUERY: usize = 5;

pub struct ResearcherAgent {
    llm: TieredLlm,
    search: Option<Arc<dyn SearchService>>,
    smart_search: Option<Arc<SmartSearchService>>,
    documents: Option<Arc<dyn DocumentService>>,
    scraper: Option<Arc<DeepScraper>>,
    cache: Option<DiskCache>,
}

impl ResearcherAgent {
    pub fn new(llm: TieredLlm) -> Self {
        ResearcherAgent {
            llm,
            search: None,
            smart_search: None,
            documents: None,
            scraper: None,
            cache: None,
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
    pub fn with_documents(mut self, documents: Arc<dyn DocumentService>) -> Self {
        self.documents = Some(documents);
        self
    }

    #[must_use]
    pub fn with_scraper(mut self, scraper: Arc<DeepScraper>) -> Self {
        self.scraper = Some(scraper);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: DiskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace shallow snippets with deep-scraped page extracts for the
    /// top hits.
    async fn deepen_results(&self, state: &mut ArticleState) {
        let Some(scraper) = &self.scraper else { return };
        let pages = scraper.scrape_top_n(&state.search_results, &state.topic).await;
        for page in pages {
            if let Some(result) = state.search_results.iter_mut().find(|r| r.url == page.url) {
                result.content = page.content;
                result.source_type = "deep_scrape".into();
            }
        }
    }

    async fn generate_queries(&self, state: &mut ArticleState) -> Vec<String> {
        let prompt = prompts::researcher_queries(&state.topic, &state.article_type);
        let topic_for_fallback = state.topic.clone();
        let fallback = move || {
            vec![
                topic_for_fallback.clone(),
                format!("{} 实战示例", topic_for_fallback),
                format!("{} best practices", topic_for_fallback),
            ]
        };
        match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("researcher.queries"))
            .await
        {
            Ok(response) => match extract_json_object(&response) {
                Ok(map) => {
                    let queries: Vec<String> = map
                        .get("queries")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    if queries.is_empty() { fallback() } else { queries }
                }
                Err(_) => fallback(),
            },
            Err(err) => {
                state.record_node_error(format!("query generation failed: {err}"));
                fallback()
            }
        }
    }

    async fn run_searches(&self, queries: &[String]) -> Vec<SearchResult> {
        let mut all = Vec::new();
        for query in queries {
            let cache_params = json!({"query": query, "max_results": RESULTS_PER_QUERY});
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get("search", &cache_params).await {
                    if let Ok(results) = serde_json::from_value::<Vec<SearchResult>>(hit) {
                        all.extend(results);
                        continue;
                    }
                }
            }
            let response = if let Some(smart) = &self.smart_search {
                smart.search(query, RESULTS_PER_QUERY).await
            } else if let Some(search) = &self.search {
                search.search(query, RESULTS_PER_QUERY).await
            } else {
                continue;
            };
            if response.success {
                if let Some(cache) = &self.cache {
                    if let Ok(value) = serde_json::to_value(&response.results) {
                        cache.set("search", &cache_params, value).await;
                    }
                }
                all.extend(response.results);
            } else {
                tracing::warn!(%query, error = ?response.error, "search failed");
            }
        }
        dedup_by_url(all)
    }

    async fn summarize_background(&self, state: &mut ArticleState) {
        // Uploaded documents take precedence; the document service merges
        // them with the web material.
        if let Some(documents) = &self.documents {
            let doc_knowledge = state
                .document_knowledge
                .clone()
                .unwrap_or_else(|| documents.summarize_for_prompt(&state.prefetch_docs));
            if !doc_knowledge.is_empty() {
                match documents
                    .get_merged_knowledge(&doc_knowledge, &state.search_results)
                    .await
                {
                    Ok(merged) => {
                        state.background_knowledge = merged;
                        return;
                    }
                    Err(err) => {
                        state.record_node_error(format!("document knowledge merge failed: {err}"))
                    }
                }
            }
        }
        let prompt = prompts::researcher_summary(&state.topic, &state.search_results);
        match self
            .llm
            .chat(ChatRequest::new(prompt).caller("researcher.summary"))
            .await
        {
            Ok(summary) => state.background_knowledge = summary,
            Err(err) => {
                state.record_node_error(format!("background summary failed: {err}"));
                // Degrade to raw snippets so downstream prompts are not empty.
                state.background_knowledge = state
                    .search_results
                    .iter()
                    .take(5)
                    .map(|r| r.content.chars().take(300).collect::<String>())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
        }
        if let Some(material) = &state.source_material {
            state.background_knowledge = format!("{material}\n\n{}", state.background_knowledge);
        }
    }

    async fn distill_sources(&self, state: &mut ArticleState) {
        let urls: Vec<&str> = state.search_results.iter().map(|r| r.url.as_str()).collect();
        let cache_params = json!({"topic": state.topic, "urls": urls});
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get("distill", &cache_params).await {
                Self::apply_distilled(state, &hit);
                return;
            }
        }
        let prompt = prompts::researcher_distill(&state.topic, &state.search_results);
        match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("researcher.distill"))
            .await
        {
            Ok(response) => match extract_json_object(&response) {
                Ok(map) => {
                    let value = Value::Object(map);
                    if let Some(cache) = &self.cache {
                        cache.set("distill", &cache_params, value.clone()).await;
                    }
                    Self::apply_distilled(state, &value);
                }
                Err(err) => state.record_node_error(format!("distill parse failed: {err}")),
            },
            Err(err) => state.record_node_error(format!("distill failed: {err}")),
        }
    }

    fn apply_distilled(state: &mut ArticleState, value: &Value) {
        let strings = |key: &str| -> Vec<String> {
            value
                .get(key)
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
        if let Some(by_type) = value.get("material_by_type").and_then(Value::as_object) {
            for (kind, items) in by_type {
                let entries: Vec<String> = items
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .map(|v| match v.as_str() {
                                Some(s) => s.to_string(),
                                None => v.to_string(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                state.material_by_type.insert(kind.clone(), entries);
            }
        }
        state.common_themes = strings("common_themes");
        state.contradictions = strings("contradictions");
        state.verbatim_data = strings("verbatim_data");
        state.learning_objectives = strings("learning_objectives");
        state.distilled_sources.push(value.clone());
    }

    async fn analyze_gaps(&self, state: &mut ArticleState) {
        let prompt = prompts::researcher_gap_analysis(&state.topic, &state.background_knowledge);
        match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("researcher.gaps"))
            .await
        {
            Ok(response) => {
                if let Ok(map) = extract_json_object(&response) {
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
                    state.content_gaps = strings("content_gaps");
                    state.unique_angles = strings("unique_angles");
                    state.writing_recommendations = strings("writing_recommendations");
                }
            }
            Err(err) => state.record_node_error(format!("gap analysis failed: {err}")),
        }
    }

    async fn extract_concepts(&self, state: &mut ArticleState) {
        let prompt = prompts::researcher_concepts(&state.topic, &state.background_knowledge);
        match self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("researcher.concepts"))
            .await
        {
            Ok(response) => {
                #[derive(serde::Deserialize)]
                struct Concepts {
                    concepts: Vec<KeyConcept>,
                }
                match extract_typed::<Concepts>(&response) {
                    Ok(parsed) => state.key_concepts = parsed.concepts,
                    Err(_) => state.record_node_error("concept extraction parse failed".to_string()),
                }
            }
            Err(err) => state.record_node_error(format!("concept extraction failed: {err}")),
        }
    }
}

#[async_trait]
impl Agent for ResearcherAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::Researcher
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        ctx.emitter.log("info", format!("researching topic: {}", state.topic));

        let queries = self.generate_queries(state).await;
        tracing::info!(count = queries.len(), "search queries ready");
        state.search_results = self.run_searches(&queries).await;
        self.deepen_results(state).await;

        for result in &state.search_results {
            *state
                .knowledge_source_stats
                .entry(result.source.clone())
                .or_insert(0) += 1;
            if !result.url.is_empty() {
                state.reference_links.push(ReferenceLink {
                    title: result.title.clone(),
                    url: result.url.clone(),
                });
            }
        }

        self.summarize_background(state).await;
        self.extract_concepts(state).await;
        self.distill_sources(state).await;
        self.analyze_gaps(state).await;

        tracing::info!(
            results = state.search_results.len(),
            concepts = state.key_concepts.len(),
            "research complete"
        );
        Ok(())
    }
}
