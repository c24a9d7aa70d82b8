//! Shared fixtures for integration tests: a scriptable stub LLM keyed by
//! caller, a stub search service, and a counting task manager.

#![allow(dead_code)]

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use quillweave::article::SearchResult;
use quillweave::llm::{ChatRequest, LlmClient, LlmError, TokenTracker, TokenUsage};
use quillweave::services::{SearchResponse, SearchService, TaskManager};

/// Stub LLM: responses are looked up by exact caller, then by the caller's
/// agent prefix (before the first `.`). Scripted sequences pop in order
/// and fall back to the last entry when exhausted.
pub struct StubLlm {
    scripted: Mutex<FxHashMap<String, VecDeque<String>>>,
    fallbacks: FxHashMap<String, String>,
    calls: Mutex<Vec<String>>,
    tracker: std::sync::Arc<TokenTracker>,
}

impl StubLlm {
    pub fn new() -> Self {
        StubLlm {
            scripted: Mutex::new(FxHashMap::default()),
            fallbacks: FxHashMap::default(),
            calls: Mutex::new(Vec::new()),
            tracker: std::sync::Arc::new(TokenTracker::new()),
        }
    }

    /// Always answer `response` for callers matching `key`.
    pub fn respond(mut self, key: &str, response: impl Into<String>) -> Self {
        self.fallbacks.insert(key.to_string(), response.into());
        self
    }

    /// Answer the given sequence for callers matching `key`; the last
    /// entry repeats once the sequence is exhausted.
    pub fn respond_seq(self, key: &str, responses: Vec<String>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(key.to_string(), responses.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn lookup(&self, caller: &str) -> Option<String> {
        let mut scripted = self.scripted.lock().unwrap();
        for key in [caller, caller.split('.').next().unwrap_or(caller)] {
            if let Some(queue) = scripted.get_mut(key) {
                if queue.len() > 1 {
                    return queue.pop_front();
                }
                return queue.front().cloned();
            }
            if let Some(fixed) = self.fallbacks.get(key) {
                return Some(fixed.clone());
            }
        }
        None
    }

    /// A full happy-path script: every agent gets a plausible response,
    /// with an outline of `sections` sections titled `Section <n>`.
    pub fn happy_path(sections: usize) -> Self {
        let outline_sections: Vec<serde_json::Value> = (1..=sections)
            .map(|i| {
                json!({
                    "id": format!("section_{i}"),
                    "title": format!("Section {i}"),
                    "key_concept": format!("concept {i}"),
                    "narrative_role": "what",
                    "image_type": "none",
                    "image_description": ""
                })
            })
            .collect();
        let outline = json!({
            "title": "Stubbed Deep Dive",
            "subtitle": "a generated walkthrough",
            "introduction": "intro paragraph",
            "core_value": "learn the topic",
            "narrative_mode": "what-why-how",
            "narrative_flow": {
                "reader_start": "curious",
                "reader_end": "confident",
                "logic_chain": ["what", "why", "how"]
            },
            "sections": outline_sections,
            "conclusion": {"summary_points": ["point one"], "next_steps": "keep practicing"}
        });

        StubLlm::new()
            .respond("researcher.queries", json!({"queries": ["q1", "q2", "q3"]}).to_string())
            .respond("researcher.summary", "stubbed background knowledge")
            .respond(
                "researcher.concepts",
                json!({"concepts": [{"name": "Concept A", "description": "what it is"}]})
                    .to_string(),
            )
            .respond(
                "researcher.distill",
                json!({
                    "material_by_type": {"concepts": ["a"], "cases": [], "data": [], "comparisons": []},
                    "common_themes": ["theme"],
                    "contradictions": [],
                    "verbatim_data": [],
                    "learning_objectives": ["objective one"]
                })
                .to_string(),
            )
            .respond(
                "researcher.gaps",
                json!({"content_gaps": [], "unique_angles": [], "writing_recommendations": ["be concrete"]}).to_string(),
            )
            .respond("planner.outline", outline.to_string())
            .respond(
                "writer",
                "### 小节\n\n这一章解释核心概念，引用了资料 {source_001}。\n\n细节展开若干。",
            )
            .respond("search_coordinator", json!({"gaps": []}).to_string())
            .respond(
                "questioner",
                json!({"is_detailed_enough": true, "depth_score": 85, "vague_points": []}).to_string(),
            )
            .respond(
                "questioner.evaluate",
                json!({
                    "scores": {"information_density": 8, "logical_coherence": 8, "professional_depth": 8, "expression_quality": 8},
                    "overall_quality": 8.0,
                    "specific_issues": [],
                    "improvement_suggestions": []
                })
                .to_string(),
            )
            .respond(
                "coder",
                json!({"language": "python", "code": "print(1)", "output": "1", "explanation": "prints one"}).to_string(),
            )
            .respond(
                "artist",
                json!({"render_method": "mermaid", "content": "flowchart TD\n  A --> B", "caption": "flow"}).to_string(),
            )
            .respond("artist.missing", json!({"missing": []}).to_string())
            .respond(
                "reviewer",
                json!({"score": 90, "issues": [], "summary": "solid"}).to_string(),
            )
            .respond("factcheck", json!({"issues": []}).to_string())
            .respond("humanizer.score", json!({"score": {"total": 45}}).to_string())
            .respond("thread_checker", json!({"issues": []}).to_string())
            .respond("voice_checker", json!({"issues": []}).to_string())
            .respond(
                "summary_generator",
                json!({
                    "tldr": "短小精悍的导读。",
                    "seo_keywords": ["k1", "k2", "k3"],
                    "social_summary": "一句话社交摘要",
                    "meta_description": "元描述"
                })
                .to_string(),
            )
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(request.caller.clone());
        self.tracker.record(
            &request.caller,
            TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
                model: format!("stub-{}", request.tier),
            },
        );
        match self.lookup(&request.caller) {
            Some(response) => Ok(response),
            None => Err(LlmError::Provider {
                message: format!("no stub response for caller '{}'", request.caller),
            }),
        }
    }

    fn token_tracker(&self) -> Option<std::sync::Arc<TokenTracker>> {
        Some(std::sync::Arc::clone(&self.tracker))
    }
}

/// Search stub handing out `per_query` unique results per call.
pub struct StubSearch {
    counter: AtomicUsize,
    per_query: usize,
}

impl StubSearch {
    pub fn new(per_query: usize) -> Self {
        StubSearch {
            counter: AtomicUsize::new(0),
            per_query,
        }
    }
}

#[async_trait]
impl SearchService for StubSearch {
    async fn search(&self, query: &str, max_results: usize) -> SearchResponse {
        let n = self.per_query.min(max_results);
        let results = (0..n)
            .map(|_| {
                let id = self.counter.fetch_add(1, Ordering::SeqCst);
                SearchResult {
                    title: format!("result {id} for {query}"),
                    url: format!("https://example.com/r/{id}"),
                    content: format!("content about {query}, item {id}"),
                    source: "generic_search".into(),
                    source_type: "web".into(),
                }
            })
            .collect();
        SearchResponse {
            success: true,
            results,
            summary: None,
            error: None,
        }
    }
}

/// Task manager that reports cancellation starting from the n-th
/// `is_cancelled` poll (1-based), and records every event it receives.
pub struct CancellingManager {
    cancel_at_poll: usize,
    polls: AtomicUsize,
    pub events: Mutex<Vec<(String, String)>>,
}

impl CancellingManager {
    pub fn cancel_at_poll(n: usize) -> Self {
        CancellingManager {
            cancel_at_poll: n,
            polls: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Never cancels.
    pub fn passive() -> Self {
        Self::cancel_at_poll(usize::MAX)
    }

    pub fn events_of_type(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == event_type)
            .count()
    }
}

impl TaskManager for CancellingManager {
    fn send_event(&self, task_id: &str, event_type: &str, _payload: serde_json::Value) {
        self.events
            .lock()
            .unwrap()
            .push((event_type.to_string(), task_id.to_string()));
    }

    fn is_cancelled(&self, _task_id: &str) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst) + 1 >= self.cancel_at_poll
    }
}
