//! Contracts of the external collaborators the core consumes.
//!
//! The core never implements these; hosts inject them. Each trait mirrors
//! the minimum surface the workflow relies on, and optional collaborators
//! simply stay `None`.

use async_trait::async_trait;
use serde_json::Value;

use crate::article::SearchResult;

/// Web search backend.
#[derive(Clone, Debug, Default)]
pub struct SearchResponse {
    pub success: bool,
    pub results: Vec<SearchResult>,
    pub summary: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> SearchResponse;

    /// Identifier used by the source curator for health accounting.
    fn source_id(&self) -> &str {
        "generic_search"
    }
}

/// Image generation provider.
#[derive(Clone, Debug, Default)]
pub struct GeneratedImage {
    pub url: Option<String>,
    pub oss_url: Option<String>,
    pub local_path: Option<String>,
}

impl GeneratedImage {
    /// Preferred reference for embedding into markdown.
    #[must_use]
    pub fn best_reference(&self) -> Option<&str> {
        self.oss_url
            .as_deref()
            .or(self.url.as_deref())
            .or(self.local_path.as_deref())
    }
}

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        aspect_ratio: &str,
        image_size: &str,
        max_wait_secs: u64,
        download: bool,
    ) -> Result<GeneratedImage, String>;
}

/// Optional image-to-video provider for mini-mode cover videos.
#[async_trait]
pub trait VideoService: Send + Sync {
    async fn generate_from_image(
        &self,
        image_url: &str,
        prompt: &str,
        aspect_ratio: &str,
        last_frame_url: Option<&str>,
    ) -> Result<String, String>;
}

/// Optional object store for rendered artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload_file(&self, local_path: &str, key: &str) -> Result<String, String>;
}

/// Optional document/knowledge backend for uploaded source material.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Merge document-derived knowledge with web search material.
    async fn get_merged_knowledge(
        &self,
        document_knowledge: &str,
        web_results: &[SearchResult],
    ) -> Result<String, String>;

    /// Load documents by id for the prefetch middleware.
    async fn batch_load(&self, doc_ids: &[String]) -> Result<Vec<Value>, String>;

    /// Convert raw search results into the backend's knowledge-item form.
    fn convert_search_results(&self, results: &[SearchResult]) -> Vec<Value> {
        results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "title": r.title,
                    "url": r.url,
                    "content": r.content,
                    "source": r.source,
                })
            })
            .collect()
    }

    /// Normalize caller-supplied document knowledge before merging.
    fn prepare_document_knowledge(&self, raw: &str) -> String {
        raw.trim().to_string()
    }

    /// Render loaded documents into a prompt-sized digest.
    fn summarize_for_prompt(&self, docs: &[Value]) -> String {
        docs.iter()
            .filter_map(|d| d.get("content").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// External task manager: receives the event feed and owns cancellation.
pub trait TaskManager: Send + Sync {
    /// `event_type` is one of `progress`, `stream`, `result`, `log`,
    /// `complete`, `error`, `cancelled`.
    fn send_event(&self, task_id: &str, event_type: &str, payload: Value);

    fn is_cancelled(&self, task_id: &str) -> bool;
}
