//! Context prefetch middleware.
//!
//! Runs exactly once, before the researcher: when the request carries
//! document ids, the referenced documents are loaded in one bounded batch
//! so the researcher can fold them into its knowledge base without paying
//! the load latency inside its own step.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::NodeMiddleware;
use crate::services::DocumentService;
use crate::state::ArticleState;
use crate::types::NodeKind;

const PREFETCH_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ContextPrefetchMiddleware {
    document_service: Option<Arc<dyn DocumentService>>,
    done: AtomicBool,
}

impl ContextPrefetchMiddleware {
    pub fn new(document_service: Option<Arc<dyn DocumentService>>) -> Self {
        ContextPrefetchMiddleware {
            document_service,
            done: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl NodeMiddleware for ContextPrefetchMiddleware {
    fn name(&self) -> &'static str {
        "context_prefetch"
    }

    fn enabled(&self) -> bool {
        self.document_service.is_some()
    }

    async fn before_node(&self, state: &mut ArticleState, node: NodeKind) {
        if node != NodeKind::Researcher
            || state.document_ids.is_empty()
            || self.done.swap(true, Ordering::SeqCst)
        {
            return;
        }
        let Some(service) = &self.document_service else {
            return;
        };
        match tokio::time::timeout(PREFETCH_TIMEOUT, service.batch_load(&state.document_ids)).await
        {
            Ok(Ok(docs)) => {
                tracing::info!(count = docs.len(), "prefetched documents");
                state.prefetch_docs = docs;
            }
            Ok(Err(err)) => {
                state.record_node_error(format!("document prefetch failed: {err}"));
            }
            Err(_) => {
                state.record_node_error("document prefetch timed out".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ArticleRequest;
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicUsize;

    struct CountingDocs {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl DocumentService for CountingDocs {
        async fn get_merged_knowledge(
            &self,
            _dk: &str,
            _web: &[crate::article::SearchResult],
        ) -> Result<String, String> {
            Ok(String::new())
        }

        async fn batch_load(&self, doc_ids: &[String]) -> Result<Vec<Value>, String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(doc_ids.iter().map(|id| json!({"id": id})).collect())
        }
    }

    #[tokio::test]
    async fn prefetch_runs_exactly_once_and_only_for_researcher() {
        let docs = Arc::new(CountingDocs {
            loads: AtomicUsize::new(0),
        });
        let mw = ContextPrefetchMiddleware::new(Some(docs.clone()));
        let mut state = ArticleState::new(&ArticleRequest::new("t"));
        state.document_ids = vec!["d1".into(), "d2".into()];

        mw.before_node(&mut state, NodeKind::Planner).await;
        assert_eq!(docs.loads.load(Ordering::SeqCst), 0);

        mw.before_node(&mut state, NodeKind::Researcher).await;
        assert_eq!(state.prefetch_docs.len(), 2);

        mw.before_node(&mut state, NodeKind::Researcher).await;
        assert_eq!(docs.loads.load(Ordering::SeqCst), 1);
    }
}
