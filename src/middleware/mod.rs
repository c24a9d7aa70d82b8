//! Node middleware pipeline.
//!
//! Every workflow node runs as `before_hooks -> agent -> after_hooks`.
//! Hooks mutate the shared state directly; execution order is registration
//! order for `before` and the same order for `after`. Each middleware has
//! its own kill-switch and the whole pipeline sits behind a master switch.

mod context;
mod error_tracking;
mod prefetch;
mod reducers;
mod task_log;
mod token_budget;
mod tracing_mw;

pub use context::ContextManagementMiddleware;
pub use error_tracking::ErrorTrackingMiddleware;
pub use prefetch::ContextPrefetchMiddleware;
pub use reducers::{ReducerMiddleware, merge_list_dedup, merge_sections};
pub use task_log::TaskLogMiddleware;
pub use token_budget::TokenBudgetMiddleware;
pub use tracing_mw::TracingMiddleware;

use async_trait::async_trait;
use std::sync::Arc;

use crate::state::ArticleState;
use crate::types::NodeKind;

/// A cross-cutting concern wrapped around every node.
#[async_trait]
pub trait NodeMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Kill-switch; disabled middlewares are skipped entirely.
    fn enabled(&self) -> bool {
        true
    }

    async fn before_node(&self, _state: &mut ArticleState, _node: NodeKind) {}

    async fn after_node(&self, _state: &mut ArticleState, _node: NodeKind) {}
}

/// Ordered middleware chain with a master switch.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Arc<dyn NodeMiddleware>>,
    enabled: bool,
}

impl MiddlewarePipeline {
    pub fn new(enabled: bool) -> Self {
        MiddlewarePipeline {
            middlewares: Vec::new(),
            enabled,
        }
    }

    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn NodeMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub async fn before(&self, state: &mut ArticleState, node: NodeKind) {
        if !self.enabled {
            return;
        }
        for mw in &self.middlewares {
            if mw.enabled() {
                mw.before_node(state, node).await;
            }
        }
    }

    pub async fn after(&self, state: &mut ArticleState, node: NodeKind) {
        if !self.enabled {
            return;
        }
        for mw in &self.middlewares {
            if mw.enabled() {
                mw.after_node(state, node).await;
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}
