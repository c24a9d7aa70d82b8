//! Tracing middleware: binds the run's trace id to node execution logs.

use async_trait::async_trait;

use super::NodeMiddleware;
use crate::state::ArticleState;
use crate::types::NodeKind;

/// Ensures every node execution is logged with the run's trace id so
/// downstream log lines can be correlated per run.
#[derive(Debug, Default)]
pub struct TracingMiddleware {
    enabled: bool,
}

impl TracingMiddleware {
    pub fn new(enabled: bool) -> Self {
        TracingMiddleware { enabled }
    }
}

#[async_trait]
impl NodeMiddleware for TracingMiddleware {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn before_node(&self, state: &mut ArticleState, node: NodeKind) {
        if state.trace_id.is_empty() {
            state.trace_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        }
        tracing::info!(trace_id = %state.trace_id, node = %node, "node start");
    }
}
