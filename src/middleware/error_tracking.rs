//! Error tracking middleware: drains per-node scratch errors into the
//! accumulated history.

use async_trait::async_trait;

use super::NodeMiddleware;
use crate::state::ArticleState;
use crate::types::NodeKind;

#[derive(Debug, Default)]
pub struct ErrorTrackingMiddleware;

#[async_trait]
impl NodeMiddleware for ErrorTrackingMiddleware {
    fn name(&self) -> &'static str {
        "error_tracking"
    }

    async fn after_node(&self, state: &mut ArticleState, node: NodeKind) {
        if state.node_errors.is_empty() {
            return;
        }
        for err in state.node_errors.drain(..) {
            tracing::warn!(node = %node, error = %err, "non-fatal node error");
            state.error_history.push(format!("[{node}] {err}"));
        }
    }
}
