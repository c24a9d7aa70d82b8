//! Task-log middleware: wall time and token delta per node.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::NodeMiddleware;
use crate::llm::TokenTracker;
use crate::state::ArticleState;
use crate::tasklog::{StepTokens, TaskLog};
use crate::types::NodeKind;

struct NodeStart {
    at: Instant,
    input_tokens: u64,
    output_tokens: u64,
}

/// Records one step per node execution into the shared [`TaskLog`].
pub struct TaskLogMiddleware {
    log: Arc<Mutex<TaskLog>>,
    tracker: Arc<TokenTracker>,
    starts: Mutex<FxHashMap<NodeKind, NodeStart>>,
}

impl TaskLogMiddleware {
    pub fn new(log: Arc<Mutex<TaskLog>>, tracker: Arc<TokenTracker>) -> Self {
        TaskLogMiddleware {
            log,
            tracker,
            starts: Mutex::new(FxHashMap::default()),
        }
    }
}

#[async_trait]
impl NodeMiddleware for TaskLogMiddleware {
    fn name(&self) -> &'static str {
        "task_log"
    }

    async fn before_node(&self, _state: &mut ArticleState, node: NodeKind) {
        let summary = self.tracker.summary();
        self.starts.lock().expect("task log stash poisoned").insert(
            node,
            NodeStart {
                at: Instant::now(),
                input_tokens: summary.total_input_tokens,
                output_tokens: summary.total_output_tokens,
            },
        );
    }

    async fn after_node(&self, state: &mut ArticleState, node: NodeKind) {
        let Some(start) = self
            .starts
            .lock()
            .expect("task log stash poisoned")
            .remove(&node)
        else {
            return;
        };
        let summary = self.tracker.summary();
        let tokens = StepTokens {
            input: summary.total_input_tokens.saturating_sub(start.input_tokens),
            output: summary.total_output_tokens.saturating_sub(start.output_tokens),
        };
        let level = if state.has_failed() {
            "error"
        } else if state.node_errors.is_empty() {
            "info"
        } else {
            "warning"
        };
        let detail = state.error.clone().unwrap_or_default();
        self.log.lock().expect("task log poisoned").log_step(
            node.encode(),
            "run",
            level,
            &detail,
            start.at.elapsed().as_millis() as u64,
            tokens,
        );
    }
}
