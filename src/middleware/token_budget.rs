//! Token budget middleware.
//!
//! Each node owns a share of the run's total token budget: the writer
//! 35%, researcher/planner/reviewer/revision 10% each, everything else
//! 5%. When cumulative usage crosses 80% of the total the middleware sets
//! the budget-warning flag and proactively shrinks the accumulated
//! knowledge buffer so downstream prompts stop growing.

use async_trait::async_trait;
use std::sync::Arc;

use super::NodeMiddleware;
use crate::llm::TokenTracker;
use crate::state::ArticleState;
use crate::types::NodeKind;
use crate::utils::text::truncate_chars;

const WARN_RATIO: f64 = 0.8;
const COMPRESSED_KNOWLEDGE_CHARS: usize = 4000;

/// Budget share for a node, as a fraction of the total.
pub fn node_share(node: NodeKind) -> f64 {
    match node {
        NodeKind::Writer => 0.35,
        NodeKind::Researcher | NodeKind::Planner | NodeKind::Reviewer | NodeKind::Revision => 0.10,
        _ => 0.05,
    }
}

pub struct TokenBudgetMiddleware {
    enabled: bool,
    tracker: Arc<TokenTracker>,
    total_budget: u64,
}

impl TokenBudgetMiddleware {
    pub fn new(enabled: bool, tracker: Arc<TokenTracker>, total_budget: u64) -> Self {
        TokenBudgetMiddleware {
            enabled,
            tracker,
            total_budget: total_budget.max(1),
        }
    }
}

#[async_trait]
impl NodeMiddleware for TokenBudgetMiddleware {
    fn name(&self) -> &'static str {
        "token_budget"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn before_node(&self, state: &mut ArticleState, node: NodeKind) {
        let used = self.tracker.total_tokens();
        let ratio = used as f64 / self.total_budget as f64;
        let share = node_share(node);
        tracing::debug!(
            node = %node,
            used,
            budget = self.total_budget,
            share,
            "token budget check"
        );
        if ratio <= WARN_RATIO {
            return;
        }
        if !state.token_budget_warning {
            tracing::warn!(
                used,
                budget = self.total_budget,
                "token usage crossed 80% of budget; compressing context"
            );
            state.token_budget_warning = true;
        }
        if state.accumulated_knowledge.len() > COMPRESSED_KNOWLEDGE_CHARS {
            state.accumulated_knowledge =
                truncate_chars(&state.accumulated_knowledge, COMPRESSED_KNOWLEDGE_CHARS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenUsage;
    use crate::state::ArticleRequest;

    #[test]
    fn shares_follow_the_budget_table() {
        assert_eq!(node_share(NodeKind::Writer), 0.35);
        assert_eq!(node_share(NodeKind::Researcher), 0.10);
        assert_eq!(node_share(NodeKind::Revision), 0.10);
        assert_eq!(node_share(NodeKind::Humanizer), 0.05);
    }

    #[tokio::test]
    async fn warning_fires_above_eighty_percent() {
        let tracker = Arc::new(TokenTracker::new());
        let mw = TokenBudgetMiddleware::new(true, Arc::clone(&tracker), 1000);
        let mut state = ArticleState::new(&ArticleRequest::new("t"));
        state.accumulated_knowledge = "k".repeat(10_000);

        mw.before_node(&mut state, NodeKind::Writer).await;
        assert!(!state.token_budget_warning);

        tracker.record(
            "writer",
            TokenUsage {
                input_tokens: 500,
                output_tokens: 400,
                model: "m".into(),
            },
        );
        mw.before_node(&mut state, NodeKind::Reviewer).await;
        assert!(state.token_budget_warning);
        assert!(state.accumulated_knowledge.len() <= COMPRESSED_KNOWLEDGE_CHARS + 3);
    }
}
