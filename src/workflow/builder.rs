//! Fluent builder for the workflow graph.
//!
//! Nodes are registered per [`NodeKind`]; edges are static except where a
//! conditional predicate is installed, in which case the predicate decides
//! the successor. `compile` validates the topology before anything runs.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::agents::Agent;
use crate::state::ArticleState;
use crate::types::NodeKind;

/// A conditional edge: inspects (and may adjust) the state, returns the
/// successor node.
pub type EdgePredicate = Arc<dyn Fn(&mut ArticleState) -> NodeKind + Send + Sync>;

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("no edge out of Start")]
    #[diagnostic(
        code(quillweave::graph::no_entry),
        help("Add an edge from NodeKind::Start to the first node.")
    )]
    NoEntry,

    #[error("edge target {0} is not a registered node")]
    #[diagnostic(code(quillweave::graph::dangling_edge))]
    DanglingEdge(NodeKind),

    #[error("node {0} has no outgoing edge")]
    #[diagnostic(
        code(quillweave::graph::dead_end),
        help("Every registered node needs an edge or a conditional edge to End or a successor.")
    )]
    DeadEnd(NodeKind),

    #[error("attempted to register virtual node {0}")]
    #[diagnostic(code(quillweave::graph::virtual_node))]
    VirtualNode(NodeKind),
}

#[derive(Default)]
pub struct WorkflowBuilder {
    nodes: FxHashMap<NodeKind, Arc<dyn Agent>>,
    edges: FxHashMap<NodeKind, NodeKind>,
    conditional_edges: FxHashMap<NodeKind, EdgePredicate>,
}

impl WorkflowBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Registering `Start`/`End` is rejected at compile.
    #[must_use]
    pub fn add_node(mut self, kind: NodeKind, agent: Arc<dyn Agent>) -> Self {
        self.nodes.insert(kind, agent);
        self
    }

    /// Add an unconditional edge. A later edge from the same node
    /// replaces the earlier one.
    #[must_use]
    pub fn add_edge(mut self, from: NodeKind, to: NodeKind) -> Self {
        self.edges.insert(from, to);
        self
    }

    /// Install a conditional edge; it takes precedence over any static
    /// edge from the same node.
    #[must_use]
    pub fn add_conditional_edge(mut self, from: NodeKind, predicate: EdgePredicate) -> Self {
        self.conditional_edges.insert(from, predicate);
        self
    }

    /// Validate and produce the immutable graph.
    pub fn compile(self) -> Result<Workflow, GraphError> {
        for kind in self.nodes.keys() {
            if kind.is_virtual() {
                return Err(GraphError::VirtualNode(*kind));
            }
        }
        let entry = *self.edges.get(&NodeKind::Start).ok_or(GraphError::NoEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::DanglingEdge(entry));
        }
        for (&from, &to) in &self.edges {
            if from != NodeKind::Start && !self.nodes.contains_key(&from) {
                return Err(GraphError::DanglingEdge(from));
            }
            if to != NodeKind::End && !self.nodes.contains_key(&to) {
                return Err(GraphError::DanglingEdge(to));
            }
        }
        for kind in self.nodes.keys() {
            if !self.edges.contains_key(kind) && !self.conditional_edges.contains_key(kind) {
                return Err(GraphError::DeadEnd(*kind));
            }
        }
        Ok(Workflow {
            nodes: self.nodes,
            edges: self.edges,
            conditional_edges: self.conditional_edges,
            entry,
        })
    }
}

/// The compiled, immutable workflow graph.
pub struct Workflow {
    nodes: FxHashMap<NodeKind, Arc<dyn Agent>>,
    edges: FxHashMap<NodeKind, NodeKind>,
    conditional_edges: FxHashMap<NodeKind, EdgePredicate>,
    entry: NodeKind,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("conditional_edges", &self.conditional_edges.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .finish()
    }
}

impl Workflow {
    #[must_use]
    pub fn entry(&self) -> NodeKind {
        self.entry
    }

    #[must_use]
    pub fn node(&self, kind: NodeKind) -> Option<&Arc<dyn Agent>> {
        self.nodes.get(&kind)
    }

    /// Successor of `from` given the current state. Conditional edges win
    /// over static ones; a node with neither terminates the run.
    pub fn next(&self, from: NodeKind, state: &mut ArticleState) -> NodeKind {
        if let Some(predicate) = self.conditional_edges.get(&from) {
            let target = predicate(state);
            if target == NodeKind::End || self.nodes.contains_key(&target) {
                return target;
            }
            tracing::warn!(from = %from, to = %target, "conditional edge routed to unknown node");
            return NodeKind::End;
        }
        self.edges.get(&from).copied().unwrap_or(NodeKind::End)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentContext, AgentError};
    use async_trait::async_trait;

    struct Noop(NodeKind);

    #[async_trait]
    impl Agent for Noop {
        fn kind(&self) -> NodeKind {
            self.0
        }
        async fn run(&self, _: &mut ArticleState, _: &AgentContext) -> Result<(), AgentError> {
            Ok(())
        }
    }

    #[test]
    fn compile_rejects_missing_entry() {
        let err = WorkflowBuilder::new()
            .add_node(NodeKind::Researcher, Arc::new(Noop(NodeKind::Researcher)))
            .add_edge(NodeKind::Researcher, NodeKind::End)
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::NoEntry));
    }

    #[test]
    fn compile_rejects_dangling_edges_and_dead_ends() {
        let err = WorkflowBuilder::new()
            .add_node(NodeKind::Researcher, Arc::new(Noop(NodeKind::Researcher)))
            .add_edge(NodeKind::Start, NodeKind::Researcher)
            .add_edge(NodeKind::Researcher, NodeKind::Planner)
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::DanglingEdge(NodeKind::Planner)));

        let err = WorkflowBuilder::new()
            .add_node(NodeKind::Researcher, Arc::new(Noop(NodeKind::Researcher)))
            .add_edge(NodeKind::Start, NodeKind::Researcher)
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::DeadEnd(NodeKind::Researcher)));
    }

    #[test]
    fn conditional_edge_wins_over_static() {
        use crate::state::ArticleRequest;
        let workflow = WorkflowBuilder::new()
            .add_node(NodeKind::Researcher, Arc::new(Noop(NodeKind::Researcher)))
            .add_node(NodeKind::Planner, Arc::new(Noop(NodeKind::Planner)))
            .add_edge(NodeKind::Start, NodeKind::Researcher)
            .add_edge(NodeKind::Researcher, NodeKind::End)
            .add_conditional_edge(
                NodeKind::Researcher,
                Arc::new(|_s: &mut ArticleState| NodeKind::Planner),
            )
            .add_edge(NodeKind::Planner, NodeKind::End)
            .compile()
            .unwrap();
        let mut state = ArticleState::new(&ArticleRequest::new("t"));
        assert_eq!(workflow.next(NodeKind::Researcher, &mut state), NodeKind::Planner);
        assert_eq!(workflow.next(NodeKind::Planner, &mut state), NodeKind::End);
    }
}
