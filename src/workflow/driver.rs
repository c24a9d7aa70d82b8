//! The workflow driver: sessions, step loop, cancellation, interrupts.
//!
//! One driver executes one node at a time. At every node boundary it
//! checks the external cancellation signal; after every node it applies
//! the middleware chain's `after` hooks, checkpoints, and emits progress.
//! Once the state carries a fatal error, remaining nodes are skipped and
//! the loop walks static edges straight to the end.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::agents::{AgentContext, OutlineDecision, apply_outline_decision};
use crate::events::{EventKind, stage_progress};
use crate::middleware::MiddlewarePipeline;
use crate::services::TaskManager;
use crate::state::ArticleState;
use crate::types::{NarrativeMode, NodeKind};

use super::checkpoint::{Checkpoint, Checkpointer};
use super::builder::Workflow;

/// Payload handed to the caller when an interactive run pauses after the
/// planner.
#[derive(Clone, Debug, serde::Serialize)]
pub struct InterruptPayload {
    pub r#type: &'static str,
    pub title: String,
    pub sections: Vec<crate::article::SectionPlan>,
    pub narrative_mode: NarrativeMode,
    pub narrative_flow: crate::article::NarrativeFlow,
    pub sections_narrative_roles: Vec<String>,
}

/// How a driver call ended.
pub enum RunOutcome {
    Completed(Box<ArticleState>),
    Cancelled(Box<ArticleState>),
    Interrupted {
        session_id: String,
        payload: Box<InterruptPayload>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionInit {
    Fresh,
    Resumed { checkpoint_step: u64 },
}

#[derive(Debug, Error, Diagnostic)]
pub enum DriverError {
    #[error("session not found: {session_id}")]
    #[diagnostic(code(quillweave::driver::session_not_found))]
    SessionNotFound { session_id: String },

    #[error("session {session_id} is not paused at an interrupt")]
    #[diagnostic(code(quillweave::driver::not_interrupted))]
    NotInterrupted { session_id: String },

    #[error(transparent)]
    #[diagnostic(code(quillweave::driver::checkpointer))]
    Checkpointer(#[from] super::checkpoint::CheckpointerError),
}

#[derive(Clone)]
struct Session {
    state: ArticleState,
    next_node: NodeKind,
    step: u64,
    awaiting_outline: bool,
}

pub struct WorkflowDriver {
    workflow: Arc<Workflow>,
    pipeline: Arc<MiddlewarePipeline>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    task_manager: Option<Arc<dyn TaskManager>>,
    sessions: FxHashMap<String, Session>,
}

impl WorkflowDriver {
    pub fn new(
        workflow: Arc<Workflow>,
        pipeline: Arc<MiddlewarePipeline>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        task_manager: Option<Arc<dyn TaskManager>>,
    ) -> Self {
        WorkflowDriver {
            workflow,
            pipeline,
            checkpointer,
            task_manager,
            sessions: FxHashMap::default(),
        }
    }

    /// Create a session, resuming from the latest checkpoint when one
    /// exists.
    pub async fn create_session(
        &mut self,
        session_id: &str,
        initial_state: ArticleState,
    ) -> Result<SessionInit, DriverError> {
        if let Some(cp) = &self.checkpointer {
            if let Some(saved) = cp.load_latest(session_id).await? {
                tracing::info!(session = session_id, step = saved.step, "resuming from checkpoint");
                self.sessions.insert(
                    session_id.to_string(),
                    Session {
                        state: saved.state,
                        next_node: saved.next_node,
                        step: saved.step,
                        awaiting_outline: false,
                    },
                );
                return Ok(SessionInit::Resumed {
                    checkpoint_step: saved.step,
                });
            }
        }
        self.sessions.insert(
            session_id.to_string(),
            Session {
                state: initial_state,
                next_node: self.workflow.entry(),
                step: 0,
                awaiting_outline: false,
            },
        );
        Ok(SessionInit::Fresh)
    }

    fn is_cancelled(&self, task_id: &str) -> bool {
        self.task_manager
            .as_ref()
            .is_some_and(|tm| tm.is_cancelled(task_id))
    }

    async fn save_checkpoint(&self, session_id: &str, session: &Session) {
        if let Some(cp) = &self.checkpointer {
            let checkpoint = Checkpoint {
                session_id: session_id.to_string(),
                step: session.step,
                next_node: session.next_node,
                state: session.state.clone(),
            };
            if let Err(err) = cp.save(&checkpoint).await {
                tracing::warn!(%err, "checkpoint save failed");
            }
        }
    }

    /// Run until End, cancellation, or an interactive interrupt.
    pub async fn run_until_complete(
        &mut self,
        session_id: &str,
        ctx: &AgentContext,
        interactive: bool,
    ) -> Result<RunOutcome, DriverError> {
        let mut session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| DriverError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;

        loop {
            let node = session.next_node;
            if node == NodeKind::End {
                break;
            }
            if self.is_cancelled(ctx.emitter.task_id()) {
                tracing::warn!(session = session_id, at = %node, "cancellation signal received");
                ctx.emitter.emit(EventKind::Cancelled);
                self.sessions.insert(session_id.to_string(), session.clone());
                return Ok(RunOutcome::Cancelled(Box::new(session.state)));
            }

            let Some(agent) = self.workflow.node(node) else {
                tracing::error!(node = %node, "node missing from compiled graph");
                break;
            };

            ctx.emitter
                .progress(node.encode(), stage_progress(node), format!("stage {node}"));

            if session.state.has_failed() {
                // Fatal error upstream: every remaining node is a no-op.
                tracing::debug!(node = %node, "skipping node after fatal error");
            } else {
                self.pipeline.before(&mut session.state, node).await;
                if let Err(err) = agent.run(&mut session.state, ctx).await {
                    session.state.fail(format!("{node}: {err}"));
                    ctx.emitter.emit(EventKind::Error {
                        message: err.to_string(),
                    });
                }
                self.pipeline.after(&mut session.state, node).await;
            }

            session.step += 1;
            session.next_node = if session.state.has_failed() {
                // Walk the static spine so terminal bookkeeping still
                // happens without re-entering any loop.
                static_successor(node)
            } else {
                self.workflow.next(node, &mut session.state)
            };
            self.save_checkpoint(session_id, &session).await;

            ctx.emitter.emit(EventKind::Stage {
                stage: node.encode().to_string(),
                payload: serde_json::to_value(&session.state).unwrap_or(serde_json::Value::Null),
            });

            if interactive && node == NodeKind::Planner && !session.state.has_failed() {
                let payload = build_interrupt(&session.state);
                session.awaiting_outline = true;
                self.sessions.insert(session_id.to_string(), session);
                return Ok(RunOutcome::Interrupted {
                    session_id: session_id.to_string(),
                    payload: Box::new(payload),
                });
            }
        }

        ctx.emitter
            .progress("end", 100, "workflow complete".to_string());
        self.sessions.insert(session_id.to_string(), session.clone());
        Ok(RunOutcome::Completed(Box::new(session.state)))
    }

    /// Resume an interrupted session with the caller's outline decision.
    pub async fn resume(
        &mut self,
        session_id: &str,
        decision: OutlineDecision,
        ctx: &AgentContext,
    ) -> Result<RunOutcome, DriverError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DriverError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        if !session.awaiting_outline {
            return Err(DriverError::NotInterrupted {
                session_id: session_id.to_string(),
            });
        }
        session.awaiting_outline = false;
        apply_outline_decision(&mut session.state, decision);
        // Resumption is never interactive again; the outline is settled.
        self.run_until_complete(session_id, ctx, false).await
    }

    #[must_use]
    pub fn session_state(&self, session_id: &str) -> Option<&ArticleState> {
        self.sessions.get(session_id).map(|s| &s.state)
    }
}

/// Static pipeline spine used to fast-forward after a fatal error.
fn static_successor(node: NodeKind) -> NodeKind {
    match node {
        NodeKind::Start => NodeKind::Researcher,
        NodeKind::Researcher => NodeKind::Planner,
        NodeKind::Planner => NodeKind::Writer,
        NodeKind::Writer => NodeKind::CheckKnowledge,
        NodeKind::CheckKnowledge | NodeKind::RefineSearch | NodeKind::EnhanceWithKnowledge => {
            NodeKind::Questioner
        }
        NodeKind::Questioner | NodeKind::DeepenContent => NodeKind::SectionEvaluate,
        NodeKind::SectionEvaluate | NodeKind::SectionImprove => NodeKind::CoderAndArtist,
        NodeKind::CoderAndArtist => NodeKind::CrossSectionDedup,
        NodeKind::CrossSectionDedup => NodeKind::ConsistencyCheck,
        NodeKind::ConsistencyCheck => NodeKind::Reviewer,
        NodeKind::Reviewer | NodeKind::Revision => NodeKind::FactCheck,
        NodeKind::FactCheck => NodeKind::TextCleanup,
        NodeKind::TextCleanup => NodeKind::Humanizer,
        NodeKind::Humanizer => NodeKind::Assembler,
        NodeKind::Assembler => NodeKind::SummaryGenerator,
        NodeKind::SummaryGenerator | NodeKind::End => NodeKind::End,
    }
}

fn build_interrupt(state: &ArticleState) -> InterruptPayload {
    let outline = state.outline.clone().unwrap_or_default();
    InterruptPayload {
        r#type: "confirm_outline",
        title: outline.title.clone(),
        sections_narrative_roles: outline
            .sections
            .iter()
            .map(|s| format!("{:?}", s.narrative_role))
            .collect(),
        narrative_mode: outline.narrative_mode,
        narrative_flow: outline.narrative_flow.clone(),
        sections: outline.sections,
    }
}
