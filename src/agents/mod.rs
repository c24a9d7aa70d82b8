//! The workflow agents.
//!
//! Every agent implements [`Agent`]: one `run` over the shared state.
//! Agents degrade instead of raising wherever a fallback makes sense;
//! fatal conditions (an empty outline, a missing precondition) return an
//! [`AgentError`], which the driver converts into the state's error
//! channel and short-circuits the rest of the graph.

mod artist;
mod assembler;
mod coder;
mod consistency;
mod dedup;
mod factcheck;
mod humanizer;
mod loops;
mod media;
mod planner;
mod questioner;
mod researcher;
mod reviewer;
mod search_coordinator;
mod summary;
mod text_cleanup;
mod writer;

pub use artist::{
    ArtistAgent, ArtistOutput, ImageTask, TaskSource, infer_illustration_type, sanitize_mermaid,
    validate_mermaid,
};
pub use assembler::AssemblerAgent;
pub use coder::{CodePlaceholder, CoderAgent, CoderOutput};
pub use consistency::{ConsistencyCheckAgent, ThreadCheckerAgent, VoiceCheckerAgent};
pub use dedup::{CrossSectionDedup, LexicalSimilarity, SimilarityModel};
pub use factcheck::FactCheckAgent;
pub use humanizer::HumanizerAgent;
pub use loops::{
    DeepenContentAgent, EnhanceWithKnowledgeAgent, RevisionAgent, SectionEvaluateAgent,
    SectionImproveAgent,
};
pub use media::CoderAndArtistAgent;
pub use planner::{OutlineDecision, PlannerAgent, apply_outline_decision};
pub use questioner::QuestionerAgent;
pub use researcher::ResearcherAgent;
pub use reviewer::ReviewerAgent;
pub use search_coordinator::{RefineSearchAgent, SearchCoordinator};
pub use summary::SummaryGeneratorAgent;
pub use text_cleanup::TextCleanupAgent;
pub use writer::WriterAgent;

use async_trait::async_trait;
use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;

use crate::events::EventEmitter;
use crate::executor::ParallelTaskExecutor;
use crate::settings::WorkflowSettings;
use crate::state::ArticleState;
use crate::types::NodeKind;

/// Execution context handed to every agent run.
#[derive(Clone)]
pub struct AgentContext {
    pub emitter: EventEmitter,
    pub executor: ParallelTaskExecutor,
    pub settings: Arc<WorkflowSettings>,
}

impl AgentContext {
    #[must_use]
    pub fn workers(&self) -> usize {
        self.settings.effective_workers()
    }
}

/// Fatal agent failures. Everything recoverable goes through
/// `state.record_node_error` instead.
#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(quillweave::agent::missing_input),
        help("A previous node should have produced {what}; check the pipeline order.")
    )]
    MissingInput { what: &'static str },

    #[error("invariant violated: {message}")]
    #[diagnostic(code(quillweave::agent::invariant))]
    Invariant { message: String },
}

/// A workflow agent: one node's worth of work over the shared state.
///
/// The driver guarantees `run` is never invoked once `state.error` is set.
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> NodeKind;

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError>;
}
