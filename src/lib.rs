//! # Quillweave
//!
//! Multi-agent long-form article generation core: a conditional workflow
//! graph over one growing shared state, a middleware pipeline wrapping
//! every node, bounded intra-node parallelism, and a tiered LLM proxy.
//!
//! The crate produces a finished markdown article from a single topic by
//! orchestrating cooperating specialist agents: research, outline
//! planning, parallel section drafting, bounded knowledge/depth/quality/
//! revision loops, code and image generation, consistency checks, and a
//! deterministic assembly pass.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quillweave::generator::{ArticleGenerator, GenerateOutcome};
//! use quillweave::state::ArticleRequest;
//! use quillweave::types::TargetLength;
//! # use quillweave::llm::LlmClient;
//! # async fn example(llm: Arc<dyn LlmClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut generator = ArticleGenerator::builder(llm).build()?;
//! let request = ArticleRequest::new("Rust async runtimes")
//!     .article_type("deep-dive")
//!     .target_length(TargetLength::Medium);
//! if let GenerateOutcome::Complete(report) = generator.generate(request).await {
//!     println!("{}", report.markdown);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`state`]: the shared [`state::ArticleState`] every agent reads and
//!   updates; exactly one node mutates it at a time.
//! - [`workflow`]: graph builder, the four loop predicates, checkpointing,
//!   and the driver (cancellation, interrupts, progress events).
//! - [`middleware`]: tracing, task log, state reducers, error tracking,
//!   three-layer context compression, token budget, document prefetch.
//! - [`agents`]: the specialist agents, one per workflow node.
//! - [`llm`]: the LLM client contract, tier routing, and resilience.
//! - [`knowledge`]: smart multi-source search, source curation, deep
//!   scraping, and the researcher's disk cache.
//! - [`executor`]: bounded fan-out with ordered result collection.
//! - [`postprocess`]: deterministic markdown repair and substitution.

pub mod agents;
pub mod article;
pub mod events;
pub mod executor;
pub mod generator;
pub mod knowledge;
pub mod llm;
pub mod middleware;
pub mod postprocess;
pub mod profile;
pub mod prompts;
pub mod services;
pub mod settings;
pub mod state;
pub mod tasklog;
pub mod types;
pub mod utils;
pub mod workflow;

pub use generator::{ArticleGenerator, GenerateOutcome, GenerateReport};
pub use state::{ArticleRequest, ArticleState};
pub use types::{NodeKind, TargetLength, Tier};
