//! The coder-and-artist node: two-way parallel generation of code blocks
//! and images.
//!
//! ASCII-flowchart preprocessing runs serially first (cheap, pure regex),
//! then both generators fan out concurrently over an immutable snapshot of
//! the state. Their outputs are applied serially in a fixed order
//! (coder, then artist), which is safe because the two rewrite disjoint
//! placeholder texts.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::state::ArticleState;
use crate::types::NodeKind;

use super::artist::{ArtistAgent, ArtistOutput};
use super::coder::{CoderAgent, CoderOutput};
use super::{Agent, AgentContext, AgentError};

pub struct CoderAndArtistAgent {
    coder: Arc<CoderAgent>,
    artist: Arc<ArtistAgent>,
}

impl CoderAndArtistAgent {
    pub fn new(coder: Arc<CoderAgent>, artist: Arc<ArtistAgent>) -> Self {
        CoderAndArtistAgent { coder, artist }
    }
}

#[async_trait]
impl Agent for CoderAndArtistAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::CoderAndArtist
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if state.sections.is_empty() {
            return Ok(());
        }
        ArtistAgent::preprocess_ascii_flowcharts(state);

        let snapshot = state.clone();
        let coder = Arc::clone(&self.coder);
        let artist = Arc::clone(&self.artist);
        let coder_ctx = ctx.clone();
        let artist_ctx = ctx.clone();
        let coder_snapshot = snapshot.clone();

        let (coder_out, artist_out): (CoderOutput, ArtistOutput) = if ctx.settings.tracing_enabled {
            // Serial under tracing, same as every other fan-out.
            let c = coder.generate(&coder_snapshot, &coder_ctx).await;
            let a = artist.generate(&snapshot, &artist_ctx).await;
            (c, a)
        } else {
            let coder_task = tokio::spawn(async move {
                coder.generate(&coder_snapshot, &coder_ctx).await
            });
            let artist_task =
                tokio::spawn(async move { artist.generate(&snapshot, &artist_ctx).await });
            let coder_out = match tokio::time::timeout(Duration::from_secs(180), coder_task).await {
                Ok(Ok(out)) => out,
                _ => {
                    state.record_node_error("code generation timed out".to_string());
                    CoderOutput::default()
                }
            };
            let artist_out = match tokio::time::timeout(Duration::from_secs(180), artist_task).await
            {
                Ok(Ok(out)) => out,
                _ => {
                    state.record_node_error("image generation timed out".to_string());
                    ArtistOutput::default()
                }
            };
            (coder_out, artist_out)
        };

        CoderAgent::apply(state, coder_out);
        ArtistAgent::apply(state, artist_out);

        tracing::info!(
            code_blocks = state.code_blocks.len(),
            images = state.images.len(),
            "code and image generation complete"
        );
        ctx.emitter.log(
            "info",
            format!(
                "generated {} code blocks, {} images",
                state.code_blocks.len(),
                state.images.len()
            ),
        );
        Ok(())
    }
}
