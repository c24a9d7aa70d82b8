//! Checkpointing: the state is persisted after every node so interrupted
//! runs (including interactive outline confirmation) can resume.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

use crate::state::ArticleState;
use crate::types::NodeKind;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub step: u64,
    /// The node the run will execute next.
    pub next_node: NodeKind,
    pub state: ArticleState,
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("checkpoint io error: {0}")]
    #[diagnostic(code(quillweave::checkpoint::io))]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    #[diagnostic(code(quillweave::checkpoint::serde))]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointerError>;
    async fn load_latest(&self, session_id: &str)
    -> Result<Option<Checkpoint>, CheckpointerError>;
}

/// Keeps the latest checkpoint per session in memory.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    store: Mutex<FxHashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointerError> {
        self.store
            .lock()
            .expect("checkpointer poisoned")
            .insert(checkpoint.session_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load_latest(
        &self,
        session_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointerError> {
        Ok(self
            .store
            .lock()
            .expect("checkpointer poisoned")
            .get(session_id)
            .cloned())
    }
}

/// One JSON file per session under a directory.
#[derive(Clone, Debug)]
pub struct JsonFileCheckpointer {
    dir: PathBuf,
}

impl JsonFileCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonFileCheckpointer { dir: dir.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        let safe = crate::utils::text::safe_title(session_id);
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl Checkpointer for JsonFileCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointerError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec(checkpoint)?;
        tokio::fs::write(self.path_for(&checkpoint.session_id), bytes).await?;
        Ok(())
    }

    async fn load_latest(
        &self,
        session_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointerError> {
        let path = self.path_for(session_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
