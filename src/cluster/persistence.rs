use super::types::PersistentState;
use crate::error::ClusterError;

use std::path::{Path, PathBuf};

pub const CONSENSUS_FILE: &str = "consensus.json";

/// Durable home of the consensus term, vote and log.
///
/// Writes go to a temporary file that is then renamed over the old one, so a
/// crash never leaves a half-written state behind.
pub struct ConsensusStore {
    path: Option<PathBuf>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ConsensusStore {
    pub fn new(data_dir: Option<&Path>) -> Self {
        Self {
            path: data_dir.map(|dir| dir.join(CONSENSUS_FILE)),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The persisted state, or an empty one when nothing was saved yet.
    pub async fn load(&self) -> Result<PersistentState, ClusterError> {
        let Some(path) = &self.path else {
            return Ok(PersistentState::default());
        };

        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ClusterError::Persistence(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersistentState::default()),
            Err(e) => Err(ClusterError::Persistence(format!("{}: {}", path.display(), e))),
        }
    }

    /// Saves the state produced by `snapshot`, taken while holding the write lock
    /// so concurrent saves land in the order their snapshots were taken.
    pub async fn save_with<F>(&self, snapshot: F) -> Result<(), ClusterError>
    where
        F: FnOnce() -> PersistentState,
    {
        let _guard = self.write_lock.lock().await;
        let state = snapshot();

        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(&state)
            .map_err(|e| ClusterError::Persistence(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClusterError::Persistence(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| ClusterError::Persistence(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| ClusterError::Persistence(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }
}
