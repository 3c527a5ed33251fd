// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::state::ArenaState;
use super::store::StoreError;

/// JSON snapshot of the arena state on local disk.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "arena-state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Returns `None` when no snapshot has been written yet.
    pub async fn load(&self) -> Result<Option<ArenaState>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let state: ArenaState = serde_json::from_slice(&bytes)?;
                info!(
                    "Loaded arena snapshot from {} ({} contests)",
                    self.path.display(),
                    state.contests.len()
                );
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a sibling temp file, then renames over the target.
    pub async fn save(&self, state: &ArenaState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!("Wrote arena snapshot ({} bytes)", bytes.len());
        Ok(())
    }
}
