// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Arena state store
//!
//! A single `RwLock` guards the whole state. Writers go through
//! [`ArenaStore::transaction`], which mutates a clone and only swaps it in
//! after the optional snapshot has been persisted, so a transaction either
//! commits completely or leaves the state exactly as it was.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info};

use super::snapshot::SnapshotFile;
use super::state::ArenaState;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct ArenaStore {
    state: Arc<RwLock<ArenaState>>,
    snapshot: Option<SnapshotFile>,
}

impl ArenaStore {
    pub fn in_memory() -> Self {
        Self::with_state(ArenaState::default(), None)
    }

    pub fn with_state(state: ArenaState, snapshot: Option<SnapshotFile>) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            snapshot,
        }
    }

    /// Loads the snapshot at `path` if one exists; every later commit is
    /// written back to it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let snapshot = SnapshotFile::new(path);
        let state = match snapshot.load().await? {
            Some(state) => state,
            None => {
                info!(
                    "No snapshot at {}, starting with empty state",
                    snapshot.path().display()
                );
                ArenaState::default()
            }
        };
        Ok(Self::with_state(state, Some(snapshot)))
    }

    pub async fn read<R>(&self, f: impl FnOnce(&ArenaState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    pub async fn snapshot(&self) -> ArenaState {
        self.state.read().await.clone()
    }

    /// Runs `f` against a copy of the state and commits the copy if `f`
    /// succeeds and the snapshot (when configured) is written.
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut ArenaState) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self.state.write().await;
        let mut draft = guard.clone();
        let value = f(&mut draft)?;

        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.save(&draft).await {
                error!("Transaction aborted, snapshot write failed: {}", e);
                return Err(E::from(e));
            }
        }

        *guard = draft;
        Ok(value)
    }
}

impl Default for ArenaStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
