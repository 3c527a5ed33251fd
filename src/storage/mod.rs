// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod ledger;
pub mod snapshot;
pub mod state;
pub mod store;

pub use ledger::{Amount, Ledger, LedgerError};
pub use snapshot::SnapshotFile;
pub use state::ArenaState;
pub use store::{ArenaStore, StoreError};
