// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::ladder::RatingChange;
use crate::schedule::ContestStatus;
use crate::storage::{Amount, LedgerError, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 250,
        }
    }
}

impl SettlementConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overrides the fields whose environment variable is set.
    pub fn with_env(self) -> Self {
        let defaults = self;
        Self {
            max_retries: env::var("SETTLEMENT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_backoff_ms: env::var("SETTLEMENT_RETRY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_backoff_ms),
        }
    }

    /// Backoff before retry number `attempt` (1-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Contest not found: {0}")]
    ContestNotFound(String),

    #[error("Contest {contest_id} cannot be settled in status {status}")]
    InvalidState {
        contest_id: String,
        status: ContestStatus,
    },

    #[error("Contest already settled: {0}")]
    AlreadySettled(String),

    #[error("Winner {winner_id} is not a fighter in contest {contest_id}")]
    WinnerNotInContest {
        contest_id: String,
        winner_id: String,
    },

    #[error("No ranking for {entity_id} in season {season_id}")]
    MissingRanking {
        season_id: String,
        entity_id: String,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Settlement of contest {contest_id} failed after {attempts} attempt(s): {last_error}")]
    PartialFailure {
        contest_id: String,
        attempts: u32,
        last_error: String,
    },
}

impl SettlementError {
    /// Persistence failures are worth another attempt; everything else is a
    /// property of the contest and will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::Store(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub contest_id: String,
    pub winner_id: String,
    pub loser_id: String,
    pub rating_change: RatingChange,
    pub bets_settled: usize,
    pub winning_total: Amount,
    pub losing_total: Amount,
    pub house_cut: Amount,
    pub prize_pool: Amount,
    pub total_paid: Amount,
    /// Credited to the house: the cut, or the whole losing side when nobody
    /// backed the winner.
    pub house_take: Amount,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundReport {
    pub contest_id: String,
    pub bets_refunded: usize,
    pub total_refunded: Amount,
}
