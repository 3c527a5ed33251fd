// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

use crate::schedule::ContestStatus;
use crate::storage::{Amount, LedgerError, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BettingConfig {
    pub min_bet: Amount,
}

impl Default for BettingConfig {
    fn default() -> Self {
        Self { min_bet: 10 }
    }
}

impl BettingConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overrides the fields whose environment variable is set.
    pub fn with_env(self) -> Self {
        let defaults = self;
        Self {
            min_bet: env::var("MIN_BET_AMOUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_bet),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub contest_id: String,
    pub bettor: String,
    pub chosen_fighter: String,
    pub amount: Amount,
    /// Odds in hundredths when the bet was placed.
    pub odds_at_bet: u32,
    pub settled: bool,
    pub is_winner: Option<bool>,
    pub payout: Amount,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BettorStats {
    pub total_bets: u32,
    pub total_staked: Amount,
    pub total_winnings: Amount,
    pub wins: u32,
    pub current_streak: u32,
    pub best_streak: u32,
}

impl BettorStats {
    pub fn record(&mut self, amount: Amount, payout: Option<Amount>) {
        self.total_bets += 1;
        self.total_staked += amount;
        match payout {
            Some(payout) => {
                self.wins += 1;
                self.total_winnings += payout;
                self.current_streak += 1;
                self.best_streak = self.best_streak.max(self.current_streak);
            }
            None => self.current_streak = 0,
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_bets == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_bets as f64
        }
    }
}

#[derive(Error, Debug)]
pub enum BetError {
    #[error("Contest not found: {0}")]
    ContestNotFound(String),
    #[error("Contest {contest_id} is not accepting bets (status {status})")]
    BettingClosed {
        contest_id: String,
        status: ContestStatus,
    },
    #[error("Fighter {0} is not in this contest")]
    FighterNotInContest(String),
    #[error("Bet of {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Amount, minimum: Amount },
    #[error("{bettor} already has a bet on contest {contest_id}")]
    DuplicateBet { contest_id: String, bettor: String },
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(#[from] LedgerError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
