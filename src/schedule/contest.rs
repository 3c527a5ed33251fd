// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::betting::DEFAULT_ODDS;
use crate::consensus::ResolutionSource;
use crate::outcome::Outcome;
use crate::settlement::SettlementError;
use crate::storage::{Amount, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestStatus {
    Scheduled,
    BettingOpen,
    BettingClosed,
    InProgress,
    Completed,
    Cancelled,
}

impl ContestStatus {
    pub fn can_transition_to(self, next: ContestStatus) -> bool {
        use ContestStatus::*;
        matches!(
            (self, next),
            (Scheduled, BettingOpen)
                | (BettingOpen, BettingClosed)
                | (BettingClosed, InProgress)
                | (InProgress, Completed)
                | (Scheduled, Cancelled)
                | (BettingOpen, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ContestStatus::Completed | ContestStatus::Cancelled)
    }
}

impl fmt::Display for ContestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContestStatus::Scheduled => "scheduled",
            ContestStatus::BettingOpen => "betting_open",
            ContestStatus::BettingClosed => "betting_closed",
            ContestStatus::InProgress => "in_progress",
            ContestStatus::Completed => "completed",
            ContestStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Contest not found: {0}")]
    ContestNotFound(String),
    #[error("Contest {contest_id} cannot move from {from} to {to}")]
    InvalidTransition {
        contest_id: String,
        from: ContestStatus,
        to: ContestStatus,
    },
    #[error("No active season")]
    NoActiveSeason,
    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledContest {
    pub id: String,
    pub season_id: String,
    pub fighter_a: String,
    pub fighter_b: String,
    pub scheduled_time: DateTime<Utc>,
    pub betting_start: DateTime<Utc>,
    pub betting_end: DateTime<Utc>,
    pub status: ContestStatus,
    pub winner: Option<String>,
    pub bets_a: Amount,
    pub bets_b: Amount,
    /// Hundredths, 250 = 2.50x.
    pub odds_a: u32,
    pub odds_b: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
    pub resolution: Option<ResolutionSource>,
    pub resolve_attempts: u32,
    pub last_error: Option<String>,
}

impl ScheduledContest {
    /// Betting opens `betting_lead` before the slot and closes
    /// `betting_close` before it.
    pub fn new(
        season_id: &str,
        fighter_a: &str,
        fighter_b: &str,
        scheduled_time: DateTime<Utc>,
        betting_lead: Duration,
        betting_close: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            season_id: season_id.to_string(),
            fighter_a: fighter_a.to_string(),
            fighter_b: fighter_b.to_string(),
            scheduled_time,
            betting_start: scheduled_time - betting_lead,
            betting_end: scheduled_time - betting_close,
            status: ContestStatus::Scheduled,
            winner: None,
            bets_a: 0,
            bets_b: 0,
            odds_a: DEFAULT_ODDS,
            odds_b: DEFAULT_ODDS,
            created_at: now,
            completed_at: None,
            outcome: None,
            resolution: None,
            resolve_attempts: 0,
            last_error: None,
        }
    }

    pub fn transition(&mut self, next: ContestStatus) -> Result<(), ScheduleError> {
        if !self.status.can_transition_to(next) {
            return Err(ScheduleError::InvalidTransition {
                contest_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn has_fighter(&self, entity_id: &str) -> bool {
        self.fighter_a == entity_id || self.fighter_b == entity_id
    }

    pub fn opponent_of(&self, entity_id: &str) -> Option<&str> {
        if self.fighter_a == entity_id {
            Some(&self.fighter_b)
        } else if self.fighter_b == entity_id {
            Some(&self.fighter_a)
        } else {
            None
        }
    }

    pub fn accepts_bets_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ContestStatus::BettingOpen
            && self.betting_start <= now
            && now <= self.betting_end
    }

    pub fn total_staked(&self) -> Amount {
        self.bets_a + self.bets_b
    }
}

/// `now + interval`, truncated to the minute.
pub fn next_slot(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let slot = now + interval;
    slot.duration_trunc(Duration::minutes(1)).unwrap_or(slot)
}
