// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ledger::{Amount, Ledger, LedgerError};
use crate::betting::{Bet, BettorStats};
use crate::consensus::Vote;
use crate::ladder::{Entrant, RankEntry, Season};
use crate::nodes::Worker;
use crate::schedule::ScheduledContest;

/// Everything the pipeline persists. Cloned wholesale by store transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArenaState {
    pub seasons: HashMap<String, Season>,
    pub entrants: HashMap<String, Entrant>,
    /// season id -> entity id -> entry
    pub rankings: HashMap<String, HashMap<String, RankEntry>>,
    pub contests: HashMap<String, ScheduledContest>,
    /// contest id -> bets in placement order
    pub bets: HashMap<String, Vec<Bet>>,
    /// contest id -> worker id -> vote
    pub votes: HashMap<String, HashMap<String, Vote>>,
    pub bettor_stats: HashMap<String, BettorStats>,
    pub accounts: HashMap<String, Amount>,
    pub house: Amount,
    /// Compute workers keyed by id, as last checkpointed by the registry.
    #[serde(default)]
    pub workers: HashMap<String, Worker>,
}

impl ArenaState {
    pub fn active_season(&self) -> Option<&Season> {
        let mut active: Vec<&Season> = self.seasons.values().filter(|s| s.active).collect();
        active.sort_by(|a, b| b.starts_at.cmp(&a.starts_at).then_with(|| a.id.cmp(&b.id)));
        active.into_iter().next()
    }

    pub fn ranking(&self, season_id: &str, entity_id: &str) -> Option<&RankEntry> {
        self.rankings.get(season_id).and_then(|m| m.get(entity_id))
    }

    pub fn contest_bets(&self, contest_id: &str) -> &[Bet] {
        self.bets.get(contest_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Records a vote unless the worker already voted on this contest.
    /// Returns whether the vote was stored.
    pub fn record_vote(&mut self, vote: Vote) -> bool {
        let contest_votes = self.votes.entry(vote.contest_id.clone()).or_default();
        if contest_votes.contains_key(&vote.worker_id) {
            return false;
        }
        contest_votes.insert(vote.worker_id.clone(), vote);
        true
    }
}

impl Ledger for ArenaState {
    fn balance(&self, account: &str) -> Amount {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    fn credit(&mut self, account: &str, amount: Amount) -> Result<Amount, LedgerError> {
        let balance = self.accounts.entry(account.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(account.to_string()))?;
        Ok(*balance)
    }

    fn debit(&mut self, account: &str, amount: Amount) -> Result<Amount, LedgerError> {
        let balance = self.balance(account);
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account: account.to_string(),
                balance,
                requested: amount,
            });
        }
        let remaining = balance - amount;
        self.accounts.insert(account.to_string(), remaining);
        Ok(remaining)
    }

    fn house_balance(&self) -> Amount {
        self.house
    }

    fn credit_house(&mut self, amount: Amount) -> Result<Amount, LedgerError> {
        self.house = self
            .house
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow("house".to_string()))?;
        Ok(self.house)
    }
}
