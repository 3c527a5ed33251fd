// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use tracing::debug;

use super::ratings::{ordered_entries, RankEntry};
use crate::storage::ArenaState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakerConfig {
    /// Only entries ranked at or above this take part.
    pub max_rank: u32,
    pub pool_size: usize,
    /// How many lower-ranked candidates each entry looks at.
    pub lookahead: usize,
    pub rematch_cooldown_days: i64,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            max_rank: 50,
            pool_size: 20,
            lookahead: 5,
            rematch_cooldown_days: 7,
        }
    }
}

impl MatchmakerConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overrides the fields whose environment variable is set.
    pub fn with_env(self) -> Self {
        let defaults = self;
        Self {
            max_rank: env::var("MATCHMAKER_MAX_RANK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_rank),
            pool_size: env::var("MATCHMAKER_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pool_size),
            lookahead: env::var("MATCHMAKER_LOOKAHEAD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lookahead),
            rematch_cooldown_days: env::var("MATCHMAKER_REMATCH_COOLDOWN_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rematch_cooldown_days),
        }
    }
}

/// Unordered pair of entity ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey(String, String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            PairKey(a.to_string(), b.to_string())
        } else {
            PairKey(b.to_string(), a.to_string())
        }
    }
}

pub struct Matchmaker {
    config: MatchmakerConfig,
}

impl Matchmaker {
    pub fn new(config: MatchmakerConfig) -> Self {
        Self { config }
    }

    /// Pairs that met in this season since `now - cooldown`.
    pub fn recent_pairs(&self, state: &ArenaState, season_id: &str, now: DateTime<Utc>) -> HashSet<PairKey> {
        let since = now - Duration::days(self.config.rematch_cooldown_days);
        state
            .contests
            .values()
            .filter(|c| c.season_id == season_id && c.created_at >= since)
            .map(|c| PairKey::new(&c.fighter_a, &c.fighter_b))
            .collect()
    }

    /// `entries` must be in rank order.
    pub fn pick_pair<R: Rng + ?Sized>(
        &self,
        entries: &[RankEntry],
        recent: &HashSet<PairKey>,
        rng: &mut R,
    ) -> Option<(RankEntry, RankEntry)> {
        let pool: Vec<&RankEntry> = entries
            .iter()
            .filter(|e| e.eligible && e.current_rank <= self.config.max_rank)
            .take(self.config.pool_size)
            .collect();
        if pool.len() < 2 {
            return None;
        }

        for (i, first) in pool.iter().enumerate() {
            let end = (i + 1 + self.config.lookahead).min(pool.len());
            for second in &pool[i + 1..end] {
                if !recent.contains(&PairKey::new(&first.entity_id, &second.entity_id)) {
                    return Some(((*first).clone(), (*second).clone()));
                }
            }
        }

        debug!("[MATCHMAKER] every nearby pair met recently, picking at random");
        let mut picked = pool.choose_multiple(rng, 2);
        match (picked.next(), picked.next()) {
            (Some(a), Some(b)) => Some(((*a).clone(), (*b).clone())),
            _ => None,
        }
    }

    pub fn select_fighters<R: Rng + ?Sized>(
        &self,
        state: &ArenaState,
        season_id: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Option<(RankEntry, RankEntry)> {
        let entries = ordered_entries(state.rankings.get(season_id)?);
        let recent = self.recent_pairs(state, season_id, now);
        self.pick_pair(&entries, &recent, rng)
    }
}
