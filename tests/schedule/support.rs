// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use arena_node::consensus::{
    ContestTicket, Resolution, ResolutionError, ResolutionSource, ResolutionStrategy,
};
use arena_node::ladder::{
    LadderService, Matchmaker, MatchmakerConfig, RankEntry, RatingConfig, Season,
};
use arena_node::outcome::{Outcome, Round};
use arena_node::schedule::{ContestScheduler, ScheduleConfig};
use arena_node::settlement::{PoolConfig, SettlementConfig, SettlementEngine};
use arena_node::storage::{ArenaState, ArenaStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SEASON: &str = "s1";

/// 12:00:00, so the next slot is 12:05 with betting open 12:03 to 12:04:30.
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Declares fighter A the winner by knockout, or fails every call.
pub struct StubResolver {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StubResolver {
    pub fn winning() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResolutionStrategy for StubResolver {
    async fn resolve(&self, ticket: &ContestTicket) -> Result<Resolution, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ResolutionError::FallbackFailure(
                "generator unreachable".to_string(),
            ));
        }
        let winner = &ticket.fighter_a;
        let loser = &ticket.fighter_b;
        Ok(Resolution {
            contest_id: ticket.contest_id.clone(),
            outcome: Outcome {
                winner_id: winner.id.clone(),
                rounds: vec![Round {
                    attacker_id: winner.id.clone(),
                    defender_id: loser.id.clone(),
                    action: "uppercut".to_string(),
                    damage: 100,
                    description: String::new(),
                    remaining_hp: 0,
                }],
                summary: format!("{} wins", winner.name),
            },
            source: ResolutionSource::Fallback {
                reason: "test".to_string(),
            },
            votes: vec![],
            issues: vec![],
        })
    }
}

fn entry(id: &str, points: i64, rank: u32) -> RankEntry {
    RankEntry {
        season_id: SEASON.to_string(),
        entity_id: id.to_string(),
        display_name: id.to_uppercase(),
        points,
        wins: 0,
        losses: 0,
        current_rank: rank,
        eligible: true,
        last_contest_at: None,
    }
}

/// Active season with `red` (rank 1) and `blue` (rank 2).
pub fn seeded_state(now: DateTime<Utc>) -> ArenaState {
    let mut state = ArenaState::default();
    state.seasons.insert(
        SEASON.to_string(),
        Season {
            id: SEASON.to_string(),
            name: "Season 1".to_string(),
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(30),
            active: true,
        },
    );
    let mut entries = HashMap::new();
    entries.insert("red".to_string(), entry("red", 1100, 1));
    entries.insert("blue".to_string(), entry("blue", 1000, 2));
    state.rankings.insert(SEASON.to_string(), entries);
    state
}

pub fn scheduler(store: &ArenaStore, resolver: Arc<StubResolver>) -> ContestScheduler {
    let settlement = SettlementEngine::new(
        store.clone(),
        RatingConfig::default(),
        PoolConfig::default(),
        SettlementConfig {
            max_retries: 0,
            retry_backoff_ms: 1,
        },
    );
    ContestScheduler::new(
        store.clone(),
        LadderService::new(store.clone(), RatingConfig::default()),
        Matchmaker::new(MatchmakerConfig::default()),
        resolver,
        settlement,
        ScheduleConfig::default(),
    )
}
