// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use arena_node::betting::Bet;
use arena_node::consensus::{Resolution, ResolutionSource, Vote};
use arena_node::ladder::{RankEntry, Season};
use arena_node::outcome::{Outcome, Round};
use arena_node::schedule::{ContestStatus, ScheduledContest};
use arena_node::storage::ArenaState;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

pub const SEASON: &str = "season-1";

fn rank_entry(id: &str, points: i64, rank: u32) -> RankEntry {
    RankEntry {
        season_id: SEASON.to_string(),
        entity_id: id.to_string(),
        display_name: id.to_string(),
        points,
        wins: 0,
        losses: 0,
        current_rank: rank,
        eligible: true,
        last_contest_at: None,
    }
}

/// `red` (1000) vs `blue` (1200), already in progress, with the given
/// `(bettor, fighter, amount)` stakes recorded as placed.
pub fn contest_in_progress(stakes: &[(&str, &str, u64)], now: DateTime<Utc>) -> (ArenaState, String) {
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
    entries.insert("blue".to_string(), rank_entry("blue", 1200, 1));
    entries.insert("red".to_string(), rank_entry("red", 1000, 2));
    entries.insert("green".to_string(), rank_entry("green", 900, 3));
    state.rankings.insert(SEASON.to_string(), entries);

    let mut contest = ScheduledContest::new(
        SEASON,
        "red",
        "blue",
        now - Duration::minutes(1),
        Duration::minutes(3),
        Duration::seconds(30),
        now - Duration::minutes(5),
    );
    contest.status = ContestStatus::InProgress;

    let mut bets = Vec::new();
    for (i, (bettor, fighter, amount)) in stakes.iter().enumerate() {
        if *fighter == "red" {
            contest.bets_a += amount;
        } else {
            contest.bets_b += amount;
        }
        bets.push(Bet {
            id: format!("bet-{}", i),
            contest_id: contest.id.clone(),
            bettor: bettor.to_string(),
            chosen_fighter: fighter.to_string(),
            amount: *amount,
            odds_at_bet: 200,
            settled: false,
            is_winner: None,
            payout: 0,
            placed_at: now - Duration::minutes(3),
        });
    }

    let id = contest.id.clone();
    state.bets.insert(id.clone(), bets);
    state.contests.insert(id.clone(), contest);
    (state, id)
}

pub fn knockout(winner: &str, loser: &str) -> Outcome {
    Outcome {
        winner_id: winner.to_string(),
        rounds: vec![Round {
            attacker_id: winner.to_string(),
            defender_id: loser.to_string(),
            action: "haymaker".to_string(),
            damage: 100,
            description: String::new(),
            remaining_hp: 0,
        }],
        summary: format!("{} wins", winner),
    }
}

pub fn resolution(contest_id: &str, winner: &str, loser: &str) -> Resolution {
    let outcome = knockout(winner, loser);
    Resolution {
        contest_id: contest_id.to_string(),
        outcome: outcome.clone(),
        source: ResolutionSource::Consensus {
            votes_for: 2,
            valid_votes: 3,
        },
        votes: vec![
            Vote::accepted(contest_id, "w1", outcome.clone(), 40, Utc::now()),
            Vote::accepted(contest_id, "w2", outcome, 55, Utc::now()),
            Vote::rejected(contest_id, "w3", "timeout".to_string(), 30_000, Utc::now()),
        ],
        issues: vec![],
    }
}
