// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use arena_node::ladder::{Matchmaker, MatchmakerConfig, PairKey, RankEntry};
use arena_node::schedule::ScheduledContest;
use arena_node::storage::ArenaState;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};

fn entry(id: &str, rank: u32, eligible: bool) -> RankEntry {
    RankEntry {
        season_id: "s1".to_string(),
        entity_id: id.to_string(),
        display_name: id.to_string(),
        points: 2000 - rank as i64 * 10,
        wins: 0,
        losses: 0,
        current_rank: rank,
        eligible,
        last_contest_at: None,
    }
}

fn ladder(ids: &[&str]) -> Vec<RankEntry> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| entry(id, i as u32 + 1, true))
        .collect()
}

#[test]
fn test_adjacent_ranks_are_paired_first() {
    let mm = Matchmaker::new(MatchmakerConfig::default());
    let mut rng = StdRng::seed_from_u64(1);
    let (a, b) = mm
        .pick_pair(&ladder(&["r1", "r2", "r3"]), &HashSet::new(), &mut rng)
        .unwrap();
    assert_eq!((a.entity_id.as_str(), b.entity_id.as_str()), ("r1", "r2"));
}

#[test]
fn test_recent_pair_is_skipped() {
    let mm = Matchmaker::new(MatchmakerConfig::default());
    let mut recent = HashSet::new();
    recent.insert(PairKey::new("r2", "r1"));
    let mut rng = StdRng::seed_from_u64(1);
    let (a, b) = mm
        .pick_pair(&ladder(&["r1", "r2", "r3"]), &recent, &mut rng)
        .unwrap();
    assert_eq!((a.entity_id.as_str(), b.entity_id.as_str()), ("r1", "r3"));
}

#[test]
fn test_every_pair_recent_still_matches() {
    let mm = Matchmaker::new(MatchmakerConfig::default());
    let mut recent = HashSet::new();
    recent.insert(PairKey::new("r1", "r2"));
    let mut rng = StdRng::seed_from_u64(7);
    let (a, b) = mm
        .pick_pair(&ladder(&["r1", "r2"]), &recent, &mut rng)
        .unwrap();
    assert_ne!(a.entity_id, b.entity_id);
}

#[test]
fn test_ineligible_and_low_ranked_are_excluded() {
    let mm = Matchmaker::new(MatchmakerConfig {
        max_rank: 3,
        ..MatchmakerConfig::default()
    });
    let entries = vec![
        entry("r1", 1, false),
        entry("r2", 2, true),
        entry("r3", 3, true),
        entry("r4", 4, true),
    ];
    let mut rng = StdRng::seed_from_u64(1);
    let (a, b) = mm.pick_pair(&entries, &HashSet::new(), &mut rng).unwrap();
    assert_eq!((a.entity_id.as_str(), b.entity_id.as_str()), ("r2", "r3"));

    let lonely = vec![entry("r1", 1, true), entry("r2", 2, false)];
    assert!(mm.pick_pair(&lonely, &HashSet::new(), &mut rng).is_none());
}

#[test]
fn test_cooldown_window_from_contest_history() {
    let mm = Matchmaker::new(MatchmakerConfig::default());
    let now = Utc::now();
    let mut state = ArenaState::default();
    let mut season: HashMap<String, RankEntry> = HashMap::new();
    for e in ladder(&["r1", "r2", "r3"]) {
        season.insert(e.entity_id.clone(), e);
    }
    state.rankings.insert("s1".to_string(), season);

    let recent = ScheduledContest::new(
        "s1",
        "r1",
        "r2",
        now,
        Duration::minutes(2),
        Duration::seconds(30),
        now - Duration::days(2),
    );
    let old = ScheduledContest::new(
        "s1",
        "r1",
        "r3",
        now,
        Duration::minutes(2),
        Duration::seconds(30),
        now - Duration::days(30),
    );
    state.contests.insert(recent.id.clone(), recent);
    state.contests.insert(old.id.clone(), old);

    let pairs = mm.recent_pairs(&state, "s1", now);
    assert!(pairs.contains(&PairKey::new("r1", "r2")));
    assert!(!pairs.contains(&PairKey::new("r1", "r3")));

    let mut rng = StdRng::seed_from_u64(1);
    let (a, b) = mm.select_fighters(&state, "s1", now, &mut rng).unwrap();
    assert_eq!((a.entity_id.as_str(), b.entity_id.as_str()), ("r1", "r3"));
    assert!(mm.select_fighters(&state, "missing", now, &mut rng).is_none());
}
