// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use arena_node::betting::{BettingConfig, BettingDesk};
use arena_node::consensus::Vote;
use arena_node::ladder::{Entrant, EntrantProfile, LadderService, RatingConfig};
use arena_node::outcome::Outcome;
use arena_node::schedule::{ContestStatus, ScheduleError, ScheduledContest};
use arena_node::settlement::PoolConfig;
use arena_node::storage::{ArenaState, ArenaStore};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use super::support::{noon, scheduler, seeded_state, StubResolver, SEASON};

fn store_at_noon() -> ArenaStore {
    ArenaStore::with_state(seeded_state(noon()), None)
}

#[tokio::test]
async fn test_schedule_next_is_idempotent_per_slot() {
    let store = store_at_noon();
    let scheduler = scheduler(&store, StubResolver::winning());

    let first = scheduler.schedule_next(noon()).await.unwrap().unwrap();
    let again = scheduler
        .schedule_next(noon() + Duration::seconds(20))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(first.scheduled_time, Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap());
    assert_eq!(first.betting_start, Utc.with_ymd_and_hms(2025, 3, 1, 12, 3, 0).unwrap());
    assert_eq!(first.betting_end, Utc.with_ymd_and_hms(2025, 3, 1, 12, 4, 30).unwrap());
    assert_eq!(first.status, ContestStatus::Scheduled);
    assert!(first.has_fighter("red") && first.has_fighter("blue"));
    assert_eq!(store.read(|s| s.contests.len()).await, 1);
}

#[tokio::test]
async fn test_schedule_needs_active_season() {
    let store = ArenaStore::in_memory();
    let scheduler = scheduler(&store, StubResolver::winning());
    let err = scheduler.schedule_next(noon()).await.unwrap_err();
    assert!(matches!(err, ScheduleError::NoActiveSeason));
}

#[tokio::test]
async fn test_full_lifecycle() {
    let store = store_at_noon();
    let resolver = StubResolver::winning();
    let scheduler = scheduler(&store, resolver.clone());
    let contest = scheduler.schedule_next(noon()).await.unwrap().unwrap();
    let at = |h: u32, m: u32, s: u32| Utc.with_ymd_and_hms(2025, 3, 1, h, m, s).unwrap();

    assert!(scheduler.open_betting(at(12, 2, 59)).await.unwrap().is_empty());
    assert_eq!(scheduler.open_betting(at(12, 3, 0)).await.unwrap(), vec![contest.id.clone()]);
    assert!(scheduler.open_betting(at(12, 3, 1)).await.unwrap().is_empty());

    assert!(scheduler.close_betting(at(12, 4, 29)).await.unwrap().is_empty());
    assert_eq!(scheduler.close_betting(at(12, 4, 30)).await.unwrap(), vec![contest.id.clone()]);

    assert!(scheduler.start_contests(at(12, 4, 59)).await.unwrap().is_empty());
    assert_eq!(scheduler.start_contests(at(12, 5, 0)).await.unwrap(), vec![contest.id.clone()]);

    let sweep = scheduler.resolve_in_progress(at(12, 5, 10)).await;
    assert_eq!(sweep.settled.len(), 1);
    assert!(sweep.failed.is_empty());
    assert_eq!(sweep.settled[0].winner_id, contest.fighter_a);

    let settled = scheduler.get(&contest.id).await.unwrap();
    assert_eq!(settled.status, ContestStatus::Completed);
    assert_eq!(settled.winner.as_deref(), Some(contest.fighter_a.as_str()));

    let again = scheduler.resolve_in_progress(at(12, 5, 30)).await;
    assert!(again.settled.is_empty() && again.failed.is_empty());
    assert_eq!(resolver.calls(), 1);
}

#[tokio::test]
async fn test_resolution_failure_keeps_contest_in_progress() {
    let store = store_at_noon();
    let scheduler = scheduler(&store, StubResolver::failing());
    let contest = scheduler.schedule_next(noon()).await.unwrap().unwrap();
    let start = contest.scheduled_time;
    scheduler.open_betting(start).await.unwrap();
    scheduler.close_betting(start).await.unwrap();
    scheduler.start_contests(start).await.unwrap();

    let sweep = scheduler.resolve_in_progress(start).await;
    assert_eq!(sweep.failed.len(), 1);
    assert!(sweep.failed[0].1.contains("generator unreachable"));

    let stuck = scheduler.get(&contest.id).await.unwrap();
    assert_eq!(stuck.status, ContestStatus::InProgress);
    assert_eq!(stuck.resolve_attempts, 1);
    assert!(stuck.last_error.is_some());

    scheduler.resolve_in_progress(start).await;
    assert_eq!(scheduler.get(&contest.id).await.unwrap().resolve_attempts, 2);
}

#[tokio::test]
async fn test_cancel_refunds_open_bets() {
    let store = store_at_noon();
    let scheduler = scheduler(&store, StubResolver::winning());
    let desk = BettingDesk::new(store.clone(), BettingConfig::default(), PoolConfig::default());
    desk.deposit("alice", 300).await.unwrap();
    desk.deposit("bob", 300).await.unwrap();

    let contest = scheduler.schedule_next(noon()).await.unwrap().unwrap();
    let betting = contest.betting_start + Duration::seconds(30);
    scheduler.open_betting(betting).await.unwrap();
    desk.place_bet(&contest.id, "alice", "red", 120, betting).await.unwrap();
    desk.place_bet(&contest.id, "bob", "blue", 80, betting).await.unwrap();
    assert_eq!(desk.balance("alice").await, 180);

    let report = assert_ok!(scheduler.cancel(&contest.id, betting).await);
    assert_eq!(report.bets_refunded, 2);
    assert_eq!(report.total_refunded, 200);
    assert_eq!(desk.balance("alice").await, 300);
    assert_eq!(desk.balance("bob").await, 300);
    assert_eq!(desk.house_balance().await, 0);

    let cancelled = scheduler.get(&contest.id).await.unwrap();
    assert_eq!(cancelled.status, ContestStatus::Cancelled);
    assert!(desk.bets_for_contest(&contest.id).await.iter().all(|b| b.settled));

    let err = assert_err!(scheduler.cancel(&contest.id, betting).await);
    assert!(matches!(err, ScheduleError::InvalidTransition { .. }));
    assert_eq!(desk.balance("alice").await, 300);
}

#[tokio::test]
async fn test_cancel_rejected_once_betting_closed() {
    let store = store_at_noon();
    let scheduler = scheduler(&store, StubResolver::winning());
    let contest = scheduler.schedule_next(noon()).await.unwrap().unwrap();
    scheduler.open_betting(contest.betting_end).await.unwrap();
    scheduler.close_betting(contest.betting_end).await.unwrap();

    let err = scheduler.cancel(&contest.id, contest.betting_end).await.unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::InvalidTransition {
            from: ContestStatus::BettingClosed,
            to: ContestStatus::Cancelled,
            ..
        }
    ));
    assert!(matches!(
        scheduler.cancel("missing", noon()).await.unwrap_err(),
        ScheduleError::ContestNotFound(_)
    ));
}

fn completed(state: &mut ArenaState, created_days_ago: i64) -> String {
    let created = noon() - Duration::days(created_days_ago);
    let mut contest = ScheduledContest::new(
        SEASON,
        "red",
        "blue",
        created + Duration::minutes(5),
        Duration::minutes(2),
        Duration::seconds(30),
        created,
    );
    contest.status = ContestStatus::Completed;
    contest.winner = Some("red".to_string());
    let id = contest.id.clone();
    state.record_vote(Vote::accepted(
        &id,
        "w1",
        Outcome {
            winner_id: "red".to_string(),
            rounds: vec![],
            summary: String::new(),
        },
        10,
        created,
    ));
    state.contests.insert(id.clone(), contest);
    id
}

#[tokio::test]
async fn test_purge_removes_only_old_completed_contests() {
    let mut state = seeded_state(noon());
    let old = completed(&mut state, 10);
    let recent = completed(&mut state, 1);
    let store = ArenaStore::with_state(state, None);
    let scheduler = scheduler(&store, StubResolver::winning());

    let purged = scheduler.purge_completed(noon() - Duration::days(7)).await.unwrap();
    assert_eq!(purged, 1);

    let state = store.snapshot().await;
    assert!(!state.contests.contains_key(&old));
    assert!(!state.votes.contains_key(&old));
    assert!(state.contests.contains_key(&recent));
    assert!(state.votes.contains_key(&recent));

    assert_eq!(scheduler.purge_completed(noon() - Duration::days(7)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_upcoming_and_current_betting() {
    let store = store_at_noon();
    let scheduler = scheduler(&store, StubResolver::winning());
    let first = scheduler.schedule_next(noon()).await.unwrap().unwrap();
    let second = scheduler
        .schedule_next(noon() + Duration::minutes(5))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(first.id, second.id);

    let upcoming = scheduler.upcoming(noon(), 10).await;
    let ids: Vec<&str> = upcoming.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    assert_eq!(scheduler.upcoming(noon(), 1).await.len(), 1);
    assert_eq!(scheduler.next_contest(noon()).await.unwrap().id, first.id);

    assert!(scheduler.current_betting(noon()).await.is_none());
    let betting = first.betting_start + Duration::seconds(10);
    scheduler.open_betting(betting).await.unwrap();
    assert_eq!(scheduler.current_betting(betting).await.unwrap().id, first.id);
}

#[tokio::test]
async fn test_tick_walks_a_contest_to_settlement() {
    let store = store_at_noon();
    let resolver = StubResolver::winning();
    let scheduler = Arc::new(scheduler(&store, resolver.clone()));

    let report = scheduler.tick(noon()).await;
    let id = report.scheduled.unwrap();
    let contest = scheduler.get(&id).await.unwrap();

    scheduler.tick(contest.betting_start).await;
    scheduler.tick(contest.betting_end).await;
    let report = scheduler.tick(contest.scheduled_time).await;

    assert_eq!(report.started, vec![id.clone()]);
    assert_eq!(report.resolve.settled.len(), 1);
    assert_eq!(scheduler.get(&id).await.unwrap().status, ContestStatus::Completed);
    assert_eq!(resolver.calls(), 1);

    let state = store.snapshot().await;
    let winner = state.ranking(SEASON, &contest.fighter_a).unwrap();
    assert_eq!(winner.wins, 1);
}

#[tokio::test]
async fn test_frequent_ticks_schedule_one_contest_per_interval() {
    let store = store_at_noon();
    let scheduler = scheduler(&store, StubResolver::winning());

    // 15s sweeps for five minutes against a 300s contest interval.
    for step in 0..20 {
        scheduler.tick(noon() + Duration::seconds(15 * step)).await;
    }
    let slots: Vec<_> = store
        .read(|s| s.contests.values().map(|c| c.scheduled_time).collect())
        .await;
    assert_eq!(slots, vec![Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap()]);

    // Once that contest starts, the next interval gets its own contest.
    scheduler.tick(Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap()).await;
    let mut slots: Vec<_> = store
        .read(|s| s.contests.values().map(|c| c.scheduled_time).collect())
        .await;
    slots.sort();
    assert_eq!(
        slots,
        vec![
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 10, 0).unwrap(),
        ]
    );
}

#[tokio::test]
async fn test_cancelled_contest_frees_its_interval() {
    let store = store_at_noon();
    let scheduler = scheduler(&store, StubResolver::winning());
    let first = scheduler.schedule_next(noon()).await.unwrap().unwrap();
    scheduler.cancel(&first.id, noon()).await.unwrap();

    let replacement = scheduler.schedule_next(noon()).await.unwrap().unwrap();
    assert_ne!(replacement.id, first.id);
    assert_eq!(replacement.scheduled_time, first.scheduled_time);
}

#[tokio::test]
async fn test_tick_enrols_new_entrants() {
    let store = store_at_noon();
    let scheduler = scheduler(&store, StubResolver::winning());
    LadderService::new(store.clone(), RatingConfig::default())
        .register_entrant(Entrant {
            id: "green".to_string(),
            name: "Green".to_string(),
            profile: EntrantProfile::default(),
        })
        .await
        .unwrap();

    let report = scheduler.tick(noon()).await;
    assert_eq!(report.synced, 1);
    assert!(store.read(|s| s.ranking(SEASON, "green").is_some()).await);

    assert_eq!(scheduler.tick(noon() + Duration::seconds(15)).await.synced, 0);
}
