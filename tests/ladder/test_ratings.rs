// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use arena_node::ladder::{
    apply_result, recompute_ranks, Entrant, EntrantProfile, LadderError, LadderService,
    RankEntry, RatingConfig, SeasonConfig,
};
use arena_node::storage::ArenaStore;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;

fn entrant(id: &str, level: u32) -> Entrant {
    Entrant {
        id: id.to_string(),
        name: format!("Fighter {}", id),
        profile: EntrantProfile {
            level,
            ..Default::default()
        },
    }
}

async fn ladder_with(ids: &[(&str, u32)]) -> (LadderService, String) {
    let service = LadderService::new(ArenaStore::in_memory(), RatingConfig::default());
    let now = Utc::now();
    let season = service
        .create_season("Season 1", now - Duration::days(1), now + Duration::days(30))
        .await
        .unwrap();
    for (id, level) in ids {
        service.register_entrant(entrant(id, *level)).await.unwrap();
    }
    service.initialize_season(&season.id).await.unwrap();
    (service, season.id)
}

#[tokio::test]
async fn test_initialize_seeds_points_and_ranks() {
    let (service, season) = ladder_with(&[("low", 0), ("high", 10), ("mid", 5)]).await;

    let board = service.leaderboard(&season, 10).await;
    let order: Vec<&str> = board.iter().map(|e| e.entity_id.as_str()).collect();
    assert_eq!(order, vec!["high", "mid", "low"]);
    assert_eq!(board[0].points, 1300);
    assert_eq!(board[2].points, 1000);
    assert_eq!(
        board.iter().map(|e| e.current_rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    // Second initialize is a no-op.
    assert_eq!(service.initialize_season(&season).await.unwrap(), 0);
    assert_eq!(service.leaderboard(&season, 2).await.len(), 2);
}

#[tokio::test]
async fn test_sync_enrols_late_entrants() {
    let (service, season) = ladder_with(&[("a", 1), ("b", 2)]).await;
    service.register_entrant(entrant("c", 20)).await.unwrap();

    assert_eq!(service.sync_season(&season).await.unwrap(), 1);
    assert_eq!(service.sync_season(&season).await.unwrap(), 0);
    let c = service.ranking(&season, "c").await.unwrap();
    assert_eq!(c.current_rank, 1);
}

#[tokio::test]
async fn test_new_season_deactivates_old() {
    let (service, first) = ladder_with(&[("a", 1)]).await;
    let now = Utc::now();
    let second = service
        .create_season("Season 2", now, now + Duration::days(30))
        .await
        .unwrap();
    let active = service.active_season().await.unwrap();
    assert_eq!(active.id, second.id);
    assert_ne!(active.id, first);

    let err = service
        .create_season("Backwards", now, now - Duration::days(1))
        .await
        .unwrap_err();
    assert!(matches!(err, LadderError::InvalidSeason(_)));
    assert!(matches!(
        service.initialize_season("nope").await.unwrap_err(),
        LadderError::SeasonNotFound(_)
    ));
}

#[tokio::test]
async fn test_set_eligibility() {
    let (service, season) = ladder_with(&[("a", 1)]).await;
    service.set_eligibility(&season, "a", false).await.unwrap();
    assert!(!service.ranking(&season, "a").await.unwrap().eligible);
    assert!(service.set_eligibility(&season, "ghost", false).await.is_err());
}

#[tokio::test]
async fn test_underdog_win_is_zero_sum() {
    // level 0 starts at 1000, level 0 + rarity 2 at 1200
    let (service, season) = ladder_with(&[("a", 0)]).await;
    service
        .register_entrant(Entrant {
            id: "b".to_string(),
            name: "Fighter b".to_string(),
            profile: EntrantProfile {
                rarity: 2,
                ..Default::default()
            },
        })
        .await
        .unwrap();
    service.sync_season(&season).await.unwrap();

    let mut entries: HashMap<String, RankEntry> = service
        .leaderboard(&season, 10)
        .await
        .into_iter()
        .map(|e| (e.entity_id.clone(), e))
        .collect();
    assert_eq!(entries["b"].points, 1200);

    let change = apply_result(&mut entries, &season, "a", "b", 32.0, Utc::now()).unwrap();
    assert_eq!(change.winner_after, 1024);
    assert_eq!(change.loser_after, 1176);
    assert_eq!(entries["a"].wins, 1);
    assert_eq!(entries["b"].losses, 1);
}

#[test]
fn test_ranks_stay_a_permutation_after_every_update() {
    let mut entries = HashMap::new();
    let ids: Vec<String> = (0..12).map(|i| format!("e{:02}", i)).collect();
    for (i, id) in ids.iter().enumerate() {
        entries.insert(
            id.clone(),
            RankEntry {
                season_id: "s".into(),
                entity_id: id.clone(),
                display_name: id.clone(),
                points: 1000 + (i as i64 % 4) * 50,
                wins: 0,
                losses: 0,
                current_rank: 0,
                eligible: true,
                last_contest_at: None,
            },
        );
    }
    recompute_ranks(&mut entries);

    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..200 {
        let pair: Vec<&String> = ids.choose_multiple(&mut rng, 2).collect();
        apply_result(&mut entries, "s", pair[0], pair[1], 32.0, Utc::now()).unwrap();
        recompute_ranks(&mut entries);

        let mut by_rank: Vec<_> = entries.values().collect();
        by_rank.sort_by_key(|e| e.current_rank);
        let ranks: Vec<u32> = by_rank.iter().map(|e| e.current_rank).collect();
        assert_eq!(ranks, (1..=12).collect::<Vec<u32>>());
        for w in by_rank.windows(2) {
            assert!(w[0].points >= w[1].points);
            if w[0].points == w[1].points {
                assert!(w[0].entity_id < w[1].entity_id);
            }
        }
    }
}

#[tokio::test]
async fn test_bootstrap_creates_and_initializes_a_season_once() {
    let service = LadderService::new(ArenaStore::in_memory(), RatingConfig::default());
    service.register_entrant(entrant("a", 1)).await.unwrap();
    service.register_entrant(entrant("b", 4)).await.unwrap();
    let now = Utc::now();
    let config = SeasonConfig {
        season_name: "Opening".to_string(),
        season_length_days: 30,
        ..Default::default()
    };

    let season = service.bootstrap(&config, now).await.unwrap().unwrap();
    assert_eq!(season.name, "Opening");
    assert!(season.active);
    assert_eq!(season.ends_at - season.starts_at, Duration::days(30));
    assert_eq!(service.active_season().await.unwrap().id, season.id);
    assert_eq!(service.leaderboard(&season.id, 10).await.len(), 2);

    // An active season already exists.
    assert!(service.bootstrap(&config, now).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bootstrap_disabled_leaves_ladder_empty() {
    let service = LadderService::new(ArenaStore::in_memory(), RatingConfig::default());
    let config = SeasonConfig {
        bootstrap: false,
        ..Default::default()
    };
    assert!(service.bootstrap(&config, Utc::now()).await.unwrap().is_none());
    assert!(service.active_season().await.is_none());
    assert!(matches!(
        service.sync_active().await,
        Err(LadderError::NoActiveSeason)
    ));
}

#[tokio::test]
async fn test_import_entrants_then_sync_active() {
    let (service, season) = ladder_with(&[("a", 1)]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entrants.json");
    let mut renamed = entrant("a", 1);
    renamed.name = "The Anvil".to_string();
    let roster = vec![renamed, entrant("b", 2), entrant("c", 3)];
    std::fs::write(&path, serde_json::to_vec(&roster).unwrap()).unwrap();

    assert_eq!(service.import_entrants(&path).await.unwrap(), 3);
    assert_eq!(
        service.ranking(&season, "a").await.unwrap().display_name,
        "The Anvil"
    );
    assert_eq!(service.sync_active().await.unwrap(), 2);
    assert!(service.ranking(&season, "c").await.is_some());
    assert_eq!(service.sync_active().await.unwrap(), 0);
}

#[tokio::test]
async fn test_import_entrants_rejects_malformed_file() {
    let service = LadderService::new(ArenaStore::in_memory(), RatingConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entrants.json");
    std::fs::write(&path, b"{ not json").unwrap();

    assert!(matches!(
        service.import_entrants(&path).await,
        Err(LadderError::Store(_))
    ));
    assert!(matches!(
        service.import_entrants(&dir.path().join("missing.json")).await,
        Err(LadderError::Store(_))
    ));
}
