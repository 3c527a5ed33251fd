// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::storage::{ArenaState, ArenaStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub k_factor: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self { k_factor: 32.0 }
    }
}

impl RatingConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Self {
        Self {
            k_factor: env::var("ELO_K_FACTOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.k_factor),
        }
    }
}

/// Start-up ladder bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonConfig {
    /// Create and initialize a season when none is active.
    pub bootstrap: bool,
    pub season_name: String,
    pub season_length_days: i64,
    /// JSON array of entrants registered before the season is initialized.
    pub entrants_path: Option<PathBuf>,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            bootstrap: true,
            season_name: "Season 1".to_string(),
            season_length_days: 90,
            entrants_path: None,
        }
    }
}

impl SeasonConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Self {
        let defaults = self;
        Self {
            bootstrap: env::var("SEASON_BOOTSTRAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bootstrap),
            season_name: env::var("SEASON_NAME").unwrap_or(defaults.season_name),
            season_length_days: env::var("SEASON_LENGTH_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.season_length_days),
            entrants_path: env::var("ENTRANTS_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or(defaults.entrants_path),
        }
    }

    pub fn season_length(&self) -> Duration {
        Duration::days(self.season_length_days.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrantProfile {
    pub level: u32,
    pub strength: u32,
    pub agility: u32,
    pub luck: u32,
    pub rarity: u32,
    pub career_wins: u32,
    pub career_losses: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    pub id: String,
    pub name: String,
    pub profile: EntrantProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: String,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub season_id: String,
    pub entity_id: String,
    pub display_name: String,
    pub points: i64,
    pub wins: u32,
    pub losses: u32,
    /// 1 = best
    pub current_rank: u32,
    pub eligible: bool,
    pub last_contest_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingChange {
    pub winner_before: i64,
    pub winner_after: i64,
    pub loser_before: i64,
    pub loser_after: i64,
}

#[derive(Error, Debug)]
pub enum LadderError {
    #[error("No active season")]
    NoActiveSeason,
    #[error("Season not found: {0}")]
    SeasonNotFound(String),
    #[error("Invalid season: {0}")]
    InvalidSeason(String),
    #[error("No ranking for {entity_id} in season {season_id}")]
    MissingRanking { season_id: String, entity_id: String },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// `1000 + level*30 + (str+agi+luck)*2 + rarity*100 + floor(win_rate*200)`
pub fn initial_points(profile: &EntrantProfile) -> i64 {
    let stats = profile.strength as i64 + profile.agility as i64 + profile.luck as i64;
    let played = profile.career_wins as i64 + profile.career_losses as i64;
    let win_rate_bonus = if played > 0 {
        profile.career_wins as i64 * 200 / played
    } else {
        0
    };
    1000 + profile.level as i64 * 30 + stats * 2 + profile.rarity as i64 * 100 + win_rate_bonus
}

/// Probability the winner was expected to win.
pub fn expected_score(winner_points: i64, loser_points: i64) -> f64 {
    1.0 / (1.0 + 10f64.powf((loser_points - winner_points) as f64 / 400.0))
}

/// Point deltas `(winner, loser)` before flooring.
pub fn elo_deltas(winner_points: i64, loser_points: i64, k_factor: f64) -> (i64, i64) {
    let expected = expected_score(winner_points, loser_points);
    let winner = (k_factor * (1.0 - expected)).round() as i64;
    let loser = (k_factor * (0.0 - (1.0 - expected))).round() as i64;
    (winner, loser)
}

/// Applies one result to a season's entries. Does not recompute ranks.
pub fn apply_result(
    entries: &mut HashMap<String, RankEntry>,
    season_id: &str,
    winner_id: &str,
    loser_id: &str,
    k_factor: f64,
    now: DateTime<Utc>,
) -> Result<RatingChange, LadderError> {
    let missing = |id: &str| LadderError::MissingRanking {
        season_id: season_id.to_string(),
        entity_id: id.to_string(),
    };
    let winner_before = entries.get(winner_id).ok_or_else(|| missing(winner_id))?.points;
    let loser_before = entries.get(loser_id).ok_or_else(|| missing(loser_id))?.points;

    let (gain, loss) = elo_deltas(winner_before, loser_before, k_factor);
    let winner_after = (winner_before + gain).max(0);
    let loser_after = (loser_before + loss).max(0);

    if let Some(winner) = entries.get_mut(winner_id) {
        winner.points = winner_after;
        winner.wins += 1;
        winner.last_contest_at = Some(now);
    }
    if let Some(loser) = entries.get_mut(loser_id) {
        loser.points = loser_after;
        loser.losses += 1;
        loser.last_contest_at = Some(now);
    }

    debug!(
        "[LADDER] {} {} -> {}, {} {} -> {}",
        winner_id, winner_before, winner_after, loser_id, loser_before, loser_after
    );

    Ok(RatingChange {
        winner_before,
        winner_after,
        loser_before,
        loser_after,
    })
}

fn rank_order(a: &RankEntry, b: &RankEntry) -> std::cmp::Ordering {
    b.points.cmp(&a.points).then_with(|| a.entity_id.cmp(&b.entity_id))
}

/// Reassigns `current_rank` 1..n by points descending, entity id ascending.
pub fn recompute_ranks(entries: &mut HashMap<String, RankEntry>) {
    let mut order: Vec<(i64, String)> = entries
        .values()
        .map(|e| (e.points, e.entity_id.clone()))
        .collect();
    order.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    for (i, (_, id)) in order.iter().enumerate() {
        if let Some(entry) = entries.get_mut(id) {
            entry.current_rank = i as u32 + 1;
        }
    }
}

/// Entries in rank order.
pub fn ordered_entries(entries: &HashMap<String, RankEntry>) -> Vec<RankEntry> {
    let mut all: Vec<RankEntry> = entries.values().cloned().collect();
    all.sort_by(rank_order);
    all
}

fn enrol_missing(state: &mut ArenaState, season_id: &str) -> usize {
    let mut entrants: Vec<_> = state.entrants.values().cloned().collect();
    entrants.sort_by(|a, b| a.id.cmp(&b.id));

    let entries = state.rankings.entry(season_id.to_string()).or_default();
    let mut added = 0;
    for entrant in entrants {
        if entries.contains_key(&entrant.id) {
            continue;
        }
        entries.insert(
            entrant.id.clone(),
            RankEntry {
                season_id: season_id.to_string(),
                entity_id: entrant.id.clone(),
                display_name: entrant.name.clone(),
                points: initial_points(&entrant.profile),
                wins: 0,
                losses: 0,
                current_rank: 0,
                eligible: true,
                last_contest_at: None,
            },
        );
        added += 1;
    }
    recompute_ranks(entries);
    added
}

/// Seasons, entrants and ladder maintenance on top of the arena store.
#[derive(Clone)]
pub struct LadderService {
    store: ArenaStore,
    config: RatingConfig,
}

impl LadderService {
    pub fn new(store: ArenaStore, config: RatingConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// Creates a season and makes it the only active one.
    pub async fn create_season(
        &self,
        name: &str,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Season, LadderError> {
        if ends_at <= starts_at {
            return Err(LadderError::InvalidSeason(format!(
                "season '{}' ends before it starts",
                name
            )));
        }
        let season = Season {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            starts_at,
            ends_at,
            active: true,
        };

        let created = season.clone();
        self.store
            .transaction(move |state| {
                for other in state.seasons.values_mut() {
                    other.active = false;
                }
                state.seasons.insert(season.id.clone(), season);
                Ok::<_, LadderError>(())
            })
            .await?;

        info!("[LADDER] created season {} ({})", created.name, created.id);
        Ok(created)
    }

    /// Adds or updates an entrant. Existing ladder entries keep their points.
    pub async fn register_entrant(&self, entrant: Entrant) -> Result<(), LadderError> {
        self.store
            .transaction(move |state| {
                for entries in state.rankings.values_mut() {
                    if let Some(entry) = entries.get_mut(&entrant.id) {
                        entry.display_name = entrant.name.clone();
                    }
                }
                state.entrants.insert(entrant.id.clone(), entrant);
                Ok::<_, LadderError>(())
            })
            .await
    }

    /// Enrols every entrant with initial points. No-op when the season already
    /// has entries.
    pub async fn initialize_season(&self, season_id: &str) -> Result<usize, LadderError> {
        let season_id = season_id.to_string();
        let added = self
            .store
            .transaction(|state| {
                if !state.seasons.contains_key(&season_id) {
                    return Err(LadderError::SeasonNotFound(season_id.clone()));
                }
                if state.rankings.get(&season_id).is_some_and(|e| !e.is_empty()) {
                    return Ok(0);
                }
                Ok(enrol_missing(state, &season_id))
            })
            .await?;

        if added > 0 {
            info!("[LADDER] initialized season {} with {} entrant(s)", season_id, added);
        } else {
            debug!("[LADDER] season {} already initialized", season_id);
        }
        Ok(added)
    }

    /// Enrols entrants registered since the season started and recomputes
    /// ranks.
    pub async fn sync_season(&self, season_id: &str) -> Result<usize, LadderError> {
        let season_id = season_id.to_string();
        let added = self
            .store
            .transaction(|state| {
                if !state.seasons.contains_key(&season_id) {
                    return Err(LadderError::SeasonNotFound(season_id.clone()));
                }
                Ok(enrol_missing(state, &season_id))
            })
            .await?;
        if added > 0 {
            info!("[LADDER] synced season {}: {} new entrant(s)", season_id, added);
        }
        Ok(added)
    }

    /// Registers every entrant in a JSON array file. Returns how many were
    /// read.
    pub async fn import_entrants(&self, path: &Path) -> Result<usize, LadderError> {
        let bytes = tokio::fs::read(path).await.map_err(StoreError::from)?;
        let entrants: Vec<Entrant> = serde_json::from_slice(&bytes).map_err(StoreError::from)?;
        let count = entrants.len();
        self.store
            .transaction(move |state| {
                for entrant in entrants {
                    for entries in state.rankings.values_mut() {
                        if let Some(entry) = entries.get_mut(&entrant.id) {
                            entry.display_name = entrant.name.clone();
                        }
                    }
                    state.entrants.insert(entrant.id.clone(), entrant);
                }
                Ok::<_, LadderError>(())
            })
            .await?;
        info!("[LADDER] imported {} entrant(s) from {}", count, path.display());
        Ok(count)
    }

    /// Creates and initializes a season when none is active and bootstrap is
    /// enabled. Returns the season that was created.
    pub async fn bootstrap(
        &self,
        config: &SeasonConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<Season>, LadderError> {
        if let Some(active) = self.active_season().await {
            debug!("[LADDER] season {} already active", active.id);
            return Ok(None);
        }
        if !config.bootstrap {
            return Ok(None);
        }
        let season = self
            .create_season(&config.season_name, now, now + config.season_length())
            .await?;
        self.initialize_season(&season.id).await?;
        Ok(Some(season))
    }

    /// Syncs the active season, if any. Returns the number of entrants added.
    pub async fn sync_active(&self) -> Result<usize, LadderError> {
        match self.active_season().await {
            Some(season) => self.sync_season(&season.id).await,
            None => Err(LadderError::NoActiveSeason),
        }
    }

    pub async fn leaderboard(&self, season_id: &str, limit: usize) -> Vec<RankEntry> {
        self.store
            .read(|state| {
                state
                    .rankings
                    .get(season_id)
                    .map(|entries| ordered_entries(entries).into_iter().take(limit).collect())
                    .unwrap_or_default()
            })
            .await
    }

    pub async fn set_eligibility(
        &self,
        season_id: &str,
        entity_id: &str,
        eligible: bool,
    ) -> Result<(), LadderError> {
        self.store
            .transaction(|state| {
                let entry = state
                    .rankings
                    .get_mut(season_id)
                    .and_then(|entries| entries.get_mut(entity_id))
                    .ok_or_else(|| LadderError::MissingRanking {
                        season_id: season_id.to_string(),
                        entity_id: entity_id.to_string(),
                    })?;
                entry.eligible = eligible;
                Ok(())
            })
            .await
    }

    pub async fn active_season(&self) -> Option<Season> {
        self.store.read(|state| state.active_season().cloned()).await
    }

    pub async fn ranking(&self, season_id: &str, entity_id: &str) -> Option<RankEntry> {
        self.store
            .read(|state| state.ranking(season_id, entity_id).cloned())
            .await
    }
}
