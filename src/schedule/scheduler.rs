// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Contest scheduler
//!
//! Periodic sweeps move contests through their lifecycle. Every sweep is
//! idempotent and can overlap with another run of itself; resolution keeps an
//! in-flight set so a contest is never resolved twice concurrently.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::env;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::contest::{next_slot, ContestStatus, ScheduleError, ScheduledContest};
use crate::consensus::{ContestTicket, ResolutionStrategy};
use crate::ladder::{LadderError, LadderService, Matchmaker};
use crate::outcome::Combatant;
use crate::settlement::{refund_in, RefundReport, SettlementEngine, SettlementError, SettlementReport};
use crate::storage::{ArenaState, ArenaStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub contest_interval_secs: i64,
    pub betting_lead_secs: i64,
    pub betting_close_secs: i64,
    pub retention_days: i64,
    pub sweep_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            contest_interval_secs: 300,
            betting_lead_secs: 120,
            betting_close_secs: 30,
            retention_days: 7,
            sweep_interval_secs: 15,
        }
    }
}

impl ScheduleConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overrides the fields whose environment variable is set.
    pub fn with_env(self) -> Self {
        let defaults = self;
        Self {
            contest_interval_secs: env::var("CONTEST_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.contest_interval_secs),
            betting_lead_secs: env::var("BETTING_LEAD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.betting_lead_secs),
            betting_close_secs: env::var("BETTING_CLOSE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.betting_close_secs),
            retention_days: env::var("CONTEST_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retention_days),
            sweep_interval_secs: env::var("SCHEDULER_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
        }
    }

    pub fn contest_interval(&self) -> Duration {
        Duration::seconds(self.contest_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::days(self.retention_days)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveSweep {
    pub settled: Vec<SettlementReport>,
    /// `(contest_id, error)` for contests left in progress.
    pub failed: Vec<(String, String)>,
    pub skipped_in_flight: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Entrants enrolled into the active season by this tick.
    pub synced: usize,
    pub scheduled: Option<String>,
    pub opened: Vec<String>,
    pub closed: Vec<String>,
    pub started: Vec<String>,
    pub resolve: ResolveSweep,
    pub purged: usize,
}

/// Removes its contest from the in-flight set when dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    contest_id: String,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, contest_id: &str) -> Option<Self> {
        let mut in_flight = set.lock().unwrap_or_else(|p| p.into_inner());
        if !in_flight.insert(contest_id.to_string()) {
            return None;
        }
        Some(Self {
            set: set.clone(),
            contest_id: contest_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.set.lock().unwrap_or_else(|p| p.into_inner());
        in_flight.remove(&self.contest_id);
    }
}

pub struct ContestScheduler {
    store: ArenaStore,
    ladder: LadderService,
    matchmaker: Matchmaker,
    resolver: Arc<dyn ResolutionStrategy>,
    settlement: SettlementEngine,
    config: ScheduleConfig,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ContestScheduler {
    pub fn new(
        store: ArenaStore,
        ladder: LadderService,
        matchmaker: Matchmaker,
        resolver: Arc<dyn ResolutionStrategy>,
        settlement: SettlementEngine,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            store,
            ladder,
            matchmaker,
            resolver,
            settlement,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns the live contest due within the next `contest_interval`,
    /// creating one in the next slot when there is none. `None` when no pair
    /// could be matched.
    pub async fn schedule_next(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledContest>, ScheduleError> {
        let horizon = now + self.config.contest_interval();
        let slot = next_slot(now, self.config.contest_interval());
        let lead = Duration::seconds(self.config.betting_lead_secs);
        let close = Duration::seconds(self.config.betting_close_secs);

        let (contest, created) = self
            .store
            .transaction::<_, ScheduleError, _>(|state| {
                let season_id = state
                    .active_season()
                    .map(|s| s.id.clone())
                    .ok_or(ScheduleError::NoActiveSeason)?;

                let pending = state
                    .contests
                    .values()
                    .filter(|c| {
                        c.season_id == season_id
                            && !c.status.is_terminal()
                            && c.scheduled_time > now
                            && c.scheduled_time <= horizon
                    })
                    .min_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then_with(|| a.id.cmp(&b.id)));
                if let Some(existing) = pending {
                    return Ok((Some(existing.clone()), false));
                }

                let mut rng = StdRng::from_entropy();
                let Some((a, b)) = self.matchmaker.select_fighters(state, &season_id, now, &mut rng)
                else {
                    return Ok((None, false));
                };

                let contest = ScheduledContest::new(
                    &season_id,
                    &a.entity_id,
                    &b.entity_id,
                    slot,
                    lead,
                    close,
                    now,
                );
                state.contests.insert(contest.id.clone(), contest.clone());
                Ok((Some(contest), true))
            })
            .await?;

        match (&contest, created) {
            (Some(c), true) => info!(
                "[SCHEDULER] scheduled contest {}: {} vs {} at {}",
                c.id, c.fighter_a, c.fighter_b, c.scheduled_time
            ),
            (None, _) => warn!("[SCHEDULER] no eligible pair for slot {}", slot),
            _ => {}
        }
        Ok(contest)
    }

    async fn advance(
        &self,
        from: ContestStatus,
        to: ContestStatus,
        due: impl Fn(&ScheduledContest) -> bool,
    ) -> Result<Vec<String>, ScheduleError> {
        let moved = self
            .store
            .transaction(|state| {
                let mut ids: Vec<String> = state
                    .contests
                    .values()
                    .filter(|c| c.status == from && due(c))
                    .map(|c| c.id.clone())
                    .collect();
                ids.sort();
                for id in &ids {
                    if let Some(contest) = state.contests.get_mut(id) {
                        contest.transition(to)?;
                    }
                }
                Ok::<_, ScheduleError>(ids)
            })
            .await?;

        for id in &moved {
            info!("[SCHEDULER] contest {} {} -> {}", id, from, to);
        }
        Ok(moved)
    }

    pub async fn open_betting(&self, now: DateTime<Utc>) -> Result<Vec<String>, ScheduleError> {
        self.advance(ContestStatus::Scheduled, ContestStatus::BettingOpen, |c| {
            c.betting_start <= now
        })
        .await
    }

    pub async fn close_betting(&self, now: DateTime<Utc>) -> Result<Vec<String>, ScheduleError> {
        self.advance(ContestStatus::BettingOpen, ContestStatus::BettingClosed, |c| {
            c.betting_end <= now
        })
        .await
    }

    pub async fn start_contests(&self, now: DateTime<Utc>) -> Result<Vec<String>, ScheduleError> {
        self.advance(ContestStatus::BettingClosed, ContestStatus::InProgress, |c| {
            c.scheduled_time <= now
        })
        .await
    }

    fn ticket_for(state: &ArenaState, contest: &ScheduledContest, seed: u64) -> ContestTicket {
        let describe = |id: &str| match state.entrants.get(id) {
            Some(entrant) => (
                Combatant::new(&entrant.id, &entrant.name),
                json!({
                    "id": entrant.id,
                    "name": entrant.name,
                    "level": entrant.profile.level,
                    "strength": entrant.profile.strength,
                    "agility": entrant.profile.agility,
                    "luck": entrant.profile.luck,
                    "rarity": entrant.profile.rarity,
                }),
            ),
            None => {
                let name = state
                    .ranking(&contest.season_id, id)
                    .map(|r| r.display_name.clone())
                    .unwrap_or_else(|| id.to_string());
                (Combatant::new(id, &name), json!({ "id": id, "name": name }))
            }
        };

        let (fighter_a, payload_a) = describe(&contest.fighter_a);
        let (fighter_b, payload_b) = describe(&contest.fighter_b);

        ContestTicket {
            contest_id: contest.id.clone(),
            fighter_a,
            fighter_b,
            payload: json!({ "fighterA": payload_a, "fighterB": payload_b }),
            seed,
        }
    }

    async fn record_failure(&self, contest_id: &str, reason: &str) {
        let result = self
            .store
            .transaction(|state| {
                if let Some(contest) = state.contests.get_mut(contest_id) {
                    contest.resolve_attempts += 1;
                    contest.last_error = Some(reason.to_string());
                }
                Ok::<_, ScheduleError>(())
            })
            .await;
        if let Err(e) = result {
            error!("[SCHEDULER] could not record failure for {}: {}", contest_id, e);
        }
    }

    /// Resolves and settles every in-progress contest not already being
    /// handled. Failures leave the contest in progress for the next sweep.
    pub async fn resolve_in_progress(&self, now: DateTime<Utc>) -> ResolveSweep {
        let mut sweep = ResolveSweep::default();

        let tickets: Vec<ContestTicket> = self
            .store
            .read(|state| {
                let mut due: Vec<&ScheduledContest> = state
                    .contests
                    .values()
                    .filter(|c| c.status == ContestStatus::InProgress)
                    .collect();
                due.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then_with(|| a.id.cmp(&b.id)));
                due.into_iter()
                    .map(|c| Self::ticket_for(state, c, rand::random()))
                    .collect()
            })
            .await;

        for ticket in tickets {
            let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &ticket.contest_id) else {
                debug!("[SCHEDULER] contest {} already in flight", ticket.contest_id);
                sweep.skipped_in_flight += 1;
                continue;
            };

            let resolution = match self.resolver.resolve(&ticket).await {
                Ok(resolution) => resolution,
                Err(e) => {
                    error!(
                        "[SCHEDULER] contest {} could not be resolved, will retry: {}",
                        ticket.contest_id, e
                    );
                    self.record_failure(&ticket.contest_id, &e.to_string()).await;
                    sweep.failed.push((ticket.contest_id.clone(), e.to_string()));
                    continue;
                }
            };

            match self.settlement.settle(&resolution, now).await {
                Ok(report) => sweep.settled.push(report),
                Err(SettlementError::AlreadySettled(id)) => {
                    debug!("[SCHEDULER] contest {} was settled elsewhere", id);
                }
                Err(e) => {
                    error!(
                        "[SCHEDULER] settlement of contest {} failed: {}",
                        ticket.contest_id, e
                    );
                    self.record_failure(&ticket.contest_id, &e.to_string()).await;
                    sweep.failed.push((ticket.contest_id.clone(), e.to_string()));
                }
            }
        }

        sweep
    }

    /// Drops completed contests created before `before`, with their votes.
    pub async fn purge_completed(&self, before: DateTime<Utc>) -> Result<usize, ScheduleError> {
        let purged = self
            .store
            .transaction(|state| {
                let stale: Vec<String> = state
                    .contests
                    .values()
                    .filter(|c| c.status == ContestStatus::Completed && c.created_at < before)
                    .map(|c| c.id.clone())
                    .collect();
                for id in &stale {
                    state.contests.remove(id);
                    state.votes.remove(id);
                }
                Ok::<_, ScheduleError>(stale.len())
            })
            .await?;
        if purged > 0 {
            info!("[SCHEDULER] purged {} completed contest(s)", purged);
        }
        Ok(purged)
    }

    /// Operator action. Only contests that have not closed betting can be
    /// cancelled; every unsettled bet is refunded in the same transaction.
    pub async fn cancel(
        &self,
        contest_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundReport, ScheduleError> {
        let report = self
            .store
            .transaction(|state| {
                let contest = state
                    .contests
                    .get_mut(contest_id)
                    .ok_or_else(|| ScheduleError::ContestNotFound(contest_id.to_string()))?;
                contest.transition(ContestStatus::Cancelled)?;
                contest.completed_at = Some(now);
                Ok::<_, ScheduleError>(refund_in(state, contest_id)?)
            })
            .await?;
        info!(
            "[SCHEDULER] cancelled contest {} ({} bet(s) refunded)",
            contest_id, report.bets_refunded
        );
        Ok(report)
    }

    pub async fn get(&self, contest_id: &str) -> Option<ScheduledContest> {
        self.store
            .read(|state| state.contests.get(contest_id).cloned())
            .await
    }

    /// Future contests that have not started, soonest first.
    pub async fn upcoming(&self, now: DateTime<Utc>, limit: usize) -> Vec<ScheduledContest> {
        self.store
            .read(|state| {
                let mut upcoming: Vec<ScheduledContest> = state
                    .contests
                    .values()
                    .filter(|c| {
                        c.scheduled_time > now
                            && matches!(
                                c.status,
                                ContestStatus::Scheduled
                                    | ContestStatus::BettingOpen
                                    | ContestStatus::BettingClosed
                            )
                    })
                    .cloned()
                    .collect();
                upcoming.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
                upcoming.truncate(limit);
                upcoming
            })
            .await
    }

    pub async fn current_betting(&self, now: DateTime<Utc>) -> Option<ScheduledContest> {
        self.store
            .read(|state| {
                state
                    .contests
                    .values()
                    .filter(|c| {
                        c.status == ContestStatus::BettingOpen
                            && c.betting_start <= now
                            && now < c.betting_end
                    })
                    .min_by_key(|c| c.scheduled_time)
                    .cloned()
            })
            .await
    }

    pub async fn next_contest(&self, now: DateTime<Utc>) -> Option<ScheduledContest> {
        self.upcoming(now, 1).await.into_iter().next()
    }

    /// One pass of every sweep in lifecycle order.
    pub async fn tick(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        match self.ladder.sync_active().await {
            Ok(added) => report.synced = added,
            Err(LadderError::NoActiveSeason) => debug!("[SCHEDULER] no active season to sync"),
            Err(e) => error!("[SCHEDULER] ladder sync failed: {}", e),
        }
        match self.schedule_next(now).await {
            Ok(contest) => report.scheduled = contest.map(|c| c.id),
            Err(ScheduleError::NoActiveSeason) => debug!("[SCHEDULER] no active season"),
            Err(e) => error!("[SCHEDULER] scheduling failed: {}", e),
        }
        match self.open_betting(now).await {
            Ok(ids) => report.opened = ids,
            Err(e) => error!("[SCHEDULER] opening betting failed: {}", e),
        }
        match self.close_betting(now).await {
            Ok(ids) => report.closed = ids,
            Err(e) => error!("[SCHEDULER] closing betting failed: {}", e),
        }
        match self.start_contests(now).await {
            Ok(ids) => report.started = ids,
            Err(e) => error!("[SCHEDULER] starting contests failed: {}", e),
        }
        report.resolve = self.resolve_in_progress(now).await;
        match self.purge_completed(now - self.config.retention()).await {
            Ok(purged) => report.purged = purged,
            Err(e) => error!("[SCHEDULER] purge failed: {}", e),
        }

        report
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.sweep_interval_secs.max(1),
        ));
        info!(
            "[SCHEDULER] started (sweep every {}s)",
            self.config.sweep_interval_secs
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("[SCHEDULER] stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
    }
}
