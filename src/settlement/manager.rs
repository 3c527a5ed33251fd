// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::payment_distribution::{distribute, PoolConfig, Stake};
use super::types::{RefundReport, SettlementConfig, SettlementError, SettlementReport};
use crate::consensus::Resolution;
use crate::ladder::{apply_result, recompute_ranks, LadderError, RatingConfig};
use crate::schedule::ContestStatus;
use crate::storage::{ArenaState, ArenaStore, Ledger};

/// Applies a resolved contest to the ladder, the bets and the ledger in one
/// store transaction.
#[derive(Clone)]
pub struct SettlementEngine {
    store: ArenaStore,
    rating: RatingConfig,
    pool: PoolConfig,
    config: SettlementConfig,
}

impl SettlementEngine {
    pub fn new(
        store: ArenaStore,
        rating: RatingConfig,
        pool: PoolConfig,
        config: SettlementConfig,
    ) -> Self {
        Self {
            store,
            rating,
            pool,
            config,
        }
    }

    /// Settles `resolution` against its contest, retrying persistence
    /// failures with exponential backoff.
    pub async fn settle(
        &self,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<SettlementReport, SettlementError> {
        let contest_id = resolution.contest_id.as_str();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = self
                .store
                .transaction(|state| {
                    settle_in(
                        state,
                        resolution,
                        self.rating.k_factor,
                        self.pool.house_cut_bps,
                        now,
                    )
                })
                .await;

            match result {
                Ok(mut report) => {
                    report.attempts = attempts;
                    info!(
                        "[SETTLEMENT] contest {} settled: winner {} ({} -> {}), {} bet(s), paid {}, house {}",
                        contest_id,
                        report.winner_id,
                        report.rating_change.winner_before,
                        report.rating_change.winner_after,
                        report.bets_settled,
                        report.total_paid,
                        report.house_take
                    );
                    return Ok(report);
                }
                Err(e) if e.is_retryable() && attempts <= self.config.max_retries => {
                    let delay = self.config.backoff(attempts);
                    warn!(
                        "[SETTLEMENT] contest {} attempt {}/{} failed: {}, retrying in {:?}",
                        contest_id,
                        attempts,
                        self.config.max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    error!(
                        "[SETTLEMENT] contest {} failed after {} attempt(s): {}",
                        contest_id, attempts, e
                    );
                    return Err(SettlementError::PartialFailure {
                        contest_id: contest_id.to_string(),
                        attempts,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Settlement body, run inside a store transaction. Any error discards every
/// change made here.
pub fn settle_in(
    state: &mut ArenaState,
    resolution: &Resolution,
    k_factor: f64,
    house_cut_bps: u32,
    now: DateTime<Utc>,
) -> Result<SettlementReport, SettlementError> {
    let contest_id = resolution.contest_id.as_str();
    let winner_id = resolution.winner_id();

    let contest = state
        .contests
        .get(contest_id)
        .ok_or_else(|| SettlementError::ContestNotFound(contest_id.to_string()))?;
    match contest.status {
        ContestStatus::InProgress => {}
        ContestStatus::Completed => {
            return Err(SettlementError::AlreadySettled(contest_id.to_string()))
        }
        status => {
            return Err(SettlementError::InvalidState {
                contest_id: contest_id.to_string(),
                status,
            })
        }
    }
    let loser_id = contest
        .opponent_of(winner_id)
        .ok_or_else(|| SettlementError::WinnerNotInContest {
            contest_id: contest_id.to_string(),
            winner_id: winner_id.to_string(),
        })?
        .to_string();
    let season_id = contest.season_id.clone();

    // Ladder
    let entries = state
        .rankings
        .get_mut(&season_id)
        .ok_or_else(|| SettlementError::MissingRanking {
            season_id: season_id.clone(),
            entity_id: winner_id.to_string(),
        })?;
    let rating_change = apply_result(entries, &season_id, winner_id, &loser_id, k_factor, now)
        .map_err(|e| match e {
            LadderError::MissingRanking {
                season_id,
                entity_id,
            } => SettlementError::MissingRanking {
                season_id,
                entity_id,
            },
            other => SettlementError::MissingRanking {
                season_id: season_id.clone(),
                entity_id: other.to_string(),
            },
        })?;
    recompute_ranks(entries);

    // Pool
    let bets = state.bets.get(contest_id).cloned().unwrap_or_default();
    let open: Vec<usize> = (0..bets.len()).filter(|&i| !bets[i].settled).collect();
    let stakes: Vec<Stake> = open
        .iter()
        .map(|&i| Stake {
            amount: bets[i].amount,
            on_winner: bets[i].chosen_fighter == winner_id,
        })
        .collect();
    let distribution = distribute(&stakes, house_cut_bps);

    let mut settled_bets = bets;
    for (slot, &i) in open.iter().enumerate() {
        let bet = &mut settled_bets[i];
        let won = stakes[slot].on_winner;
        let payout = distribution.payouts[slot];
        bet.settled = true;
        bet.is_winner = Some(won);
        bet.payout = payout;

        if payout > 0 {
            state.credit(&bet.bettor, payout)?;
        }
        state
            .bettor_stats
            .entry(bet.bettor.clone())
            .or_default()
            .record(bet.amount, won.then_some(payout));
    }
    if distribution.house_take > 0 {
        state.credit_house(distribution.house_take)?;
    }
    let bets_settled = open.len();
    state.bets.insert(contest_id.to_string(), settled_bets);

    // Votes
    for vote in &resolution.votes {
        state.record_vote(vote.clone());
    }

    // Contest
    let contest = state
        .contests
        .get_mut(contest_id)
        .ok_or_else(|| SettlementError::ContestNotFound(contest_id.to_string()))?;
    contest.status = ContestStatus::Completed;
    contest.winner = Some(winner_id.to_string());
    contest.completed_at = Some(now);
    contest.outcome = Some(resolution.outcome.clone());
    contest.resolution = Some(resolution.source.clone());
    contest.last_error = None;

    Ok(SettlementReport {
        contest_id: contest_id.to_string(),
        winner_id: winner_id.to_string(),
        loser_id,
        rating_change,
        bets_settled,
        winning_total: distribution.winning_total,
        losing_total: distribution.losing_total,
        house_cut: distribution.house_cut,
        prize_pool: distribution.prize_pool,
        total_paid: distribution.total_paid(),
        house_take: distribution.house_take,
        attempts: 0,
    })
}

/// Returns every unsettled stake on `contest_id` to its bettor. Stats are not
/// touched. Runs inside the caller's transaction.
pub fn refund_in(state: &mut ArenaState, contest_id: &str) -> Result<RefundReport, SettlementError> {
    let mut bets = state.bets.get(contest_id).cloned().unwrap_or_default();
    let mut report = RefundReport {
        contest_id: contest_id.to_string(),
        bets_refunded: 0,
        total_refunded: 0,
    };

    for bet in bets.iter_mut().filter(|b| !b.settled) {
        state.credit(&bet.bettor, bet.amount)?;
        bet.settled = true;
        bet.is_winner = None;
        bet.payout = bet.amount;
        report.bets_refunded += 1;
        report.total_refunded += bet.amount;
    }

    if report.bets_refunded > 0 {
        state.bets.insert(contest_id.to_string(), bets);
        info!(
            "[SETTLEMENT] refunded {} bet(s) totalling {} on contest {}",
            report.bets_refunded, report.total_refunded, contest_id
        );
    }
    Ok(report)
}
