// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::odds::contest_odds;
use super::types::{Bet, BetError, BettingConfig, BettorStats};
use crate::settlement::PoolConfig;
use crate::storage::{Amount, ArenaStore, Ledger};

/// Accepts wagers on contests whose betting window is open.
#[derive(Clone)]
pub struct BettingDesk {
    store: ArenaStore,
    config: BettingConfig,
    pool: PoolConfig,
}

impl BettingDesk {
    pub fn new(store: ArenaStore, config: BettingConfig, pool: PoolConfig) -> Self {
        Self {
            store,
            config,
            pool,
        }
    }

    pub fn config(&self) -> &BettingConfig {
        &self.config
    }

    /// Debits the stake and records the bet at the current odds. Any
    /// rejection leaves the contest and the bettor's balance untouched.
    pub async fn place_bet(
        &self,
        contest_id: &str,
        bettor: &str,
        fighter: &str,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<Bet, BetError> {
        let min_bet = self.config.min_bet;
        let house_cut_bps = self.pool.house_cut_bps;

        let bet = self
            .store
            .transaction(|state| {
                let contest = state
                    .contests
                    .get(contest_id)
                    .ok_or_else(|| BetError::ContestNotFound(contest_id.to_string()))?;
                if !contest.accepts_bets_at(now) {
                    return Err(BetError::BettingClosed {
                        contest_id: contest_id.to_string(),
                        status: contest.status,
                    });
                }
                if !contest.has_fighter(fighter) {
                    return Err(BetError::FighterNotInContest(fighter.to_string()));
                }
                if amount < min_bet {
                    return Err(BetError::BelowMinimum {
                        amount,
                        minimum: min_bet,
                    });
                }
                if state.contest_bets(contest_id).iter().any(|b| b.bettor == bettor) {
                    return Err(BetError::DuplicateBet {
                        contest_id: contest_id.to_string(),
                        bettor: bettor.to_string(),
                    });
                }

                state.debit(bettor, amount)?;

                let contest = state
                    .contests
                    .get_mut(contest_id)
                    .ok_or_else(|| BetError::ContestNotFound(contest_id.to_string()))?;
                let on_a = contest.fighter_a == fighter;
                let odds_at_bet = if on_a { contest.odds_a } else { contest.odds_b };
                if on_a {
                    contest.bets_a += amount;
                } else {
                    contest.bets_b += amount;
                }
                let (odds_a, odds_b) = contest_odds(contest.bets_a, contest.bets_b, house_cut_bps);
                contest.odds_a = odds_a;
                contest.odds_b = odds_b;

                let bet = Bet {
                    id: Uuid::new_v4().to_string(),
                    contest_id: contest_id.to_string(),
                    bettor: bettor.to_string(),
                    chosen_fighter: fighter.to_string(),
                    amount,
                    odds_at_bet,
                    settled: false,
                    is_winner: None,
                    payout: 0,
                    placed_at: now,
                };
                state
                    .bets
                    .entry(contest_id.to_string())
                    .or_default()
                    .push(bet.clone());
                Ok(bet)
            })
            .await?;

        info!(
            "[BETTING] {} staked {} on {} in contest {} at {}",
            bettor, amount, fighter, contest_id, bet.odds_at_bet
        );
        Ok(bet)
    }

    /// Funds an account.
    pub async fn deposit(&self, account: &str, amount: Amount) -> Result<Amount, BetError> {
        let balance = self
            .store
            .transaction(|state| Ok::<_, BetError>(state.credit(account, amount)?))
            .await?;
        debug!("[BETTING] deposited {} to {} (balance {})", amount, account, balance);
        Ok(balance)
    }

    pub async fn balance(&self, account: &str) -> Amount {
        self.store.read(|state| state.balance(account)).await
    }

    pub async fn house_balance(&self) -> Amount {
        self.store.read(|state| state.house_balance()).await
    }

    pub async fn bets_for_contest(&self, contest_id: &str) -> Vec<Bet> {
        self.store
            .read(|state| state.contest_bets(contest_id).to_vec())
            .await
    }

    pub async fn bets_for_bettor(&self, bettor: &str) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self
            .store
            .read(|state| {
                state
                    .bets
                    .values()
                    .flatten()
                    .filter(|b| b.bettor == bettor)
                    .cloned()
                    .collect()
            })
            .await;
        bets.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        bets
    }

    pub async fn stats(&self, bettor: &str) -> BettorStats {
        self.store
            .read(|state| state.bettor_stats.get(bettor).cloned().unwrap_or_default())
            .await
    }
}
