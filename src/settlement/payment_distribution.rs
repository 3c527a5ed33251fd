// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pari-mutuel pool distribution
//!
//! Losing stakes minus the house cut form the prize pool, which is shared
//! among winning bets in proportion to their stake. All arithmetic is integer;
//! units lost to flooring are handed out by largest remainder so that winners
//! receive exactly `winning_total + prize_pool`.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info};

use crate::betting::odds::BPS_DENOMINATOR;
use crate::storage::Amount;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub house_cut_bps: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { house_cut_bps: 500 }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Self {
        Self {
            house_cut_bps: env::var("HOUSE_CUT_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.house_cut_bps),
        }
    }
}

/// One bet as the pool sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stake {
    pub amount: Amount,
    pub on_winner: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDistribution {
    pub winning_total: Amount,
    pub losing_total: Amount,
    pub house_cut: Amount,
    pub prize_pool: Amount,
    /// Same order as the input stakes. Losing stakes pay 0.
    pub payouts: Vec<Amount>,
    pub house_take: Amount,
}

impl PoolDistribution {
    pub fn total_paid(&self) -> Amount {
        self.payouts.iter().sum()
    }
}

pub fn distribute(stakes: &[Stake], house_cut_bps: u32) -> PoolDistribution {
    let winning_total: Amount = stakes.iter().filter(|s| s.on_winner).map(|s| s.amount).sum();
    let losing_total: Amount = stakes.iter().filter(|s| !s.on_winner).map(|s| s.amount).sum();

    let bps = (house_cut_bps as u128).min(BPS_DENOMINATOR);
    let house_cut = (losing_total as u128 * bps / BPS_DENOMINATOR) as Amount;
    let prize_pool = losing_total - house_cut;

    let mut payouts = vec![0; stakes.len()];

    if winning_total == 0 {
        info!(
            "[PAYMENT-SPLIT] no stake on the winner, {} forfeited to the house",
            losing_total
        );
        return PoolDistribution {
            winning_total,
            losing_total,
            house_cut,
            prize_pool,
            payouts,
            house_take: losing_total,
        };
    }

    let prize = prize_pool as u128;
    let total = winning_total as u128;
    let mut remainders: Vec<(u128, usize)> = Vec::new();
    let mut handed_out: u128 = 0;

    for (i, stake) in stakes.iter().enumerate() {
        if !stake.on_winner {
            continue;
        }
        let scaled = prize * stake.amount as u128;
        let share = scaled / total;
        handed_out += share;
        remainders.push((scaled % total, i));
        payouts[i] = stake.amount + share as Amount;
    }

    // Leftover is strictly less than the number of winning stakes.
    let leftover = (prize - handed_out) as usize;
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    for &(_, i) in remainders.iter().take(leftover) {
        payouts[i] += 1;
    }

    debug!(
        "[PAYMENT-SPLIT] winning {} losing {} cut {} pool {} leftover {}",
        winning_total, losing_total, house_cut, prize_pool, leftover
    );

    PoolDistribution {
        winning_total,
        losing_total,
        house_cut,
        prize_pool,
        payouts,
        house_take: house_cut,
    }
}
