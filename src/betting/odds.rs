// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::storage::Amount;

/// 2.00x, shown for a side nobody has backed yet.
pub const DEFAULT_ODDS: u32 = 200;

pub const BPS_DENOMINATOR: u128 = 10_000;

/// Projected return per unit staked on `side`, in hundredths:
/// `(side + other - other*cut) / side`, floored.
pub fn compute_odds(side: Amount, other: Amount, house_cut_bps: u32) -> u32 {
    if side == 0 {
        return DEFAULT_ODDS;
    }
    let cut = (house_cut_bps as u128).min(BPS_DENOMINATOR);
    let numerator = side as u128 * BPS_DENOMINATOR + other as u128 * (BPS_DENOMINATOR - cut);
    let odds = numerator * 100 / (side as u128 * BPS_DENOMINATOR);
    u32::try_from(odds).unwrap_or(u32::MAX)
}

/// `(odds_a, odds_b)` for the current side totals.
pub fn contest_odds(bets_a: Amount, bets_b: Amount, house_cut_bps: u32) -> (u32, u32) {
    (
        compute_odds(bets_a, bets_b, house_cut_bps),
        compute_odds(bets_b, bets_a, house_cut_bps),
    )
}
