// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod bets;
pub mod odds;
pub mod types;

pub use bets::BettingDesk;
pub use odds::{compute_odds, contest_odds, DEFAULT_ODDS};
pub use types::{Bet, BetError, BettingConfig, BettorStats};
