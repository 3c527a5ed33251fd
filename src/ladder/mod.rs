// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod matchmaker;
pub mod ratings;

pub use matchmaker::{Matchmaker, MatchmakerConfig, PairKey};

pub use ratings::{
    apply_result, elo_deltas, expected_score, initial_points, ordered_entries, recompute_ranks,
    Entrant, EntrantProfile, LadderError, LadderService, RankEntry, RatingChange, RatingConfig,
    Season, SeasonConfig,
};
