// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod types;
pub mod validator;

pub use types::{Combatant, Outcome, Round};
pub use validator::{
    HpTrace, MatchKind, OutcomeValidator, Side, ValidationIssue, ValidationReport, STARTING_HP,
};
