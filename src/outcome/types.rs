// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};

/// One exchange in a contest narrative. `remaining_hp` is the defender's HP
/// after `damage` has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    #[serde(alias = "attacker", alias = "attacker_id", default)]
    pub attacker_id: String,
    #[serde(alias = "defender", alias = "defender_id")]
    pub defender_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub damage: u32,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "remaining_hp", default)]
    pub remaining_hp: u32,
}

/// The answer a compute worker (or the fallback generator) returns for a
/// contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    #[serde(alias = "winner", alias = "winner_id")]
    pub winner_id: String,
    #[serde(alias = "battle_log", default)]
    pub rounds: Vec<Round>,
    #[serde(alias = "battle_description", default)]
    pub summary: String,
}

impl Outcome {
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn total_damage(&self) -> u64 {
        self.rounds.iter().map(|r| r.damage as u64).sum()
    }
}

/// Identity of one side of a contest as the validator sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: String,
    pub name: String,
}

impl Combatant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
