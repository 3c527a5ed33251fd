// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Outcome validation and repair
//!
//! Worker narratives carry running hit-point totals that are frequently wrong.
//! The validator replays the damage sequence from full health and compares it
//! with what the worker wrote; the repairer rewrites the outcome so the numbers,
//! the declared winner and the summary agree.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::types::{Combatant, Outcome, Round};

pub const STARTING_HP: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

/// How a round's defender was tied to a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Id,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssue {
    UnknownDefender { round: usize, defender: String },
    HpMismatch { round: usize, expected: u32, recorded: u32 },
    RoundsAfterKnockout { first_extra_round: usize },
    NoKnockout { hp_a: u32, hp_b: u32 },
    WinnerNotInContest { recorded: String },
    WinnerMismatch { expected: String, recorded: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    /// Rounds whose defender only matched by display name.
    pub name_matched_rounds: usize,
    pub final_hp_a: u32,
    pub final_hp_b: u32,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Result of replaying an outcome's damage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HpTrace {
    pub hp_a: u32,
    pub hp_b: u32,
}

impl HpTrace {
    pub fn knocked_out(&self) -> Option<Side> {
        match (self.hp_a == 0, self.hp_b == 0) {
            (true, false) => Some(Side::A),
            (false, true) => Some(Side::B),
            _ => None,
        }
    }
}

pub struct OutcomeValidator {
    sides: [Combatant; 2],
}

impl OutcomeValidator {
    pub fn new(a: Combatant, b: Combatant) -> Self {
        Self { sides: [a, b] }
    }

    pub fn combatant(&self, side: Side) -> &Combatant {
        &self.sides[side.index()]
    }

    pub fn side_of_id(&self, id: &str) -> Option<Side> {
        if self.sides[0].id == id {
            Some(Side::A)
        } else if self.sides[1].id == id {
            Some(Side::B)
        } else {
            None
        }
    }

    /// Two-pass defender match: ids first, display names second.
    pub fn match_defender(&self, round: &Round) -> Option<(Side, MatchKind)> {
        if let Some(side) = self.side_of_id(&round.defender_id) {
            return Some((side, MatchKind::Id));
        }
        if self.sides[0].name == round.defender_id {
            return Some((Side::A, MatchKind::Name));
        }
        if self.sides[1].name == round.defender_id {
            return Some((Side::B, MatchKind::Name));
        }
        None
    }

    /// Replays every matched round without stopping at a knockout.
    pub fn simulate(&self, outcome: &Outcome) -> HpTrace {
        let mut hp = [STARTING_HP; 2];
        for round in &outcome.rounds {
            if let Some((side, _)) = self.match_defender(round) {
                let i = side.index();
                hp[i] = hp[i].saturating_sub(round.damage);
            }
        }
        HpTrace {
            hp_a: hp[0],
            hp_b: hp[1],
        }
    }

    pub fn validate(&self, outcome: &Outcome) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut hp = [STARTING_HP; 2];
        let mut knockout_at: Option<usize> = None;

        for (i, round) in outcome.rounds.iter().enumerate() {
            if knockout_at.is_some() {
                report
                    .issues
                    .push(ValidationIssue::RoundsAfterKnockout { first_extra_round: i });
                break;
            }

            let (side, kind) = match self.match_defender(round) {
                Some(m) => m,
                None => {
                    report.issues.push(ValidationIssue::UnknownDefender {
                        round: i,
                        defender: round.defender_id.clone(),
                    });
                    continue;
                }
            };
            if kind == MatchKind::Name {
                report.name_matched_rounds += 1;
            }

            let idx = side.index();
            hp[idx] = hp[idx].saturating_sub(round.damage);
            if round.remaining_hp != hp[idx] {
                report.issues.push(ValidationIssue::HpMismatch {
                    round: i,
                    expected: hp[idx],
                    recorded: round.remaining_hp,
                });
            }
            if hp[idx] == 0 {
                knockout_at = Some(i);
            }
        }

        report.final_hp_a = hp[0];
        report.final_hp_b = hp[1];

        let trace = HpTrace {
            hp_a: hp[0],
            hp_b: hp[1],
        };

        match self.side_of_id(&outcome.winner_id) {
            None => report.issues.push(ValidationIssue::WinnerNotInContest {
                recorded: outcome.winner_id.clone(),
            }),
            Some(declared) => match trace.knocked_out() {
                Some(loser) => {
                    let expected = self.combatant(loser.other()).id.clone();
                    if declared != loser.other() {
                        report.issues.push(ValidationIssue::WinnerMismatch {
                            expected,
                            recorded: outcome.winner_id.clone(),
                        });
                    }
                }
                None => report.issues.push(ValidationIssue::NoKnockout {
                    hp_a: hp[0],
                    hp_b: hp[1],
                }),
            },
        }

        if report.name_matched_rounds > 0 {
            warn!(
                "[OUTCOME] {} round(s) keyed by display name instead of id",
                report.name_matched_rounds
            );
        }

        report
    }

    /// Rewrites `outcome` so that it is internally consistent. Always succeeds.
    pub fn repair<R: Rng + ?Sized>(&self, outcome: Outcome, rng: &mut R) -> Outcome {
        let mut hp = [STARTING_HP; 2];
        let mut rounds: Vec<Round> = Vec::with_capacity(outcome.rounds.len() + 1);
        let mut loser: Option<Side> = None;

        for (i, mut round) in outcome.rounds.into_iter().enumerate() {
            let side = match self.match_defender(&round) {
                Some((side, _)) => side,
                None => {
                    warn!(
                        "[OUTCOME] dropping round {} with unknown defender '{}'",
                        i, round.defender_id
                    );
                    continue;
                }
            };

            let idx = side.index();
            hp[idx] = hp[idx].saturating_sub(round.damage);
            round.defender_id = self.combatant(side).id.clone();
            round.attacker_id = self.combatant(side.other()).id.clone();
            round.remaining_hp = hp[idx];
            rounds.push(round);

            if hp[idx] == 0 {
                loser = Some(side);
                break;
            }
        }

        let loser = match loser {
            Some(side) => side,
            None => {
                let side = if hp[0] < hp[1] {
                    Side::A
                } else if hp[1] < hp[0] {
                    Side::B
                } else {
                    let side = if rng.gen_bool(0.5) { Side::A } else { Side::B };
                    info!(
                        "[OUTCOME] HP tied at {}; coin flip decided {} loses",
                        hp[0],
                        self.combatant(side).id
                    );
                    side
                };

                let winner = self.combatant(side.other());
                let beaten = self.combatant(side);
                let finishing_damage = hp[side.index()];
                rounds.push(Round {
                    attacker_id: winner.id.clone(),
                    defender_id: beaten.id.clone(),
                    action: "Finishing blow".to_string(),
                    damage: finishing_damage,
                    description: format!("{} lands the decisive blow on {}.", winner.name, beaten.name),
                    remaining_hp: 0,
                });
                side
            }
        };

        let winner = self.combatant(loser.other());
        debug!(
            "[OUTCOME] repaired outcome: winner {} after {} rounds",
            winner.id,
            rounds.len()
        );

        Outcome {
            winner_id: winner.id.clone(),
            rounds,
            summary: format!("After a fierce contest, {} emerges victorious!", winner.name),
        }
    }

    /// Validates and, when needed, repairs. Returns the consistent outcome and
    /// the issues that were found on the way in.
    pub fn check<R: Rng + ?Sized>(
        &self,
        outcome: Outcome,
        rng: &mut R,
    ) -> (Outcome, Vec<ValidationIssue>) {
        let report = self.validate(&outcome);
        if report.is_valid() {
            return (outcome, Vec::new());
        }
        warn!(
            "[OUTCOME] inconsistent outcome ({} issue(s)), repairing",
            report.issues.len()
        );
        (self.repair(outcome, rng), report.issues)
    }
}
