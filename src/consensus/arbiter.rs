// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::types::Vote;
use crate::outcome::Outcome;

/// Why a set of votes could not produce an authoritative outcome. Always
/// answered by the fallback generator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoConsensus {
    #[error("{valid} valid vote(s), quorum is {required}")]
    InsufficientQuorum { valid: usize, required: usize },
    #[error("none of {valid} valid vote(s) named a contestant")]
    EmptyTally { valid: usize },
    #[error("leader {leader} has {leader_votes} of {valid} valid vote(s), no majority")]
    NoMajority {
        leader: String,
        leader_votes: usize,
        valid: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub winner_id: String,
    /// Outcome from the first valid vote for the winner.
    pub outcome: Outcome,
    pub worker_id: String,
    pub votes_for: usize,
    pub valid_votes: usize,
}

pub struct ConsensusArbiter {
    min_consensus_nodes: usize,
}

impl ConsensusArbiter {
    pub fn new(min_consensus_nodes: usize) -> Self {
        Self {
            min_consensus_nodes,
        }
    }

    /// Strict majority over valid votes. Votes naming someone other than
    /// `id_a` or `id_b` count toward the quorum but not the tally.
    pub fn arbitrate(&self, votes: &[Vote], id_a: &str, id_b: &str) -> Result<Verdict, NoConsensus> {
        let valid: Vec<&Vote> = votes.iter().filter(|v| v.valid).collect();
        if valid.len() < self.min_consensus_nodes {
            warn!(
                "[CONSENSUS] {} valid vote(s), quorum is {}",
                valid.len(),
                self.min_consensus_nodes
            );
            return Err(NoConsensus::InsufficientQuorum {
                valid: valid.len(),
                required: self.min_consensus_nodes,
            });
        }

        let count = |id: &str| {
            valid
                .iter()
                .filter(|v| v.voted_winner_id.as_deref() == Some(id))
                .count()
        };
        let tally_a = count(id_a);
        let tally_b = count(id_b);

        if tally_a + tally_b == 0 {
            warn!("[CONSENSUS] no valid vote named a contestant");
            return Err(NoConsensus::EmptyTally { valid: valid.len() });
        }

        let (leader, leader_votes) = if tally_a >= tally_b {
            (id_a, tally_a)
        } else {
            (id_b, tally_b)
        };

        if 2 * leader_votes <= valid.len() {
            warn!(
                "[CONSENSUS] no majority: {} has {} of {} valid vote(s)",
                leader,
                leader_votes,
                valid.len()
            );
            return Err(NoConsensus::NoMajority {
                leader: leader.to_string(),
                leader_votes,
                valid: valid.len(),
            });
        }

        let (worker_id, outcome) = valid
            .iter()
            .filter(|v| v.voted_winner_id.as_deref() == Some(leader))
            .find_map(|v| v.outcome.clone().map(|o| (v.worker_id.clone(), o)))
            .ok_or(NoConsensus::EmptyTally { valid: valid.len() })?;

        info!(
            "[CONSENSUS] {} wins with {}/{} valid vote(s), outcome from worker {}",
            leader,
            leader_votes,
            valid.len(),
            worker_id
        );

        Ok(Verdict {
            winner_id: leader.to_string(),
            outcome,
            worker_id,
            votes_for: leader_votes,
            valid_votes: valid.len(),
        })
    }
}
