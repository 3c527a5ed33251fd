// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Two-stage contest resolution
//!
//! Consensus over the worker pool first, the local fallback generator when the
//! pool cannot produce a majority. Whatever comes out is validated against the
//! HP simulation and repaired if needed before it is handed back.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::arbiter::ConsensusArbiter;
use super::dispatcher::Dispatcher;
use super::fallback::FallbackGenerator;
use super::types::{Resolution, ResolutionError, ResolutionSource, Vote};
use crate::nodes::ResolveRequest;
use crate::outcome::{Combatant, Outcome, OutcomeValidator};
use crate::storage::{ArenaStore, StoreError};

/// Everything needed to resolve one contest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestTicket {
    pub contest_id: String,
    pub fighter_a: Combatant,
    pub fighter_b: Combatant,
    pub payload: serde_json::Value,
    pub seed: u64,
}

impl ContestTicket {
    pub fn request(&self) -> ResolveRequest {
        ResolveRequest {
            contest_id: self.contest_id.clone(),
            payload: self.payload.clone(),
            seed: self.seed,
        }
    }
}

#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    async fn resolve(&self, ticket: &ContestTicket) -> Result<Resolution, ResolutionError>;
}

pub struct ContestResolver {
    dispatcher: Dispatcher,
    arbiter: ConsensusArbiter,
    fallback: FallbackGenerator,
    votes: Option<ArenaStore>,
}

impl ContestResolver {
    pub fn new(dispatcher: Dispatcher, arbiter: ConsensusArbiter, fallback: FallbackGenerator) -> Self {
        Self {
            dispatcher,
            arbiter,
            fallback,
            votes: None,
        }
    }

    /// Records every consensus round's votes in `store` as soon as the round
    /// completes, whether or not the contest is later settled.
    pub fn with_vote_store(mut self, store: ArenaStore) -> Self {
        self.votes = Some(store);
        self
    }

    async fn record_votes(&self, contest_id: &str, votes: &[Vote]) {
        let Some(store) = &self.votes else {
            return;
        };
        if votes.is_empty() {
            return;
        }
        let result = store
            .transaction(|state| {
                let stored = votes
                    .iter()
                    .filter(|vote| state.record_vote((*vote).clone()))
                    .count();
                Ok::<_, StoreError>(stored)
            })
            .await;
        match result {
            Ok(stored) => debug!("[RESOLVER] contest {}: recorded {} vote(s)", contest_id, stored),
            Err(e) => warn!("[RESOLVER] contest {}: could not record votes: {}", contest_id, e),
        }
    }

    /// Stage one. `Ok(Err(reason))` means the pool answered without a
    /// majority; `Err` means no round was run at all.
    async fn consensus_round(
        &self,
        ticket: &ContestTicket,
    ) -> Result<(Vec<Vote>, Result<(Outcome, ResolutionSource), String>), ResolutionError> {
        let selected = self.dispatcher.select_workers(&ticket.contest_id, None).await;
        let required = self.dispatcher.min_consensus_nodes();
        if selected.len() < required {
            return Err(ResolutionError::WorkerUnavailable {
                selected: selected.len(),
                required,
            });
        }

        let votes = self.dispatcher.dispatch(&ticket.request(), &selected).await;
        let verdict = self
            .arbiter
            .arbitrate(&votes, &ticket.fighter_a.id, &ticket.fighter_b.id)
            .map(|v| {
                (
                    v.outcome,
                    ResolutionSource::Consensus {
                        votes_for: v.votes_for,
                        valid_votes: v.valid_votes,
                    },
                )
            })
            .map_err(|e| e.to_string());
        Ok((votes, verdict))
    }
}

#[async_trait]
impl ResolutionStrategy for ContestResolver {
    async fn resolve(&self, ticket: &ContestTicket) -> Result<Resolution, ResolutionError> {
        let (votes, stage_one) = match self.consensus_round(ticket).await {
            Ok((votes, verdict)) => {
                self.record_votes(&ticket.contest_id, &votes).await;
                (votes, verdict)
            }
            Err(e) => {
                warn!("[RESOLVER] contest {}: {}, skipping consensus", ticket.contest_id, e);
                (Vec::new(), Err(e.to_string()))
            }
        };

        let (outcome, source) = match stage_one {
            Ok(found) => found,
            Err(reason) => {
                info!(
                    "[RESOLVER] contest {} falling back to local generation: {}",
                    ticket.contest_id, reason
                );
                let outcome = self.fallback.generate(&ticket.request()).await?;
                (outcome, ResolutionSource::Fallback { reason })
            }
        };

        let validator = OutcomeValidator::new(ticket.fighter_a.clone(), ticket.fighter_b.clone());
        let mut rng = StdRng::seed_from_u64(ticket.seed);
        let (outcome, issues) = validator.check(outcome, &mut rng);
        if !issues.is_empty() {
            warn!(
                "[RESOLVER] contest {} outcome repaired ({} issue(s)): {:?}",
                ticket.contest_id,
                issues.len(),
                issues
            );
        }

        info!(
            "[RESOLVER] contest {} resolved: winner {} via {:?}",
            ticket.contest_id, outcome.winner_id, source
        );

        Ok(Resolution {
            contest_id: ticket.contest_id.clone(),
            outcome,
            source,
            votes,
            issues,
        })
    }
}
