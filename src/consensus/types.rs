// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::outcome::{Outcome, ValidationIssue};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub min_consensus_nodes: usize,
    pub request_timeout_secs: u64,
    pub fallback_endpoint: String,
    pub fallback_api_key: Option<String>,
    pub fallback_timeout_secs: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_consensus_nodes: 3,
            request_timeout_secs: 30,
            fallback_endpoint: "http://localhost:8001".to_string(),
            fallback_api_key: None,
            fallback_timeout_secs: 120,
        }
    }
}

impl ConsensusConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overrides the fields whose environment variable is set.
    pub fn with_env(self) -> Self {
        let defaults = self;
        Self {
            min_consensus_nodes: env::var("MIN_CONSENSUS_NODES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_consensus_nodes),
            request_timeout_secs: env::var("DISPATCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            fallback_endpoint: env::var("FALLBACK_ENDPOINT").unwrap_or(defaults.fallback_endpoint),
            fallback_api_key: env::var("FALLBACK_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .or(defaults.fallback_api_key),
            fallback_timeout_secs: env::var("FALLBACK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fallback_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }
}

/// One worker's answer for one contest. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub contest_id: String,
    pub worker_id: String,
    pub voted_winner_id: Option<String>,
    pub outcome: Option<Outcome>,
    pub elapsed_ms: u64,
    pub valid: bool,
    pub error: Option<String>,
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    pub fn accepted(
        contest_id: &str,
        worker_id: &str,
        outcome: Outcome,
        elapsed_ms: u64,
        cast_at: DateTime<Utc>,
    ) -> Self {
        Self {
            contest_id: contest_id.to_string(),
            worker_id: worker_id.to_string(),
            voted_winner_id: Some(outcome.winner_id.clone()),
            outcome: Some(outcome),
            elapsed_ms,
            valid: true,
            error: None,
            cast_at,
        }
    }

    pub fn rejected(
        contest_id: &str,
        worker_id: &str,
        error: String,
        elapsed_ms: u64,
        cast_at: DateTime<Utc>,
    ) -> Self {
        Self {
            contest_id: contest_id.to_string(),
            worker_id: worker_id.to_string(),
            voted_winner_id: None,
            outcome: None,
            elapsed_ms,
            valid: false,
            error: Some(error),
            cast_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionSource {
    Consensus { votes_for: usize, valid_votes: usize },
    Fallback { reason: String },
}

impl ResolutionSource {
    pub fn is_consensus(&self) -> bool {
        matches!(self, ResolutionSource::Consensus { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub contest_id: String,
    /// Validated (and if needed repaired) outcome.
    pub outcome: Outcome,
    pub source: ResolutionSource,
    pub votes: Vec<Vote>,
    pub issues: Vec<ValidationIssue>,
}

impl Resolution {
    pub fn winner_id(&self) -> &str {
        &self.outcome.winner_id
    }

    pub fn was_repaired(&self) -> bool {
        !self.issues.is_empty()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Only {selected} worker(s) available, {required} required for consensus")]
    WorkerUnavailable { selected: usize, required: usize },
    #[error("Fallback generation failed: {0}")]
    FallbackFailure(String),
}
