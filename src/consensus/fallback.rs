// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::types::ResolutionError;
use crate::nodes::{ComputeClient, ResolveRequest, WorkerEndpoint};
use crate::outcome::Outcome;

/// Single authoritative call to the local generator. No voting.
pub struct FallbackGenerator {
    client: Arc<dyn ComputeClient>,
    endpoint: WorkerEndpoint,
    timeout: Duration,
}

impl FallbackGenerator {
    pub fn new(client: Arc<dyn ComputeClient>, endpoint: WorkerEndpoint, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }

    pub async fn generate(&self, request: &ResolveRequest) -> Result<Outcome, ResolutionError> {
        info!(
            "[FALLBACK] generating contest {} locally at {}",
            request.contest_id, self.endpoint.url
        );

        let outcome = match tokio::time::timeout(self.timeout, self.client.resolve(&self.endpoint, request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("[FALLBACK] contest {} failed: {}", request.contest_id, e);
                return Err(ResolutionError::FallbackFailure(e.to_string()));
            }
            Err(_) => {
                error!(
                    "[FALLBACK] contest {} timed out after {:?}",
                    request.contest_id, self.timeout
                );
                return Err(ResolutionError::FallbackFailure(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        if outcome.winner_id.trim().is_empty() {
            return Err(ResolutionError::FallbackFailure(
                "response has an empty winner".to_string(),
            ));
        }
        Ok(outcome)
    }
}
