// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::types::Vote;
use crate::nodes::{
    default_selection_size, select_weighted, ComputeClient, DispatchError, ResolveRequest, Worker,
    WorkerRegistry,
};

/// Fans a contest out to a weighted sample of available workers.
pub struct Dispatcher {
    registry: WorkerRegistry,
    client: Arc<dyn ComputeClient>,
    min_consensus_nodes: usize,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: WorkerRegistry,
        client: Arc<dyn ComputeClient>,
        min_consensus_nodes: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            min_consensus_nodes,
            timeout,
        }
    }

    pub fn min_consensus_nodes(&self) -> usize {
        self.min_consensus_nodes
    }

    /// Deterministic for a fixed contest id and registry snapshot.
    pub async fn select_workers(&self, contest_id: &str, n: Option<usize>) -> Vec<Worker> {
        let available = self.registry.list_available().await;
        let n = n.unwrap_or_else(|| default_selection_size(available.len(), self.min_consensus_nodes));
        select_weighted(contest_id, &available, n)
    }

    /// Sends the same request to every selected worker concurrently and
    /// waits for all of them. Returns one vote per worker, in selection order.
    pub async fn dispatch(&self, request: &ResolveRequest, selected: &[Worker]) -> Vec<Vote> {
        info!(
            "[DISPATCH] contest {} -> {} worker(s)",
            request.contest_id,
            selected.len()
        );

        let calls = selected.iter().map(|worker| self.call_worker(worker, request));
        let votes = join_all(calls).await;
        self.registry.checkpoint().await;

        let valid = votes.iter().filter(|v| v.valid).count();
        info!(
            "[DISPATCH] contest {} collected {} vote(s), {} valid",
            request.contest_id,
            votes.len(),
            valid
        );
        votes
    }

    async fn call_worker(&self, worker: &Worker, request: &ResolveRequest) -> Vote {
        self.registry.begin_request(&worker.id).await;
        let endpoint = worker.endpoint();
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.client.resolve(&endpoint, request)).await {
            Ok(Ok(outcome)) if outcome.winner_id.trim().is_empty() => Err(DispatchError::Malformed(
                "response has an empty winner".to_string(),
            )),
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        let elapsed = started.elapsed().min(self.timeout);
        let success = result.is_ok();
        if let Err(e) = self.registry.record_outcome(&worker.id, success, elapsed).await {
            debug!("[DISPATCH] could not record outcome for {}: {}", worker.id, e);
        }
        self.registry.end_request(&worker.id).await;

        let elapsed_ms = elapsed.as_millis() as u64;
        match result {
            Ok(outcome) => {
                debug!(
                    "[DISPATCH] worker {} voted {} in {}ms",
                    worker.id, outcome.winner_id, elapsed_ms
                );
                Vote::accepted(&request.contest_id, &worker.id, outcome, elapsed_ms, Utc::now())
            }
            Err(e) => {
                warn!("[DISPATCH] worker {} ({}) failed: {}", worker.name, worker.id, e);
                Vote::rejected(&request.contest_id, &worker.id, e.to_string(), elapsed_ms, Utc::now())
            }
        }
    }
}
