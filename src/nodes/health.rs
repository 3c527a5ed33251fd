// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{ComputeClient, DispatchError};
use super::registry::{Worker, WorkerRegistry, WorkerStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            check_interval_seconds: 60,
            timeout_seconds: 10,
        }
    }
}

impl HealthConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overrides the fields whose environment variable is set.
    pub fn with_env(self) -> Self {
        let defaults = self;
        Self {
            check_interval_seconds: env::var("HEALTH_CHECK_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.check_interval_seconds),
            timeout_seconds: env::var("HEALTH_CHECK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeResult {
    Healthy,
    BadStatus(u16),
    Unreachable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSweepReport {
    /// Workers marked offline for a stale heartbeat before probing.
    pub stale: Vec<String>,
    pub healthy: Vec<String>,
    pub errored: Vec<String>,
    pub unreachable: Vec<String>,
    pub skipped_maintenance: usize,
}

impl HealthSweepReport {
    pub fn probed(&self) -> usize {
        self.healthy.len() + self.errored.len() + self.unreachable.len()
    }
}

pub struct HealthMonitor {
    registry: WorkerRegistry,
    client: Arc<dyn ComputeClient>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(registry: WorkerRegistry, client: Arc<dyn ComputeClient>, config: HealthConfig) -> Self {
        Self {
            registry,
            client,
            config,
        }
    }

    async fn probe(&self, worker: &Worker) -> ProbeResult {
        let timeout = self.config.timeout();
        let endpoint = worker.endpoint();
        match tokio::time::timeout(timeout, self.client.health(&endpoint)).await {
            Ok(Ok(200)) => ProbeResult::Healthy,
            Ok(Ok(status)) => ProbeResult::BadStatus(status),
            Ok(Err(DispatchError::Status { status, .. })) => ProbeResult::BadStatus(status),
            Ok(Err(e)) => {
                debug!("Health probe for {} failed: {}", worker.id, e);
                ProbeResult::Unreachable
            }
            Err(_) => ProbeResult::Unreachable,
        }
    }

    /// Marks stale workers offline, then probes every non-maintenance worker
    /// concurrently and applies the results.
    pub async fn probe_all(&self) -> HealthSweepReport {
        let mut report = HealthSweepReport {
            stale: self.registry.sweep_stale().await,
            ..Default::default()
        };

        let workers = self.registry.list_all().await;
        let (targets, maintenance): (Vec<Worker>, Vec<Worker>) = workers
            .into_iter()
            .partition(|w| w.status != WorkerStatus::Maintenance);
        report.skipped_maintenance = maintenance.len();

        let results = join_all(targets.iter().map(|w| self.probe(w))).await;

        for (worker, result) in targets.iter().zip(results) {
            // The worker may have been deregistered while we were probing.
            let applied = match result {
                ProbeResult::Healthy => self.registry.heartbeat(&worker.id, None).await.map(|_| ()),
                ProbeResult::BadStatus(status) => {
                    warn!("Worker {} health check failed: {}", worker.name, status);
                    self.registry.set_status(&worker.id, WorkerStatus::Error).await
                }
                ProbeResult::Unreachable => {
                    warn!("Worker {} is unreachable", worker.name);
                    self.registry.set_status(&worker.id, WorkerStatus::Offline).await
                }
            };
            if applied.is_err() {
                continue;
            }
            match result {
                ProbeResult::Healthy => report.healthy.push(worker.id.clone()),
                ProbeResult::BadStatus(_) => report.errored.push(worker.id.clone()),
                ProbeResult::Unreachable => report.unreachable.push(worker.id.clone()),
            }
        }

        self.registry.checkpoint().await;

        info!(
            "Health sweep: {} healthy, {} error, {} unreachable, {} stale, {} in maintenance",
            report.healthy.len(),
            report.errored.len(),
            report.unreachable.len(),
            report.stale.len(),
            report.skipped_maintenance
        );
        report
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.check_interval_seconds.max(1)));
        info!(
            "Health monitor started (every {}s)",
            self.config.check_interval_seconds
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Health monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.probe_all().await;
                }
            }
        }
    }
}
