// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::{ArenaStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Online,
    Offline,
    Error,
    Maintenance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// A worker whose last heartbeat is older than this is not available.
    pub heartbeat_ttl_secs: u64,
    pub default_weight: u32,
    pub default_max_concurrent: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_ttl_secs: 300,
            default_weight: 1,
            default_max_concurrent: 5,
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overrides the fields whose environment variable is set.
    pub fn with_env(self) -> Self {
        let defaults = self;
        Self {
            heartbeat_ttl_secs: env::var("WORKER_HEARTBEAT_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.heartbeat_ttl_secs),
            default_weight: env::var("WORKER_DEFAULT_WEIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_weight),
            default_max_concurrent: env::var("WORKER_DEFAULT_MAX_CONCURRENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_max_concurrent),
        }
    }

    pub fn heartbeat_ttl(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.heartbeat_ttl_secs as i64)
    }
}

/// Where and how to reach a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEndpoint {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub status: WorkerStatus,
    pub weight: u32,
    pub max_concurrent: u32,
    pub current_load: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub avg_response_time_ms: f64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl Worker {
    pub fn is_available_at(&self, now: DateTime<Utc>, ttl: ChronoDuration) -> bool {
        self.status == WorkerStatus::Online
            && self.has_fresh_heartbeat(now, ttl)
            && self.current_load < self.max_concurrent
    }

    pub fn has_fresh_heartbeat(&self, now: DateTime<Utc>, ttl: ChronoDuration) -> bool {
        match self.last_heartbeat {
            Some(at) => now - at < ttl,
            None => false,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    pub fn endpoint(&self) -> WorkerEndpoint {
        WorkerEndpoint {
            url: self.endpoint.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReceipt {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub worker_id: String,
    #[serde(default)]
    pub current_load: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_workers: usize,
    pub online: usize,
    pub offline: usize,
    pub error: usize,
    pub maintenance: usize,
    pub available: usize,
    pub total_requests: u64,
    pub average_success_rate: f64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),
}

/// Tracks every known compute worker. All counter and status mutations go
/// through the single write lock, so dispatch bookkeeping and health sweeps
/// are serialized per registry.
///
/// With a backing store the worker table is copied into the arena state on
/// registration, removal and every [`WorkerRegistry::checkpoint`].
#[derive(Clone)]
pub struct WorkerRegistry {
    workers: Arc<RwLock<HashMap<String, Worker>>>,
    config: RegistryConfig,
    store: Option<ArenaStore>,
}

impl WorkerRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            workers: Arc::new(RwLock::new(HashMap::new())),
            config,
            store: None,
        }
    }

    /// Restores the workers saved in `store` and persists to it from then on.
    /// In-flight load does not survive a restart.
    pub async fn with_store(config: RegistryConfig, store: ArenaStore) -> Self {
        let mut workers = store.read(|state| state.workers.clone()).await;
        for worker in workers.values_mut() {
            worker.current_load = 0;
        }
        if !workers.is_empty() {
            info!("Restored {} worker(s) from the arena store", workers.len());
        }
        Self {
            workers: Arc::new(RwLock::new(workers)),
            config,
            store: Some(store),
        }
    }

    /// Writes the current worker table to the backing store, if any.
    pub async fn persist(&self) -> Result<(), StoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        // Held across the commit so concurrent saves cannot reorder.
        let workers = self.workers.read().await;
        store
            .transaction(|state| {
                state.workers = workers.clone();
                Ok::<_, StoreError>(())
            })
            .await
    }

    /// [`WorkerRegistry::persist`], logging instead of failing.
    pub async fn checkpoint(&self) {
        if let Err(e) = self.persist().await {
            warn!("Failed to persist worker registry: {}", e);
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationReceipt, RegistryError> {
        self.register_at(request, Utc::now()).await
    }

    /// Creates a worker or updates the one already registered at the same
    /// endpoint.
    pub async fn register_at(
        &self,
        request: RegistrationRequest,
        now: DateTime<Utc>,
    ) -> Result<RegistrationReceipt, RegistryError> {
        let name = request.name.trim().to_string();
        let endpoint = request.endpoint.trim().trim_end_matches('/').to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidRegistration(
                "name must not be empty".to_string(),
            ));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(RegistryError::InvalidRegistration(format!(
                "endpoint must be an http(s) URL, got '{}'",
                endpoint
            )));
        }

        let receipt = {
            let mut workers = self.workers.write().await;
            Self::upsert(&mut workers, &self.config, name, endpoint, request, now)
        };
        self.checkpoint().await;
        Ok(receipt)
    }

    fn upsert(
        workers: &mut HashMap<String, Worker>,
        config: &RegistryConfig,
        name: String,
        endpoint: String,
        request: RegistrationRequest,
        now: DateTime<Utc>,
    ) -> RegistrationReceipt {
        if let Some(existing) = workers.values_mut().find(|w| w.endpoint == endpoint) {
            existing.name = name;
            if request.api_key.is_some() {
                existing.api_key = request.api_key;
            }
            if let Some(weight) = request.weight {
                existing.weight = weight.max(1);
            }
            if let Some(max_concurrent) = request.max_concurrent {
                existing.max_concurrent = max_concurrent;
            }
            Self::touch(existing, now);

            info!("Updated existing worker {} ({})", existing.name, existing.id);
            return RegistrationReceipt {
                worker_id: existing.id.clone(),
                status: existing.status,
                created: false,
            };
        }

        let worker = Worker {
            id: Uuid::new_v4().to_string(),
            name,
            endpoint,
            api_key: request.api_key,
            status: WorkerStatus::Online,
            weight: request.weight.unwrap_or(config.default_weight).max(1),
            max_concurrent: request
                .max_concurrent
                .unwrap_or(config.default_max_concurrent),
            current_load: 0,
            total_requests: 0,
            successful_requests: 0,
            avg_response_time_ms: 0.0,
            last_heartbeat: Some(now),
            registered_at: now,
        };

        info!(
            "Registered new worker {} ({}) at {} with weight {}",
            worker.name, worker.id, worker.endpoint, worker.weight
        );

        let receipt = RegistrationReceipt {
            worker_id: worker.id.clone(),
            status: worker.status,
            created: true,
        };
        workers.insert(worker.id.clone(), worker);
        receipt
    }

    pub async fn heartbeat(
        &self,
        worker_id: &str,
        current_load: Option<u32>,
    ) -> Result<Worker, RegistryError> {
        self.heartbeat_at(worker_id, current_load, Utc::now()).await
    }

    pub async fn heartbeat_at(
        &self,
        worker_id: &str,
        current_load: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Worker, RegistryError> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .get_mut(worker_id)
            .ok_or_else(|| RegistryError::WorkerNotFound(worker_id.to_string()))?;

        Self::touch(worker, now);
        if let Some(load) = current_load {
            worker.current_load = load;
        }
        debug!("Heartbeat from worker {} (load {})", worker.id, worker.current_load);
        Ok(worker.clone())
    }

    fn touch(worker: &mut Worker, now: DateTime<Utc>) {
        worker.last_heartbeat = Some(now);
        if worker.status == WorkerStatus::Offline {
            info!("Worker {} is back online", worker.id);
            worker.status = WorkerStatus::Online;
        }
    }

    pub async fn list_available(&self) -> Vec<Worker> {
        self.list_available_at(Utc::now()).await
    }

    /// Available workers ordered by weight (desc), then average response time
    /// (asc), then id.
    pub async fn list_available_at(&self, now: DateTime<Utc>) -> Vec<Worker> {
        let ttl = self.config.heartbeat_ttl();
        let workers = self.workers.read().await;
        let mut available: Vec<Worker> = workers
            .values()
            .filter(|w| w.is_available_at(now, ttl))
            .cloned()
            .collect();

        available.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then_with(|| a.avg_response_time_ms.total_cmp(&b.avg_response_time_ms))
                .then_with(|| a.id.cmp(&b.id))
        });
        available
    }

    pub async fn record_outcome(
        &self,
        worker_id: &str,
        success: bool,
        elapsed: Duration,
    ) -> Result<(), RegistryError> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .get_mut(worker_id)
            .ok_or_else(|| RegistryError::WorkerNotFound(worker_id.to_string()))?;

        worker.total_requests += 1;
        if success {
            worker.successful_requests += 1;
        }
        let n = worker.total_requests as f64;
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        worker.avg_response_time_ms = (worker.avg_response_time_ms * (n - 1.0) + elapsed_ms) / n;

        debug!(
            "Worker {} request #{} success={} elapsed={:.0}ms avg={:.0}ms",
            worker.id, worker.total_requests, success, elapsed_ms, worker.avg_response_time_ms
        );
        Ok(())
    }

    pub async fn begin_request(&self, worker_id: &str) {
        if let Some(worker) = self.workers.write().await.get_mut(worker_id) {
            worker.current_load = worker.current_load.saturating_add(1);
        }
    }

    pub async fn end_request(&self, worker_id: &str) {
        if let Some(worker) = self.workers.write().await.get_mut(worker_id) {
            worker.current_load = worker.current_load.saturating_sub(1);
        }
    }

    /// Operator action.
    pub async fn set_status(
        &self,
        worker_id: &str,
        status: WorkerStatus,
    ) -> Result<(), RegistryError> {
        let changed = {
            let mut workers = self.workers.write().await;
            let worker = workers
                .get_mut(worker_id)
                .ok_or_else(|| RegistryError::WorkerNotFound(worker_id.to_string()))?;
            let changed = worker.status != status;
            if changed {
                info!("Worker {} status {:?} -> {:?}", worker.id, worker.status, status);
                worker.status = status;
            }
            changed
        };
        if changed {
            self.checkpoint().await;
        }
        Ok(())
    }

    /// Operator action; the pipeline itself never removes workers.
    pub async fn deregister(&self, worker_id: &str) -> Result<Worker, RegistryError> {
        let removed = self
            .workers
            .write()
            .await
            .remove(worker_id)
            .ok_or_else(|| RegistryError::WorkerNotFound(worker_id.to_string()))?;
        info!("Removed worker {} ({})", removed.name, removed.id);
        self.checkpoint().await;
        Ok(removed)
    }

    pub async fn sweep_stale(&self) -> Vec<String> {
        self.sweep_stale_at(Utc::now()).await
    }

    /// Marks online workers with a missing or stale heartbeat as offline and
    /// returns their ids.
    pub async fn sweep_stale_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let ttl = self.config.heartbeat_ttl();
        let mut workers = self.workers.write().await;
        let mut marked = Vec::new();

        for worker in workers.values_mut() {
            if worker.status == WorkerStatus::Online && !worker.has_fresh_heartbeat(now, ttl) {
                worker.status = WorkerStatus::Offline;
                marked.push(worker.id.clone());
            }
        }

        if !marked.is_empty() {
            warn!("Marked {} worker(s) offline after missed heartbeats", marked.len());
        }
        marked
    }

    pub async fn get(&self, worker_id: &str) -> Option<Worker> {
        self.workers.read().await.get(worker_id).cloned()
    }

    pub async fn list_all(&self) -> Vec<Worker> {
        let mut all: Vec<Worker> = self.workers.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.last_heartbeat.cmp(&a.last_heartbeat).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub async fn stats(&self) -> RegistryStats {
        let now = Utc::now();
        let ttl = self.config.heartbeat_ttl();
        let workers = self.workers.read().await;
        let mut stats = RegistryStats {
            total_workers: workers.len(),
            ..Default::default()
        };

        let mut rate_sum = 0.0;
        let mut rated = 0usize;
        for worker in workers.values() {
            match worker.status {
                WorkerStatus::Online => stats.online += 1,
                WorkerStatus::Offline => stats.offline += 1,
                WorkerStatus::Error => stats.error += 1,
                WorkerStatus::Maintenance => stats.maintenance += 1,
            }
            if worker.is_available_at(now, ttl) {
                stats.available += 1;
            }
            stats.total_requests += worker.total_requests;
            if worker.total_requests > 0 {
                rate_sum += worker.success_rate();
                rated += 1;
            }
        }
        if rated > 0 {
            stats.average_success_rate = rate_sum / rated as f64;
        }
        stats
    }
}
