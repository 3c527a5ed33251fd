// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::errors::ApiError;
use crate::nodes::{
    HeartbeatRequest, RegistrationReceipt, RegistrationRequest, RegistryStats, Worker,
    WorkerRegistry, WorkerStatus,
};
use crate::version;

#[derive(Clone)]
pub struct AppState {
    pub registry: WorkerRegistry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub current_load: u32,
}

/// Public view of a worker. Credentials are never returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerView {
    pub id: String,
    pub name: String,
    pub endpoint: String,
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

impl From<Worker> for WorkerView {
    fn from(worker: Worker) -> Self {
        Self {
            id: worker.id,
            name: worker.name,
            endpoint: worker.endpoint,
            status: worker.status,
            weight: worker.weight,
            max_concurrent: worker.max_concurrent,
            current_load: worker.current_load,
            total_requests: worker.total_requests,
            successful_requests: worker.successful_requests,
            avg_response_time_ms: worker.avg_response_time_ms,
            last_heartbeat: worker.last_heartbeat,
            registered_at: worker.registered_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesResponse {
    pub workers: Vec<WorkerView>,
    pub stats: RegistryStats,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/nodes", get(list_nodes_handler))
        .route("/nodes/register", post(register_handler))
        .route("/nodes/heartbeat", post(heartbeat_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Registration API listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": version::VERSION_NUMBER }))
}

async fn version_handler() -> Json<serde_json::Value> {
    Json(version::get_version_info())
}

async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<RegistrationReceipt>, ApiError> {
    let receipt = state.registry.register(request).await?;
    Ok(Json(receipt))
}

async fn heartbeat_handler(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let worker = state
        .registry
        .heartbeat(&request.worker_id, request.current_load)
        .await?;
    Ok(Json(HeartbeatResponse {
        worker_id: worker.id,
        status: worker.status,
        current_load: worker.current_load,
    }))
}

async fn list_nodes_handler(State(state): State<AppState>) -> Json<NodesResponse> {
    Json(NodesResponse {
        workers: state
            .registry
            .list_all()
            .await
            .into_iter()
            .map(WorkerView::from)
            .collect(),
        stats: state.registry.stats().await,
    })
}
