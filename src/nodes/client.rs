// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Compute worker HTTP contract
//!
//! `POST {endpoint}/resolve` with `{contestId, payload, seed}` returns an
//! [`Outcome`]; `GET {endpoint}/health` answers 200 when the worker is ready.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::registry::WorkerEndpoint;
use crate::outcome::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub contest_id: String,
    pub payload: serde_json::Value,
    pub seed: u64,
}

/// Failure of a single worker call. Recorded in the vote, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Worker returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn resolve(
        &self,
        endpoint: &WorkerEndpoint,
        request: &ResolveRequest,
    ) -> Result<Outcome, DispatchError>;

    /// Returns the HTTP status of the health endpoint.
    async fn health(&self, endpoint: &WorkerEndpoint) -> Result<u16, DispatchError>;
}

pub struct HttpComputeClient {
    client: Client,
    request_timeout: Duration,
}

impl HttpComputeClient {
    /// `request_timeout` is the transport ceiling; callers bound each call
    /// more tightly with their own timeout.
    pub fn new(request_timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DispatchError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            request_timeout,
        })
    }

    fn url(endpoint: &WorkerEndpoint, path: &str) -> String {
        format!("{}/{}", endpoint.url.trim_end_matches('/'), path)
    }

    fn map_transport(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            DispatchError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            DispatchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    async fn resolve(
        &self,
        endpoint: &WorkerEndpoint,
        request: &ResolveRequest,
    ) -> Result<Outcome, DispatchError> {
        let mut builder = self
            .client
            .post(Self::url(endpoint, "resolve"))
            .header("Accept", "application/json")
            .json(request);
        if let Some(key) = &endpoint.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| self.map_transport(e))?;
        serde_json::from_str::<Outcome>(&body)
            .map_err(|e| DispatchError::Malformed(format!("JSON parse error: {}", e)))
    }

    async fn health(&self, endpoint: &WorkerEndpoint) -> Result<u16, DispatchError> {
        let mut builder = self.client.get(Self::url(endpoint, "health"));
        if let Some(key) = &endpoint.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|e| self.map_transport(e))?;
        Ok(response.status().as_u16())
    }
}
