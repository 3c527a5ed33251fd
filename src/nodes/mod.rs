// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod client;
pub mod health;
pub mod registry;
pub mod selection;

pub use client::{ComputeClient, DispatchError, HttpComputeClient, ResolveRequest};

pub use health::{HealthConfig, HealthMonitor, HealthSweepReport, ProbeResult};

pub use registry::{
    HeartbeatRequest, RegistrationReceipt, RegistrationRequest, RegistryConfig, RegistryError,
    RegistryStats, Worker, WorkerEndpoint, WorkerRegistry, WorkerStatus,
};

pub use selection::{contest_seed, default_selection_size, select_weighted};
