// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod http_server;

pub use errors::{ApiError, ErrorResponse};
pub use http_server::{router, start_server, AppState, HeartbeatResponse, NodesResponse, WorkerView};
