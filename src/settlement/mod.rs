// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod manager;
pub mod payment_distribution;
pub mod types;

pub use manager::{refund_in, settle_in, SettlementEngine};
pub use payment_distribution::{distribute, PoolConfig, PoolDistribution, Stake};
pub use types::{RefundReport, SettlementConfig, SettlementError, SettlementReport};
