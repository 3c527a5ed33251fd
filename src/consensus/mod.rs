// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod arbiter;
pub mod dispatcher;
pub mod fallback;
pub mod resolver;
pub mod types;

pub use arbiter::{ConsensusArbiter, NoConsensus, Verdict};
pub use dispatcher::Dispatcher;
pub use fallback::FallbackGenerator;
pub use resolver::{ContestResolver, ContestTicket, ResolutionStrategy};
pub use types::{ConsensusConfig, Resolution, ResolutionError, ResolutionSource, Vote};
