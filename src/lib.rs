// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod betting;
pub mod config;
pub mod consensus;
pub mod ladder;
pub mod nodes;
pub mod outcome;
pub mod schedule;
pub mod settlement;
pub mod storage;
pub mod version;

pub use betting::{Bet, BetError, BettingDesk};
pub use config::ArenaConfig;
pub use consensus::{ContestResolver, ContestTicket, Resolution, ResolutionStrategy};
pub use ladder::{LadderService, Matchmaker};
pub use nodes::{ComputeClient, HealthMonitor, HttpComputeClient, WorkerRegistry};
pub use outcome::{Outcome, OutcomeValidator};
pub use schedule::{ContestScheduler, ContestStatus, ScheduledContest};
pub use settlement::{SettlementEngine, SettlementReport};
pub use storage::{ArenaState, ArenaStore};
