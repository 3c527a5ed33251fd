// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod contest;
pub mod scheduler;

pub use contest::{next_slot, ContestStatus, ScheduleError, ScheduledContest};
pub use scheduler::{ContestScheduler, ResolveSweep, ScheduleConfig, SweepReport};
