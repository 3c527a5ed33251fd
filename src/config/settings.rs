// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration
//!
//! Every section has built-in defaults. A TOML file may override any subset
//! of them, and environment variables are applied last.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::betting::BettingConfig;
use crate::consensus::ConsensusConfig;
use crate::ladder::{MatchmakerConfig, RatingConfig, SeasonConfig};
use crate::nodes::{HealthConfig, RegistryConfig};
use crate::schedule::ScheduleConfig;
use crate::settlement::{PoolConfig, SettlementConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// No snapshot means the arena state lives in memory only.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            snapshot_path: None,
        }
    }
}

impl ServerConfig {
    pub fn with_env(self) -> Self {
        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or(self.bind_addr),
            snapshot_path: env::var("SNAPSHOT_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or(self.snapshot_path),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub health: HealthConfig,
    pub consensus: ConsensusConfig,
    pub rating: RatingConfig,
    pub season: SeasonConfig,
    pub matchmaker: MatchmakerConfig,
    pub betting: BettingConfig,
    pub pool: PoolConfig,
    pub settlement: SettlementConfig,
    pub schedule: ScheduleConfig,
}

impl ArenaConfig {
    /// Defaults overlaid with the environment, after loading `.env` if present.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::default().with_env()
    }

    /// Parses a TOML document. Missing sections and keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File (if any), then `.env`, then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let base = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        Ok(base.with_env())
    }

    pub fn with_env(self) -> Self {
        Self {
            server: self.server.with_env(),
            registry: self.registry.with_env(),
            health: self.health.with_env(),
            consensus: self.consensus.with_env(),
            rating: self.rating.with_env(),
            season: self.season.with_env(),
            matchmaker: self.matchmaker.with_env(),
            betting: self.betting.with_env(),
            pool: self.pool.with_env(),
            settlement: self.settlement.with_env(),
            schedule: self.schedule.with_env(),
        }
    }
}
