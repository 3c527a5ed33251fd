// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use arena_node::{
    api::{start_server, AppState},
    config::ArenaConfig,
    consensus::{ConsensusArbiter, ContestResolver, Dispatcher, FallbackGenerator},
    ladder::{LadderService, Matchmaker},
    nodes::{HealthMonitor, HttpComputeClient, WorkerEndpoint, WorkerRegistry},
    schedule::ContestScheduler,
    settlement::SettlementEngine,
    storage::ArenaStore,
    version,
};
use clap::Parser;
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "arena-node", version = version::VERSION_NUMBER)]
#[command(about = "Contest resolution, ladder and settlement daemon")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ARENA_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the registration API
    #[arg(short, long)]
    bind: Option<String>,

    /// JSON snapshot of the arena state
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    info!("Starting {}", version::get_version_string());

    let mut config = ArenaConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(snapshot) = args.snapshot {
        config.server.snapshot_path = Some(snapshot);
    }

    let store = match &config.server.snapshot_path {
        Some(path) => {
            info!("Arena state persisted to {}", path.display());
            ArenaStore::open(path.clone())
                .await
                .with_context(|| format!("Failed to open snapshot {}", path.display()))?
        }
        None => {
            info!("No snapshot configured, arena state is in memory only");
            ArenaStore::in_memory()
        }
    };

    let ladder = LadderService::new(store.clone(), config.rating.clone());
    if let Some(path) = &config.season.entrants_path {
        ladder
            .import_entrants(path)
            .await
            .with_context(|| format!("Failed to import entrants from {}", path.display()))?;
    }
    if let Some(season) = ladder.bootstrap(&config.season, chrono::Utc::now()).await? {
        info!("Bootstrapped season {} ({})", season.name, season.id);
    }

    let registry = WorkerRegistry::with_store(config.registry.clone(), store.clone()).await;
    let transport_ceiling = config
        .consensus
        .request_timeout()
        .max(config.consensus.fallback_timeout())
        .max(config.health.timeout());
    let client = Arc::new(HttpComputeClient::new(transport_ceiling)?);

    let dispatcher = Dispatcher::new(
        registry.clone(),
        client.clone(),
        config.consensus.min_consensus_nodes,
        config.consensus.request_timeout(),
    );
    let arbiter = ConsensusArbiter::new(config.consensus.min_consensus_nodes);
    let fallback = FallbackGenerator::new(
        client.clone(),
        WorkerEndpoint {
            url: config.consensus.fallback_endpoint.clone(),
            api_key: config.consensus.fallback_api_key.clone(),
        },
        config.consensus.fallback_timeout(),
    );
    let resolver =
        Arc::new(ContestResolver::new(dispatcher, arbiter, fallback).with_vote_store(store.clone()));

    let settlement = SettlementEngine::new(
        store.clone(),
        config.rating.clone(),
        config.pool.clone(),
        config.settlement.clone(),
    );
    let scheduler = Arc::new(ContestScheduler::new(
        store.clone(),
        ladder,
        Matchmaker::new(config.matchmaker.clone()),
        resolver,
        settlement,
        config.schedule.clone(),
    ));
    let health = Arc::new(HealthMonitor::new(
        registry.clone(),
        client,
        config.health.clone(),
    ));

    let shutdown = CancellationToken::new();
    let health_handle = tokio::spawn(health.run(shutdown.clone()));
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind_addr))?;
    let server_handle = tokio::spawn(start_server(AppState { registry }, addr, shutdown.clone()));

    signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();

    if let Err(e) = health_handle.await {
        error!("Health monitor task failed: {}", e);
    }
    if let Err(e) = scheduler_handle.await {
        error!("Scheduler task failed: {}", e);
    }
    match server_handle.await {
        Ok(Err(e)) => error!("Registration API failed: {}", e),
        Err(e) => error!("Registration API task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Arena node stopped");
    Ok(())
}
