//! agentmemd - long-running agent memory host
//!
//! Runs one periodic sync loop per configured agent and sweeps expired
//! working memory and snapshots on a fixed interval. On Ctrl-C every agent
//! gets a `pre-shutdown` snapshot before the loops are stopped.
//!
//! Configuration precedence: CLI flags, then `AGENTMEM_*` environment
//! variables (a `.env` file is honoured), then the TOML config file, then
//! built-in defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Level};

use agentmem_core::obs::emit_background_error;
use agentmem_core::{MemoryConfig, MemoryService, SnapshotType, SyncCoordinator};
use agentmem_state::{InMemoryRepository, MemoryRepository, SurrealMemoryRepository};

#[derive(Parser)]
#[command(name = "agentmemd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agent memory daemon: periodic sync and expiry sweeps", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "AGENTMEM_CONFIG")]
    config: Option<PathBuf>,

    /// Agent to keep in sync (repeatable, or comma-separated via env)
    #[arg(
        short,
        long = "agent",
        env = "AGENTMEM_AGENTS",
        value_delimiter = ',',
        required = true
    )]
    agents: Vec<String>,

    /// Backing store
    #[arg(long, value_enum, env = "AGENTMEM_STORE", default_value_t = StoreKind::Memory)]
    store: StoreKind,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Process-local, lost on exit
    Memory,
    /// SurrealDB: cloud (`SURREALDB_*`), `SURREALDB_URL`, or local surrealkv
    Surreal,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    agentmem_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;
    let repo = open_store(cli.store).await?;
    let service = MemoryService::with_config(repo, config.clone());

    let mut coordinators: Vec<(String, SyncCoordinator)> = Vec::new();
    for agent in &cli.agents {
        let coordinator = service.coordinator(&config);
        coordinator
            .start_periodic_sync(agent, config.sync_interval())
            .await
            .with_context(|| format!("Failed to start sync for agent {agent}"))?;
        coordinators.push((agent.clone(), coordinator));
    }

    info!(
        agents = ?cli.agents,
        store = ?cli.store,
        sync_interval_secs = config.sync_interval_secs,
        cleanup_interval_secs = config.cleanup_interval_secs,
        strategy = %config.conflict_strategy,
        "agentmemd started"
    );

    let mut sweep = tokio::time::interval(config.cleanup_interval());
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = sweep.tick() => {
                match service.cleanup_expired().await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "expired entries swept"),
                    Err(e) => emit_background_error("cleanup", "*", &e),
                }
                service.metrics().flush();
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                break;
            }
        }
    }

    info!("shutdown requested");
    shutdown(&service, &coordinators).await;
    service.metrics().flush();
    info!("agentmemd stopped");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<MemoryConfig> {
    let config = match path {
        Some(path) => MemoryConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MemoryConfig::default(),
    };
    config
        .with_env_overrides()
        .context("Invalid AGENTMEM_* environment override")
}

async fn open_store(kind: StoreKind) -> Result<Arc<dyn MemoryRepository>> {
    Ok(match kind {
        StoreKind::Memory => Arc::new(InMemoryRepository::new()),
        StoreKind::Surreal => Arc::new(
            SurrealMemoryRepository::from_env()
                .await
                .context("Failed to connect to agentmem database")?,
        ),
    })
}

/// Snapshot every agent, then stop all sync loops concurrently.
async fn shutdown(service: &MemoryService, coordinators: &[(String, SyncCoordinator)]) {
    for (agent, _) in coordinators {
        if let Err(e) = service
            .snapshots()
            .create(agent, SnapshotType::PreShutdown, "daemon shutdown")
            .await
        {
            warn!(agent_id = %agent, error = %e, "pre-shutdown snapshot failed");
        }
    }

    let stops = coordinators
        .iter()
        .map(|(_, coordinator)| coordinator.stop_periodic_sync());
    for (result, (agent, _)) in futures::future::join_all(stops)
        .await
        .into_iter()
        .zip(coordinators)
    {
        if let Err(e) = result {
            warn!(agent_id = %agent, error = %e, "failed to stop sync loop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_repeated_agents() {
        let cli = Cli::try_parse_from([
            "agentmemd",
            "--agent",
            "planner",
            "--agent",
            "coder",
            "--store",
            "surreal",
        ])
        .unwrap();
        assert_eq!(cli.agents, vec!["planner", "coder"]);
        assert_eq!(cli.store, StoreKind::Surreal);
        assert!(!cli.json);
    }

    #[test]
    fn cli_splits_comma_separated_agents() {
        let cli = Cli::try_parse_from(["agentmemd", "-a", "a,b,c"]).unwrap();
        assert_eq!(cli.agents.len(), 3);
        assert_eq!(cli.store, StoreKind::Memory);
    }

    #[test]
    fn default_config_without_file() {
        let config = load_config(None).unwrap();
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn shutdown_snapshots_and_stops_loops() {
        let service = MemoryService::new(open_store(StoreKind::Memory).await.unwrap());
        let config = MemoryConfig::default();
        let coordinator = service.coordinator(&config);
        coordinator
            .start_periodic_sync("planner", config.sync_interval())
            .await
            .unwrap();
        let coordinators = vec![("planner".to_string(), coordinator.clone())];

        shutdown(&service, &coordinators).await;

        assert!(!coordinator.is_running().await);
        let stats = service.memory_stats("planner").await.unwrap();
        assert_eq!(stats.snapshot_count, 1);
    }
}
