//! Formation control-plane daemon entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use formation::adapters::cluster::HttpPlaneClientBuilder;
use formation::adapters::gateway::{GatewayConfig, HttpPlaneGateway};
use formation::adapters::store::InMemoryStore;
use formation::config::Config;
use formation::domain::ports::store::ResourceStore;
use formation::planes::{PlaneClientCache, PlaneLifecycle};
use formation::reconcilers::{register_all, ControllerDeps, WorkerCounts};
use formation::runtime::ControllerManager;
use formation::{telemetry, TemplateEngine};

/// Formation control-plane daemon.
#[derive(Debug, Parser)]
#[command(name = "formation", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "FORMATION_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
        config.validate().context("invalid log override")?;
    }

    let _log_guard = telemetry::init(&config.logging).context("failed to initialize logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), "formation starting");

    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryStore::new());
    let engine = Arc::new(TemplateEngine::with_capacities(
        config.caches.env_capacity,
        config.caches.program_capacity,
    ));

    let mut gateway_config = GatewayConfig::new(config.gateway.base_url.clone());
    gateway_config.timeout = Duration::from_secs(config.gateway.timeout_secs);
    let gateway =
        Arc::new(HttpPlaneGateway::new(gateway_config).context("failed to build gateway client")?);
    let lifecycle = Arc::new(PlaneLifecycle::new(gateway));
    let clients = Arc::new(PlaneClientCache::new(
        config.caches.client_key_version.clone(),
        Arc::new(HttpPlaneClientBuilder),
    ));

    let manager = Arc::new(ControllerManager::new(
        store,
        Duration::from_secs(config.relist_interval_secs),
    ));
    let deps = ControllerDeps {
        engine,
        clients,
        lifecycle,
        field_owner: config.field_owner.clone(),
        status_interval: Duration::from_secs(config.status_update_interval_secs),
        observability_policy: config.observability_policy,
        workers: WorkerCounts {
            planes: config.workers.planes,
            projects: config.workers.projects,
            components: config.workers.components,
            bindings: config.workers.bindings,
            env_settings: config.workers.env_settings,
            workflow_runs: config.workers.workflow_runs,
        },
    };
    register_all(&manager, &deps);

    // Ctrl-C flips the shutdown broadcast; in-flight reconciles observe it
    // at their next suspension point.
    let shutdown_manager = manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_manager.shutdown();
        }
    });

    manager.run().await.context("controller manager failed")?;
    info!("formation stopped");
    Ok(())
}
