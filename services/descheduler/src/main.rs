//! desched descheduler
//!
//! Evicts instances of the same owner from nodes holding more than their
//! fair share, so the owner's controller can reschedule them elsewhere.

use std::sync::Arc;

use anyhow::{Context, Result};
use desched_descheduler::{
    config,
    policy::Policy,
    snapshot::SnapshotCluster,
    worker::{Descheduler, DeschedulerWorker},
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to DESCHED_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting desched descheduler");
    info!(
        snapshot = %config.snapshot_path.display(),
        dry_run = config.dry_run,
        max_pods_per_node = config.max_pods_per_node,
        evict_local_storage = config.evict_local_storage,
        interval_secs = config.interval.as_secs(),
        "Configuration loaded"
    );

    let policy = Policy::load_or_default(config.policy_path.as_deref())
        .context("failed to load descheduler policy")?;

    let cluster = match SnapshotCluster::load(&config.snapshot_path) {
        Ok(cluster) => Arc::new(cluster),
        Err(e) => {
            error!(error = %e, "Failed to load cluster snapshot");
            return Err(e.into());
        }
    };

    let descheduler = Descheduler::new(Arc::clone(&cluster), policy, config.balance_options());
    let worker = DeschedulerWorker::new(descheduler, config.interval);

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            if let Err(e) = (&mut worker_handle).await {
                error!(error = %e, "Descheduler worker panicked");
            }
        }
        result = &mut worker_handle => {
            if let Err(e) = result {
                error!(error = %e, "Descheduler worker panicked");
            }
        }
    }

    if let Some(path) = &config.snapshot_out {
        cluster
            .save(path)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        info!(path = %path.display(), "Wrote post-run snapshot");
    }

    info!("Descheduler shutdown complete");
    Ok(())
}
