//! Descheduler background worker.
//!
//! Runs a descheduling cycle on a periodic interval, or once when the
//! interval is zero.

use std::sync::Arc;
use std::time::Duration;

use desched_balance::{BalanceOptions, PassReport};
use desched_cluster::{ready_nodes, ClusterSnapshot, Evictor, NodeEvictionCounts};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::policy::Policy;
use crate::strategies;

/// Outcome of one descheduling cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Ready nodes considered.
    pub nodes: usize,

    pub duplicates: PassReport,

    /// Per-node evictions shared by every strategy in the cycle.
    pub counts: NodeEvictionCounts,
}

/// Runs the enabled strategies against a cluster.
pub struct Descheduler<C> {
    cluster: Arc<C>,
    policy: Policy,
    options: BalanceOptions,
}

impl<C> Descheduler<C>
where
    C: ClusterSnapshot + Evictor,
{
    pub fn new(cluster: Arc<C>, policy: Policy, options: BalanceOptions) -> Self {
        Self {
            cluster,
            policy,
            options,
        }
    }

    pub fn cluster(&self) -> &Arc<C> {
        &self.cluster
    }

    /// Run one cycle: fresh counter, every enabled strategy in turn.
    #[instrument(skip(self))]
    pub fn run_cycle(&self) -> CycleReport {
        let cluster = self.cluster.as_ref();
        let nodes = ready_nodes(cluster);
        let mut counts = NodeEvictionCounts::for_nodes(&nodes);

        let duplicates = strategies::remove_duplicates(
            &self.policy.strategies.remove_duplicates,
            self.options,
            &nodes,
            cluster,
            cluster,
            &mut counts,
        );

        for (node, error) in &duplicates.list_failures {
            warn!(node = %node, error = %error, "Node skipped: listing failed");
        }

        CycleReport {
            nodes: nodes.len(),
            duplicates,
            counts,
        }
    }
}

/// Worker that runs descheduling cycles until shutdown.
pub struct DeschedulerWorker<C> {
    descheduler: Arc<Descheduler<C>>,
    interval: Duration,
}

impl<C> DeschedulerWorker<C>
where
    C: ClusterSnapshot + Evictor + 'static,
{
    pub fn new(descheduler: Descheduler<C>, interval: Duration) -> Self {
        Self {
            descheduler: Arc::new(descheduler),
            interval,
        }
    }

    /// Run until shutdown is signaled, or once if the interval is zero.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if self.interval.is_zero() {
            info!("Running single descheduling cycle");
            self.run_once().await;
            return;
        }

        info!(
            interval_secs = self.interval.as_secs(),
            "Starting descheduler worker"
        );

        // The first tick completes immediately, so a cycle runs at startup.
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Descheduler worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one cycle on the blocking pool; collaborator calls block.
    pub async fn run_once(&self) -> Option<CycleReport> {
        let descheduler = Arc::clone(&self.descheduler);
        match tokio::task::spawn_blocking(move || descheduler.run_cycle()).await {
            Ok(report) => {
                info!(
                    nodes = report.nodes,
                    evicted = report.duplicates.evicted,
                    failed = report.duplicates.failed(),
                    list_failures = report.duplicates.list_failures.len(),
                    "Descheduling cycle complete"
                );
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Descheduling cycle panicked");
                None
            }
        }
    }
}
