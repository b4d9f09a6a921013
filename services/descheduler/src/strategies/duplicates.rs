//! Remove-duplicates strategy.
//!
//! Evicts instances of the same owner from nodes holding more than the
//! owner's per-node ceiling. Daemon-managed, mirrored, critical and (unless
//! enabled) local-storage instances never reach this strategy; the lister
//! excludes them.

use desched_balance::{BalanceOptions, DuplicateBalancer, PassReport};
use desched_cluster::{Evictor, InstanceLister, Node, NodeEvictionCounts};
use tracing::{debug, instrument};

use crate::policy::StrategyConfig;

/// Run the strategy if enabled; a disabled strategy does no work.
#[instrument(skip_all, fields(enabled = strategy.enabled))]
pub fn remove_duplicates<L, E>(
    strategy: &StrategyConfig,
    options: BalanceOptions,
    nodes: &[Node],
    lister: &L,
    evictor: &E,
    counts: &mut NodeEvictionCounts,
) -> PassReport
where
    L: InstanceLister + ?Sized,
    E: Evictor + ?Sized,
{
    if !strategy.enabled {
        debug!("Remove-duplicates strategy disabled");
        return PassReport::default();
    }

    DuplicateBalancer::new(options).run(nodes, lister, evictor, counts)
}
