//! Per-node eviction counter shared by every pass in a descheduling cycle.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{Node, NodeName};

/// Evictions recorded per node during one descheduling cycle.
///
/// The counter is owned by the caller and handed to each balancing pass by
/// mutable reference. Passes only increment it, so a per-node cap holds
/// across all passes sharing one counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeEvictionCounts {
    counts: BTreeMap<NodeName, usize>,
}

impl NodeEvictionCounts {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counter with a zero entry for every node.
    pub fn for_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let counts = nodes.into_iter().map(|n| (n.name.clone(), 0)).collect();
        Self { counts }
    }

    /// Evictions recorded for a node (0 if never seen).
    pub fn get(&self, node: &NodeName) -> usize {
        self.counts.get(node).copied().unwrap_or(0)
    }

    /// Record one eviction on a node and return the new count.
    pub fn increment(&mut self, node: &NodeName) -> usize {
        let count = self.counts.entry(node.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns true if one more eviction on `node` would exceed `cap`.
    ///
    /// A cap of zero means unlimited.
    pub fn would_exceed(&self, node: &NodeName, cap: usize) -> bool {
        cap > 0 && self.get(node) + 1 > cap
    }

    /// Sum of the counts for the given nodes.
    pub fn total_for<'a>(&self, nodes: impl IntoIterator<Item = &'a Node>) -> usize {
        nodes.into_iter().map(|n| self.get(&n.name)).sum()
    }

    /// Sum of all counts.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Iterate `(node, count)` in node name order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeName, usize)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }
}
