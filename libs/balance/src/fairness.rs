//! Fairness ceilings per owner.
//!
//! An owner with `total` instances spread over `node_count` nodes has a fair
//! share of `total / node_count` per node. A node holding more than the
//! rounded-up share is over-provisioned for that owner; everything at or
//! below it is left alone.

use std::collections::BTreeMap;

use desched_cluster::OwnerKey;

use crate::grouping::OwnerGroup;

/// Cluster-wide counts for one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OwnerStats {
    /// Instances of this owner across every node in the pass.
    pub total: usize,

    /// Nodes in the pass, including those holding none of this owner.
    pub node_count: usize,

    /// `total / node_count`.
    pub per_node: f64,

    /// Ceiling of `per_node`; the per-node threshold.
    pub max: usize,

    /// Floor of `per_node`.
    pub min: usize,

    /// `max - min`: 0 when evenly divisible, else 1.
    pub remainder: usize,
}

impl OwnerStats {
    /// Compute stats for `total` instances over `node_count` nodes.
    pub fn new(total: usize, node_count: usize) -> Self {
        let mut stats = Self {
            total,
            node_count,
            ..Self::default()
        };
        stats.recalculate();
        stats
    }

    /// Add instances observed on one node.
    pub fn add(&mut self, count: usize) {
        self.total += count;
        self.recalculate();
    }

    /// Change the node count.
    pub fn set_node_count(&mut self, node_count: usize) {
        self.node_count = node_count;
        self.recalculate();
    }

    /// Recompute the derived fields from `total` and `node_count`.
    ///
    /// With zero nodes every derived field is zero.
    pub fn recalculate(&mut self) {
        if self.node_count == 0 {
            self.per_node = 0.0;
            self.max = 0;
            self.min = 0;
            self.remainder = 0;
            return;
        }

        // Integer division keeps ceil/floor exact for any total.
        self.per_node = self.total as f64 / self.node_count as f64;
        self.min = self.total / self.node_count;
        self.max = self.total.div_ceil(self.node_count);
        self.remainder = self.max - self.min;
    }

    /// Instances above the ceiling on a node holding `on_node`.
    pub fn surplus(&self, on_node: usize) -> usize {
        on_node.saturating_sub(self.max)
    }

    /// Returns true if `total` divides evenly over the nodes.
    pub fn is_even(&self) -> bool {
        self.remainder == 0
    }
}

/// Per-owner stats for one pass.
#[derive(Debug, Clone, Default)]
pub struct FairnessTable {
    node_count: usize,
    stats: BTreeMap<OwnerKey, OwnerStats>,
}

impl FairnessTable {
    /// Create an empty table for a pass over `node_count` nodes.
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            stats: BTreeMap::new(),
        }
    }

    /// Add one node's owner groups to the running totals.
    pub fn observe(&mut self, group: &OwnerGroup) {
        for (key, instances) in group.iter() {
            let stats = self.stats.entry(key.clone()).or_default();
            stats.total += instances.len();
            stats.set_node_count(self.node_count);
        }
    }

    /// Stats for an owner, if it was observed.
    pub fn get(&self, key: &OwnerKey) -> Option<&OwnerStats> {
        self.stats.get(key)
    }

    /// Nodes in the pass.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of owners observed.
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Iterate `(key, stats)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&OwnerKey, &OwnerStats)> {
        self.stats.iter()
    }
}
