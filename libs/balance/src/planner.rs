//! Two-pass duplicate eviction planner.
//!
//! Pass 1 lists every node once, groups its instances by owner and folds the
//! group sizes into a [`FairnessTable`]. Pass 2 walks the nodes again in the
//! same order and, for each owner above its ceiling on a node, evicts the
//! surplus from the front of the listing order.
//!
//! The fairness table is complete before any eviction decision is made.

use std::collections::BTreeSet;

use desched_cluster::{
    Evictor, Instance, InstanceLister, ListError, ListOptions, Node, NodeEvictionCounts, NodeName,
    OwnerKey,
};
use tracing::{debug, info, instrument, warn};

use crate::fairness::FairnessTable;
use crate::grouping::{list_owner_groups, OwnerGroup};

/// Options for one balancing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceOptions {
    /// Forwarded to the evictor; the evictor must not change state.
    pub dry_run: bool,

    /// Maximum evictions per node across the cycle. Zero is unlimited.
    pub max_per_node: usize,

    /// Forwarded to the lister.
    pub list: ListOptions,
}

/// Instances selected for eviction for one owner on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub node: NodeName,
    pub owner: OwnerKey,

    /// Instances of the owner on the node.
    pub on_node: usize,

    /// The owner's per-node ceiling.
    pub ceiling: usize,

    /// Instances to evict, front of the listing order first.
    pub instances: Vec<Instance>,
}

/// Outcome for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub node: NodeName,

    /// Successful evictions in this pass.
    pub evicted: usize,

    /// Failed eviction attempts in this pass.
    pub failed: usize,

    /// The per-node cap stopped processing on this node.
    pub cap_reached: bool,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Sum of the shared counter over the pass's nodes after the pass.
    ///
    /// Includes evictions other passes recorded on the same counter.
    pub evicted: usize,

    /// Per-node outcomes, in pass order.
    pub nodes: Vec<NodeReport>,

    /// Nodes whose listing failed; they were treated as empty.
    pub list_failures: Vec<(NodeName, ListError)>,
}

impl PassReport {
    /// Successful evictions made by this pass alone.
    pub fn evicted_this_pass(&self) -> usize {
        self.nodes.iter().map(|n| n.evicted).sum()
    }

    /// Failed eviction attempts in this pass.
    pub fn failed(&self) -> usize {
        self.nodes.iter().map(|n| n.failed).sum()
    }
}

/// Pass-1 output: one owner group per node, plus the fairness table.
struct Aggregate {
    nodes: Vec<Node>,
    groups: Vec<OwnerGroup>,
    table: FairnessTable,
    list_failures: Vec<(NodeName, ListError)>,
}

/// Evicts instances of the same owner from nodes holding more than their
/// fair share.
#[derive(Debug, Clone, Default)]
pub struct DuplicateBalancer {
    options: BalanceOptions,
}

impl DuplicateBalancer {
    /// Create a balancer.
    pub fn new(options: BalanceOptions) -> Self {
        Self { options }
    }

    /// Run both passes, evicting through `evictor`.
    ///
    /// `counts` is incremented once per successful eviction and read to
    /// enforce [`BalanceOptions::max_per_node`].
    #[instrument(
        skip_all,
        fields(
            nodes = nodes.len(),
            dry_run = self.options.dry_run,
            max_per_node = self.options.max_per_node
        )
    )]
    pub fn run<L, E>(
        &self,
        nodes: &[Node],
        lister: &L,
        evictor: &E,
        counts: &mut NodeEvictionCounts,
    ) -> PassReport
    where
        L: InstanceLister + ?Sized,
        E: Evictor + ?Sized,
    {
        let aggregate = self.aggregate(nodes, lister);
        if aggregate.nodes.is_empty() {
            debug!("No nodes to balance");
            return PassReport::default();
        }

        let cap = self.options.max_per_node;
        let mut reports = Vec::with_capacity(aggregate.nodes.len());

        for (node, group) in aggregate.nodes.iter().zip(&aggregate.groups) {
            debug!(node = %node.name, "Processing node");
            let mut report = NodeReport {
                node: node.name.clone(),
                evicted: 0,
                failed: 0,
                cap_reached: false,
            };

            'owners: for (owner, instances) in group.iter() {
                let Some(to_evict) = surplus(&aggregate.table, owner, instances.len()) else {
                    continue;
                };
                debug!(node = %node.name, owner = %owner, to_evict, "Owner above ceiling");

                for instance in &instances[..to_evict] {
                    if counts.would_exceed(&node.name, cap) {
                        debug!(node = %node.name, max_per_node = cap, "Per-node eviction cap reached");
                        report.cap_reached = true;
                        break 'owners;
                    }

                    match evictor.evict(instance, self.options.dry_run) {
                        Ok(()) => {
                            counts.increment(&node.name);
                            report.evicted += 1;
                            debug!(
                                node = %node.name,
                                instance = %instance.qualified_name(),
                                "Evicted instance"
                            );
                        }
                        Err(e) => {
                            report.failed += 1;
                            info!(
                                node = %node.name,
                                instance = %instance.qualified_name(),
                                error = %e,
                                "Failed to evict instance"
                            );
                        }
                    }
                }
            }

            reports.push(report);
        }

        let evicted = counts.total_for(&aggregate.nodes);
        let report = PassReport {
            evicted,
            nodes: reports,
            list_failures: aggregate.list_failures,
        };

        info!(
            evicted = report.evicted,
            evicted_this_pass = report.evicted_this_pass(),
            failed = report.failed(),
            "Duplicate balancing pass complete"
        );

        report
    }

    /// Run both passes without evicting.
    ///
    /// Decisions assume every eviction succeeds and honour the per-node cap
    /// against the current `counts`, which are not modified.
    pub fn plan<L>(&self, nodes: &[Node], lister: &L, counts: &NodeEvictionCounts) -> Vec<Decision>
    where
        L: InstanceLister + ?Sized,
    {
        let aggregate = self.aggregate(nodes, lister);
        let cap = self.options.max_per_node;
        let mut decisions = Vec::new();

        for (node, group) in aggregate.nodes.iter().zip(&aggregate.groups) {
            let mut used = counts.get(&node.name);

            for (owner, instances) in group.iter() {
                let Some(mut to_evict) = surplus(&aggregate.table, owner, instances.len()) else {
                    continue;
                };
                if cap > 0 {
                    to_evict = to_evict.min(cap.saturating_sub(used));
                }
                if to_evict == 0 {
                    break;
                }

                used += to_evict;
                decisions.push(Decision {
                    node: node.name.clone(),
                    owner: owner.clone(),
                    on_node: instances.len(),
                    ceiling: aggregate.table.get(owner).map_or(0, |s| s.max),
                    instances: instances[..to_evict].to_vec(),
                });
            }
        }

        decisions
    }

    /// Pass 1: list and group every node, fold into the fairness table.
    fn aggregate<L>(&self, nodes: &[Node], lister: &L) -> Aggregate
    where
        L: InstanceLister + ?Sized,
    {
        let nodes = dedup_nodes(nodes);
        let mut table = FairnessTable::new(nodes.len());
        let mut groups = Vec::with_capacity(nodes.len());
        let mut list_failures = Vec::new();

        for node in &nodes {
            debug!(node = %node.name, "Listing node");
            let (group, error) = list_owner_groups(lister, node, &self.options.list);
            if let Some(e) = error {
                warn!(node = %node.name, error = %e, "Failed to list instances; treating node as empty");
                list_failures.push((node.name.clone(), e));
            }
            table.observe(&group);
            groups.push(group);
        }

        Aggregate {
            nodes,
            groups,
            table,
            list_failures,
        }
    }
}

/// Instances to evict for `owner` on a node holding `on_node`, if any.
///
/// `None` when the node is at or below the ceiling, or when evicting would
/// leave no instance of the owner behind.
fn surplus(table: &FairnessTable, owner: &OwnerKey, on_node: usize) -> Option<usize> {
    let stats = table.get(owner)?;
    let to_evict = stats.surplus(on_node);
    if to_evict == 0 || on_node - to_evict == 0 {
        return None;
    }
    Some(to_evict)
}

/// Drop repeated node names, keeping the first occurrence.
fn dedup_nodes(nodes: &[Node]) -> Vec<Node> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        if seen.insert(node.name.clone()) {
            out.push(node.clone());
        } else {
            warn!(node = %node.name, "Duplicate node in pass; ignoring repeat");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use desched_cluster::OwnerRef;
    use desched_testing::{instance, node, owned, replicas, FakeCluster};
    use rstest::rstest;

    fn run(cluster: &FakeCluster, max_per_node: usize) -> (PassReport, NodeEvictionCounts) {
        let balancer = DuplicateBalancer::new(BalanceOptions {
            max_per_node,
            ..BalanceOptions::default()
        });
        let nodes = cluster_nodes(cluster);
        let mut counts = NodeEvictionCounts::for_nodes(&nodes);
        let report = balancer.run(&nodes, cluster, cluster, &mut counts);
        (report, counts)
    }

    fn cluster_nodes(cluster: &FakeCluster) -> Vec<Node> {
        use desched_cluster::ClusterSnapshot;
        cluster.nodes()
    }

    #[rstest]
    #[case::no_pods(&[0], 0)]
    #[case::one_pod_one_node(&[1], 0)]
    #[case::one_pod_three_nodes(&[1, 0, 0], 0)]
    #[case::all_on_second_node(&[0, 8], 4)]
    #[case::both_nodes_hold_pods(&[3, 8], 2)]
    #[case::remainder(&[2, 6, 5], 1)]
    #[case::remainder_across_nodes(&[1, 1, 10], 6)]
    #[case::near_even(&[3, 4, 4], 0)]
    fn test_distribution(#[case] counts: &[usize], #[case] expected: usize) {
        let cluster = FakeCluster::with_distribution(counts);
        let (report, _) = run(&cluster, 0);
        assert_eq!(report.evicted, expected);
        assert_eq!(cluster.evicted().len(), expected);
    }

    #[test]
    fn test_surplus_trimmed_from_front() {
        let cluster = FakeCluster::with_distribution(&[0, 8]);
        run(&cluster, 0);

        assert_eq!(
            cluster.evicted(),
            vec!["dev/web-n2-0", "dev/web-n2-1", "dev/web-n2-2", "dev/web-n2-3"]
        );
        let left: Vec<_> = cluster
            .instances_on("n2")
            .iter()
            .map(|i| i.name.to_string())
            .collect();
        assert_eq!(left, vec!["web-n2-4", "web-n2-5", "web-n2-6", "web-n2-7"]);
    }

    #[test]
    fn test_node_at_ceiling_untouched() {
        // 3 + 8 over 2 nodes: ceiling 6. n1 is below the floor but untouched.
        let cluster = FakeCluster::with_distribution(&[3, 8]);
        let (report, counts) = run(&cluster, 0);

        assert_eq!(report.nodes[0].evicted, 0);
        assert_eq!(report.nodes[1].evicted, 2);
        assert_eq!(counts.get(&"n1".parse().unwrap()), 0);
        assert_eq!(cluster.instances_on("n1").len(), 3);
    }

    #[test]
    fn test_cap_limits_per_node() {
        let cluster = FakeCluster::with_distribution(&[1, 1, 10]);
        let (report, counts) = run(&cluster, 2);

        assert_eq!(report.evicted, 2);
        assert!(report.nodes[2].cap_reached);
        assert_eq!(counts.get(&"n3".parse().unwrap()), 2);
    }

    #[test]
    fn test_cap_abandons_remaining_owners_on_node() {
        let cluster = FakeCluster::new()
            .with_node("n1")
            .with_node("n2")
            .with_instances("n1", replicas("dev", "ReplicaSet", "alpha", "n1", 4))
            .with_instances("n1", replicas("dev", "ReplicaSet", "beta", "n1", 4));

        let (report, _) = run(&cluster, 1);

        // alpha (first in key order) takes the only slot; beta is never tried.
        assert_eq!(report.evicted, 1);
        assert_eq!(cluster.calls().len(), 1);
        assert_eq!(cluster.evicted(), vec!["dev/alpha-n1-0"]);
    }

    #[test]
    fn test_cap_counts_prior_passes() {
        let cluster = FakeCluster::with_distribution(&[0, 8]);
        let nodes = cluster_nodes(&cluster);
        let mut counts = NodeEvictionCounts::for_nodes(&nodes);
        counts.increment(&nodes[1].name);
        counts.increment(&nodes[1].name);

        let balancer = DuplicateBalancer::new(BalanceOptions {
            max_per_node: 3,
            ..BalanceOptions::default()
        });
        let report = balancer.run(&nodes, &cluster, &cluster, &mut counts);

        assert_eq!(report.evicted_this_pass(), 1);
        // The total includes the two evictions recorded before this pass.
        assert_eq!(report.evicted, 3);
        assert_eq!(counts.get(&nodes[1].name), 3);
    }

    #[test]
    fn test_failure_continues_with_next_instance() {
        let cluster = FakeCluster::with_distribution(&[0, 8]).rejecting("dev/web-n2-1");
        let (report, counts) = run(&cluster, 0);

        assert_eq!(report.nodes[1].failed, 1);
        assert_eq!(report.nodes[1].evicted, 3);
        assert_eq!(counts.get(&"n2".parse().unwrap()), 3);
        // The failed slot is not replaced by a later instance.
        assert_eq!(cluster.calls().len(), 4);
    }

    #[test]
    fn test_failure_does_not_consume_cap() {
        let cluster = FakeCluster::with_distribution(&[0, 8])
            .rejecting("dev/web-n2-0")
            .rejecting("dev/web-n2-1");
        let (report, _) = run(&cluster, 2);

        assert_eq!(report.nodes[1].failed, 2);
        assert_eq!(report.nodes[1].evicted, 2);
        assert!(!report.nodes[1].cap_reached);
    }

    #[test]
    fn test_listing_failure_treated_as_empty() {
        // n1 cannot be listed, so the ceiling is 8 / 2 = 4 from n2 alone.
        let cluster = FakeCluster::with_distribution(&[4, 8]).with_unlistable_node("n1");
        let (report, _) = run(&cluster, 0);

        assert_eq!(report.evicted, 4);
        assert_eq!(report.list_failures.len(), 1);
        assert_eq!(report.list_failures[0].0.as_str(), "n1");
        assert_eq!(cluster.instances_on("n1").len(), 4);
    }

    #[test]
    fn test_multi_owner_instance_second_attempt_fails() {
        let shared = || {
            instance("dev", "shared")
                .with_owner(OwnerRef::new("ReplicaSet", "a"))
                .with_owner(OwnerRef::new("ReplicaSet", "b"))
        };
        let cluster = FakeCluster::new()
            .with_node("n1")
            .with_node("n2")
            .with_instances("n1", vec![shared()])
            .with_instances("n1", replicas("dev", "ReplicaSet", "a", "n1", 2))
            .with_instances("n1", replicas("dev", "ReplicaSet", "b", "n1", 2));

        let (report, _) = run(&cluster, 0);

        // Each owner has 3 on n1 over 2 nodes: ceiling 2, surplus 1, and the
        // shared instance is first in both groups.
        let calls = cluster.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].succeeded);
        assert!(!calls[1].succeeded);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn test_dry_run_counts_without_removing() {
        let cluster = FakeCluster::with_distribution(&[0, 8]);
        let nodes = cluster_nodes(&cluster);
        let mut counts = NodeEvictionCounts::for_nodes(&nodes);
        let balancer = DuplicateBalancer::new(BalanceOptions {
            dry_run: true,
            ..BalanceOptions::default()
        });

        let report = balancer.run(&nodes, &cluster, &cluster, &mut counts);

        assert_eq!(report.evicted, 4);
        assert!(cluster.calls().iter().all(|c| c.dry_run));
        assert_eq!(cluster.instances_on("n2").len(), 8);
    }

    #[test]
    fn test_owners_balanced_independently() {
        let cluster = FakeCluster::new()
            .with_node("n1")
            .with_node("n2")
            .with_instances("n1", replicas("dev", "ReplicaSet", "web", "n1", 6))
            .with_instances("n2", replicas("test", "ReplicaSet", "web", "n2", 2));

        let (report, _) = run(&cluster, 0);

        // dev/web: 6 over 2 -> 3 evicted. test/web: 2 over 2 -> ceiling 1, 1 evicted.
        assert_eq!(report.evicted, 4);
    }

    #[test]
    fn test_unowned_instances_ignored() {
        let cluster = FakeCluster::new()
            .with_node("n1")
            .with_node("n2")
            .with_instances(
                "n1",
                (0..6).map(|i| instance("dev", &format!("bare-{i}"))).collect(),
            );

        let (report, _) = run(&cluster, 0);
        assert_eq!(report.evicted, 0);
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn test_empty_node_list() {
        let cluster = FakeCluster::with_distribution(&[0, 8]);
        let mut counts = NodeEvictionCounts::new();
        let report = DuplicateBalancer::default().run(&[], &cluster, &cluster, &mut counts);
        assert_eq!(report, PassReport::default());
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn test_duplicate_nodes_counted_once() {
        let cluster = FakeCluster::with_distribution(&[0, 8]);
        let nodes = vec![node("n1"), node("n2"), node("n2")];
        let mut counts = NodeEvictionCounts::new();

        let report = DuplicateBalancer::default().run(&nodes, &cluster, &cluster, &mut counts);

        assert_eq!(report.nodes.len(), 2);
        assert_eq!(report.evicted, 4);
    }

    #[test]
    fn test_plan_matches_run() {
        let cluster = FakeCluster::with_distribution(&[1, 1, 10]);
        let nodes = cluster_nodes(&cluster);
        let balancer = DuplicateBalancer::new(BalanceOptions {
            max_per_node: 4,
            ..BalanceOptions::default()
        });

        let counts = NodeEvictionCounts::for_nodes(&nodes);
        let decisions = balancer.plan(&nodes, &cluster, &counts);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].ceiling, 4);
        assert_eq!(decisions[0].on_node, 10);
        assert_eq!(decisions[0].instances.len(), 4);
        assert!(cluster.calls().is_empty());

        let mut counts = counts;
        balancer.run(&nodes, &cluster, &cluster, &mut counts);
        let planned: Vec<String> = decisions[0]
            .instances
            .iter()
            .map(Instance::qualified_name)
            .collect();
        assert_eq!(cluster.evicted(), planned);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let cluster = FakeCluster::new()
            .with_node("n1")
            .with_node("n2")
            .with_node("n3")
            .with_instances("n1", replicas("dev", "ReplicaSet", "web", "n1", 7))
            .with_instances("n1", replicas("dev", "StatefulSet", "db", "n1", 5))
            .with_instances("n2", vec![owned("dev", "x", "ReplicaSet", "web")]);
        let nodes = cluster_nodes(&cluster);
        let counts = NodeEvictionCounts::new();
        let balancer = DuplicateBalancer::default();

        let first = balancer.plan(&nodes, &cluster, &counts);
        let second = balancer.plan(&nodes, &cluster, &counts);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn distribution() -> impl Strategy<Value = Vec<usize>> {
            prop::collection::vec(0usize..12, 1..6)
        }

        proptest! {
            #[test]
            fn nodes_at_or_below_ceiling_untouched(counts in distribution()) {
                let cluster = FakeCluster::with_distribution(&counts);
                let (report, _) = run(&cluster, 0);

                let total: usize = counts.iter().sum();
                let ceiling = total.div_ceil(counts.len());
                for (i, count) in counts.iter().enumerate() {
                    let expected = count.saturating_sub(ceiling);
                    prop_assert_eq!(report.nodes[i].evicted, expected);
                }
            }

            #[test]
            fn divisible_totals_trim_to_exact_average(
                per_node in 0usize..8,
                nodes in 1usize..6,
                shift in 0usize..8,
            ) {
                // Move instances from n1 to n2; the total stays divisible.
                let mut counts = vec![per_node; nodes];
                let mut moved = 0;
                if nodes > 1 {
                    moved = shift.min(per_node);
                    counts[0] -= moved;
                    counts[1] += moved;
                }
                let cluster = FakeCluster::with_distribution(&counts);
                let (report, _) = run(&cluster, 0);

                // No slack above the average: exactly the moved instances go.
                prop_assert_eq!(report.evicted, moved);
            }

            #[test]
            fn cap_never_exceeded(counts in distribution(), cap in 1usize..4) {
                let cluster = FakeCluster::with_distribution(&counts);
                let (_, recorded) = run(&cluster, cap);
                for (_, count) in recorded.iter() {
                    prop_assert!(count <= cap);
                }
            }

            #[test]
            fn repeated_plans_agree(counts in distribution(), cap in 0usize..4) {
                let cluster = FakeCluster::with_distribution(&counts);
                let nodes = cluster_nodes(&cluster);
                let balancer = DuplicateBalancer::new(BalanceOptions {
                    max_per_node: cap,
                    ..BalanceOptions::default()
                });
                let counts = NodeEvictionCounts::new();
                prop_assert_eq!(
                    balancer.plan(&nodes, &cluster, &counts),
                    balancer.plan(&nodes, &cluster, &counts)
                );
            }
        }
    }
}
