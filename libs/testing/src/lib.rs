//! Test support for descheduler crates.
//!
//! [`FakeCluster`] implements every collaborator trait over in-memory state
//! and records each eviction call, so tests can assert on both the count and
//! the exact instances removed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use desched_cluster::{
    ClusterSnapshot, EvictError, Evictor, Instance, InstanceLister, ListError, ListOptions, Node,
    NodeName, OwnerRef,
};

/// Default namespace used by the builders.
pub const DEFAULT_NAMESPACE: &str = "dev";

/// Default owner kind used by the builders.
pub const DEFAULT_OWNER_KIND: &str = "ReplicaSet";

/// Build a ready node. Panics on an invalid name.
pub fn node(name: &str) -> Node {
    Node::new(name.parse().expect("valid node name"))
}

/// Build an instance with no owners. Panics on invalid names.
pub fn instance(namespace: &str, name: &str) -> Instance {
    Instance::new(
        namespace.parse().expect("valid namespace"),
        name.parse().expect("valid instance name"),
    )
}

/// Build an instance owned by a single controller.
pub fn owned(namespace: &str, name: &str, kind: &str, owner: &str) -> Instance {
    instance(namespace, name).with_owner(OwnerRef::new(kind, owner))
}

/// Build `count` replicas of `owner` named `{owner}-{node}-{i}`.
pub fn replicas(namespace: &str, kind: &str, owner: &str, node: &str, count: usize) -> Vec<Instance> {
    (0..count)
        .map(|i| owned(namespace, &format!("{owner}-{node}-{i}"), kind, owner))
        .collect()
}

/// One recorded eviction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCall {
    pub instance: String,
    pub dry_run: bool,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct State {
    placements: BTreeMap<NodeName, Vec<Instance>>,
    calls: Vec<EvictionCall>,
}

/// In-memory cluster implementing lister, evictor and snapshot.
#[derive(Debug, Default)]
pub struct FakeCluster {
    nodes: Vec<Node>,
    unlistable: BTreeSet<NodeName>,
    rejecting: BTreeSet<String>,
    state: Mutex<State>,
}

impl FakeCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// `n1..nN` with `counts[i]` replicas of `dev/ReplicaSet/web` on node `i`.
    pub fn with_distribution(counts: &[usize]) -> Self {
        let mut cluster = Self::new();
        for (i, count) in counts.iter().enumerate() {
            let name = format!("n{}", i + 1);
            cluster = cluster.with_node(&name).with_instances(
                &name,
                replicas(DEFAULT_NAMESPACE, DEFAULT_OWNER_KIND, "web", &name, *count),
            );
        }
        cluster
    }

    /// Add a ready node.
    #[must_use]
    pub fn with_node(mut self, name: &str) -> Self {
        self.nodes.push(node(name));
        self
    }

    /// Add a node that is not ready.
    #[must_use]
    pub fn with_unready_node(mut self, name: &str) -> Self {
        let mut n = node(name);
        n.ready = false;
        self.nodes.push(n);
        self
    }

    /// Place instances on a node, after any already there.
    #[must_use]
    pub fn with_instances(self, node_name: &str, instances: Vec<Instance>) -> Self {
        {
            let mut state = self.lock();
            state
                .placements
                .entry(node_name.parse().expect("valid node name"))
                .or_default()
                .extend(instances);
        }
        self
    }

    /// Make listing on `node_name` fail.
    #[must_use]
    pub fn with_unlistable_node(mut self, node_name: &str) -> Self {
        self.unlistable
            .insert(node_name.parse().expect("valid node name"));
        self
    }

    /// Make evicting `{namespace}/{name}` fail with [`EvictError::Rejected`].
    #[must_use]
    pub fn rejecting(mut self, qualified_name: &str) -> Self {
        self.rejecting.insert(qualified_name.to_string());
        self
    }

    /// Every eviction call made so far, in order.
    pub fn calls(&self) -> Vec<EvictionCall> {
        self.lock().calls.clone()
    }

    /// Qualified names of successful evictions, in order.
    pub fn evicted(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.succeeded)
            .map(|c| c.instance.clone())
            .collect()
    }

    /// Instances currently placed on a node.
    pub fn instances_on(&self, node_name: &str) -> Vec<Instance> {
        let key: NodeName = node_name.parse().expect("valid node name");
        self.lock().placements.get(&key).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster lock poisoned")
    }
}

impl InstanceLister for FakeCluster {
    fn list_evictable(&self, node: &Node, _options: &ListOptions) -> Result<Vec<Instance>, ListError> {
        if self.unlistable.contains(&node.name) {
            return Err(ListError::Unavailable(format!("listing disabled for {}", node.name)));
        }
        if !self.nodes.iter().any(|n| n.name == node.name) {
            return Err(ListError::NodeNotFound(node.name.to_string()));
        }
        Ok(self
            .lock()
            .placements
            .get(&node.name)
            .cloned()
            .unwrap_or_default())
    }
}

impl Evictor for FakeCluster {
    fn evict(&self, instance: &Instance, dry_run: bool) -> Result<(), EvictError> {
        let qualified = instance.qualified_name();
        let mut state = self.lock();

        let result = if self.rejecting.contains(&qualified) {
            Err(EvictError::Rejected {
                instance: qualified.clone(),
                reason: "disruption budget".to_string(),
            })
        } else {
            let location = state.placements.iter().find_map(|(node, list)| {
                list.iter()
                    .position(|i| i.namespace == instance.namespace && i.name == instance.name)
                    .map(|idx| (node.clone(), idx))
            });
            match location {
                None => Err(EvictError::NotFound(qualified.clone())),
                Some(_) if dry_run => Ok(()),
                Some((node, idx)) => {
                    if let Some(list) = state.placements.get_mut(&node) {
                        list.remove(idx);
                    }
                    Ok(())
                }
            }
        };

        state.calls.push(EvictionCall {
            instance: qualified,
            dry_run,
            succeeded: result.is_ok(),
        });
        result
    }
}

impl ClusterSnapshot for FakeCluster {
    fn nodes(&self) -> Vec<Node> {
        self.nodes.clone()
    }
}
