//! Collaborator interfaces.
//!
//! The balancing core never talks to a cluster directly. Callers provide:
//! - an [`InstanceLister`] returning the eviction candidates on a node
//! - an [`Evictor`] performing the removal
//! - a [`ClusterSnapshot`] exposing the ordered node list
//!
//! All three are synchronous; a removal call blocks until it succeeds or
//! fails and is never retried here.

use crate::{EvictError, Instance, ListError, Node};

/// Options forwarded to the instance lister.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Include instances bound to node-local storage.
    pub include_local_storage: bool,
}

/// Lists eviction candidates on a node.
///
/// Implementations are expected to have filtered out daemon-managed,
/// mirrored and critical-priority instances, and local-storage instances
/// unless [`ListOptions::include_local_storage`] is set.
pub trait InstanceLister: Send + Sync {
    /// List the eligible instances on `node`, in a stable order.
    fn list_evictable(&self, node: &Node, options: &ListOptions) -> Result<Vec<Instance>, ListError>;
}

/// Removes an instance from the cluster.
pub trait Evictor: Send + Sync {
    /// Evict `instance`. In dry-run mode the call must not change cluster state.
    fn evict(&self, instance: &Instance, dry_run: bool) -> Result<(), EvictError>;
}

/// Read access to cluster topology.
pub trait ClusterSnapshot: InstanceLister {
    /// All nodes, in a stable order.
    fn nodes(&self) -> Vec<Node>;
}

/// Nodes reporting ready, in snapshot order.
pub fn ready_nodes<S: ClusterSnapshot + ?Sized>(snapshot: &S) -> Vec<Node> {
    snapshot.nodes().into_iter().filter(|n| n.ready).collect()
}
