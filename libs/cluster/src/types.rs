//! Cluster object definitions.
//!
//! Nodes and instances are snapshots: they are built at the start of a
//! pass from whatever the listing collaborators return and never mutated.

use serde::{Deserialize, Serialize};

use crate::define_name;

// =============================================================================
// Names
// =============================================================================

define_name!(NodeName, "node");
define_name!(Namespace, "namespace");
define_name!(InstanceName, "instance");

// =============================================================================
// Nodes
// =============================================================================

/// Handle identifying a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub name: NodeName,

    /// Whether the node reports ready. Only used to filter the node list.
    #[serde(default = "default_ready")]
    pub ready: bool,
}

fn default_ready() -> bool {
    true
}

impl Node {
    /// Create a ready node.
    pub fn new(name: NodeName) -> Self {
        Self { name, ready: true }
    }
}

// =============================================================================
// Instances and owners
// =============================================================================

/// Controller reference on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Controller kind, e.g. `ReplicaSet`.
    pub kind: String,

    /// Controller name.
    pub name: String,
}

impl OwnerRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// A workload instance that is a candidate for eviction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    pub namespace: Namespace,
    pub name: InstanceName,

    /// Controller references. Empty means the instance is in no owner group.
    #[serde(default)]
    pub owners: Vec<OwnerRef>,
}

impl Instance {
    /// Create an instance with no owners.
    pub fn new(namespace: Namespace, name: InstanceName) -> Self {
        Self {
            namespace,
            name,
            owners: Vec::new(),
        }
    }

    /// Add an owner reference.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owners.push(owner);
        self
    }

    /// One key per owner reference, in reference order.
    pub fn owner_keys(&self) -> impl Iterator<Item = OwnerKey> + '_ {
        self.owners
            .iter()
            .map(|owner| OwnerKey::new(self.namespace.clone(), &owner.kind, &owner.name))
    }

    /// `{namespace}/{name}`, for logs.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Identity shared by instances of the same controller.
///
/// Ordering is namespace, then kind, then name; owner groups iterate in this
/// order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerKey {
    pub namespace: Namespace,
    pub kind: String,
    pub name: String,
}

impl OwnerKey {
    pub fn new(namespace: Namespace, kind: &str, name: &str) -> Self {
        Self {
            namespace,
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

// =============================================================================
// Tests
// =============================================================================
