//! Owner grouping: instances on one node keyed by owner identity.

use std::collections::BTreeMap;

use desched_cluster::{Instance, InstanceLister, ListError, ListOptions, Node, OwnerKey};

/// Instances on a single node, grouped by [`OwnerKey`].
///
/// Keys iterate in `OwnerKey` order. Within a key, instances keep the order
/// the lister returned them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerGroup {
    groups: BTreeMap<OwnerKey, Vec<Instance>>,
}

impl OwnerGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instance under `key`.
    pub fn insert(&mut self, key: OwnerKey, instance: Instance) {
        self.groups.entry(key).or_default().push(instance);
    }

    /// Instances under `key`, if any.
    pub fn get(&self, key: &OwnerKey) -> Option<&[Instance]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// Number of distinct owner keys.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if no instance has an owner.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterate `(key, instances)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&OwnerKey, &[Instance])> {
        self.groups.iter().map(|(k, v)| (k, v.as_slice()))
    }
}

impl FromIterator<Instance> for OwnerGroup {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        group_by_owner(iter)
    }
}

/// Group instances by owner.
///
/// An instance with several owner references lands in several groups; an
/// instance with none lands in no group.
pub fn group_by_owner<I>(instances: I) -> OwnerGroup
where
    I: IntoIterator<Item = Instance>,
{
    let mut group = OwnerGroup::new();
    for instance in instances {
        let keys: Vec<OwnerKey> = instance.owner_keys().collect();
        for key in keys {
            group.insert(key, instance.clone());
        }
    }
    group
}

/// List a node's eligible instances and group them.
///
/// A listing failure yields an empty group; the error is handed back so the
/// caller can report it.
pub fn list_owner_groups<L>(
    lister: &L,
    node: &Node,
    options: &ListOptions,
) -> (OwnerGroup, Option<ListError>)
where
    L: InstanceLister + ?Sized,
{
    match lister.list_evictable(node, options) {
        Ok(instances) => (group_by_owner(instances), None),
        Err(e) => (OwnerGroup::new(), Some(e)),
    }
}
