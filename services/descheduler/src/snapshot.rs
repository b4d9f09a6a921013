//! Cluster backed by a JSON snapshot file.
//!
//! The snapshot holds nodes and the eviction candidates placed on them.
//! Evictions remove instances from the in-memory state; dry-run evictions
//! only log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use desched_cluster::{
    ClusterSnapshot, EvictError, Evictor, Instance, InstanceLister, InstanceName, ListError,
    ListOptions, Namespace, Node, NodeName, OwnerRef,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Snapshot loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("instance {instance} references unknown node {node}")]
    UnknownNode { instance: String, node: String },

    #[error("instance {instance} is placed on both {first} and {second}")]
    DuplicateInstance {
        instance: String,
        first: String,
        second: String,
    },

    #[error("snapshot state lock poisoned")]
    Poisoned,
}

/// On-disk snapshot format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
}

/// An instance and its placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub namespace: Namespace,
    pub name: InstanceName,
    pub node: NodeName,

    #[serde(default)]
    pub owners: Vec<OwnerRef>,

    /// Bound to node-local storage.
    #[serde(default)]
    pub local_storage: bool,
}

impl InstanceRecord {
    fn to_instance(&self) -> Instance {
        Instance {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            owners: self.owners.clone(),
        }
    }

    fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    fn is(&self, instance: &Instance) -> bool {
        self.namespace == instance.namespace && self.name == instance.name
    }
}

type Placements = BTreeMap<NodeName, Vec<InstanceRecord>>;

/// In-memory cluster loaded from a [`SnapshotFile`].
#[derive(Debug)]
pub struct SnapshotCluster {
    nodes: Vec<Node>,
    placements: Mutex<Placements>,
}

impl SnapshotCluster {
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, SnapshotError> {
        let file: SnapshotFile = serde_json::from_str(contents)?;
        Self::from_file(file)
    }

    /// Build a cluster, checking every instance is placed exactly once on a
    /// known node.
    pub fn from_file(file: SnapshotFile) -> Result<Self, SnapshotError> {
        let mut placements: Placements = file
            .nodes
            .iter()
            .map(|n| (n.name.clone(), Vec::new()))
            .collect();
        let mut seen: BTreeMap<(Namespace, InstanceName), NodeName> = BTreeMap::new();

        for record in file.instances {
            let identity = (record.namespace.clone(), record.name.clone());
            if let Some(first) = seen.get(&identity) {
                return Err(SnapshotError::DuplicateInstance {
                    instance: record.qualified_name(),
                    first: first.to_string(),
                    second: record.node.to_string(),
                });
            }
            let Some(list) = placements.get_mut(&record.node) else {
                return Err(SnapshotError::UnknownNode {
                    instance: record.qualified_name(),
                    node: record.node.to_string(),
                });
            };
            seen.insert(identity, record.node.clone());
            list.push(record);
        }

        Ok(Self {
            nodes: file.nodes,
            placements: Mutex::new(placements),
        })
    }

    /// Write the current state as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(&self.to_file()?)?;
        std::fs::write(path, json).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Current state as a snapshot file.
    pub fn to_file(&self) -> Result<SnapshotFile, SnapshotError> {
        let placements = self.lock()?;
        Ok(SnapshotFile {
            nodes: self.nodes.clone(),
            instances: placements.values().flatten().cloned().collect(),
        })
    }

    /// Number of instances placed on a node.
    pub fn count_on(&self, node: &NodeName) -> Result<usize, SnapshotError> {
        Ok(self.lock()?.get(node).map_or(0, Vec::len))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Placements>, SnapshotError> {
        self.placements.lock().map_err(|_| {
            warn!("Snapshot state lock poisoned");
            SnapshotError::Poisoned
        })
    }
}

impl InstanceLister for SnapshotCluster {
    fn list_evictable(&self, node: &Node, options: &ListOptions) -> Result<Vec<Instance>, ListError> {
        let placements = self
            .lock()
            .map_err(|e| ListError::Unavailable(e.to_string()))?;
        let records = placements
            .get(&node.name)
            .ok_or_else(|| ListError::NodeNotFound(node.name.to_string()))?;

        Ok(records
            .iter()
            .filter(|r| options.include_local_storage || !r.local_storage)
            .map(InstanceRecord::to_instance)
            .collect())
    }
}

impl Evictor for SnapshotCluster {
    fn evict(&self, instance: &Instance, dry_run: bool) -> Result<(), EvictError> {
        let mut placements = self
            .lock()
            .map_err(|e| EvictError::Unavailable(e.to_string()))?;

        let location = placements.iter().find_map(|(node, records)| {
            records
                .iter()
                .position(|r| r.is(instance))
                .map(|idx| (node.clone(), idx))
        });
        let Some((node, idx)) = location else {
            return Err(EvictError::NotFound(instance.qualified_name()));
        };

        if dry_run {
            info!(
                node = %node,
                instance = %instance.qualified_name(),
                "[DRY RUN] Would evict instance"
            );
            return Ok(());
        }

        if let Some(records) = placements.get_mut(&node) {
            records.remove(idx);
        }
        info!(node = %node, instance = %instance.qualified_name(), "Evicted instance");
        Ok(())
    }
}

impl ClusterSnapshot for SnapshotCluster {
    fn nodes(&self) -> Vec<Node> {
        self.nodes.clone()
    }
}
