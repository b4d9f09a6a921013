//! # desched-cluster
//!
//! Cluster data model and collaborator interfaces for the descheduler.
//!
//! ## Design Principles
//!
//! - Names are validated once at the boundary and typed afterwards
//! - Nodes and instances are plain values; nothing here performs I/O
//! - Listing, eviction and topology are traits implemented by callers
//! - The per-node eviction counter is passed explicitly, never global
//!
//! ## Owner identity
//!
//! Instances created by the same controller share an [`OwnerKey`]:
//! `{namespace}/{kind}/{name}`, e.g. `dev/ReplicaSet/web-7d9f`.
//! The key is assumed unique across the cluster.

mod counts;
mod error;
mod macros;
mod snapshot;
mod types;

pub use counts::NodeEvictionCounts;
pub use error::{EvictError, ListError, NameError};
pub use macros::{validate_name, MAX_NAME_LEN};
pub use snapshot::{ready_nodes, ClusterSnapshot, Evictor, InstanceLister, ListOptions};
pub use types::*;
