//! Duplicate balancing primitives.
//!
//! This library decides how many instances of the same owner to evict from
//! each node so that an owner's instances spread evenly. Key concepts:
//!
//! - **Owner group**: instances on one node sharing an owner key.
//! - **Ceiling**: an owner's fair share per node, rounded up.
//! - **Surplus**: instances on a node above the ceiling; only surplus is evicted.
//!
//! # Invariants
//!
//! - Cluster-wide totals are complete before any eviction decision
//! - A node at or below an owner's ceiling is never touched for that owner
//! - The shared per-node counter is only incremented, and only on success
//! - Decisions are deterministic given the same inputs

mod fairness;
mod grouping;
mod planner;

pub use fairness::{FairnessTable, OwnerStats};
pub use grouping::{group_by_owner, list_owner_groups, OwnerGroup};
pub use planner::{BalanceOptions, Decision, DuplicateBalancer, NodeReport, PassReport};
