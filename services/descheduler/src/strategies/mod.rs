//! Descheduling strategies.
//!
//! Each strategy is one balancing pass over the ready nodes, gated by its
//! policy entry and sharing the cycle's per-node eviction counter.

mod duplicates;

pub use duplicates::remove_duplicates;
