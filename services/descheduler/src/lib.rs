//! desched descheduler library.
//!
//! This crate primarily ships a `descheduler` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod config;
pub mod policy;
pub mod snapshot;
pub mod strategies;
pub mod worker;
