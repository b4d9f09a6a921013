//! Error types for names and collaborator calls.

use thiserror::Error;

/// Errors that can occur when parsing or validating names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The name string is empty.
    #[error("{kind} name cannot be empty")]
    Empty { kind: &'static str },

    /// The name exceeds the maximum length.
    #[error("{kind} name is {len} bytes, maximum is {max}")]
    TooLong {
        kind: &'static str,
        len: usize,
        max: usize,
    },

    /// The name contains a character outside `[a-z0-9.-]`.
    #[error("{kind} name '{value}' contains invalid character '{ch}'")]
    InvalidCharacter {
        kind: &'static str,
        value: String,
        ch: char,
    },

    /// The name starts or ends with a non-alphanumeric character.
    #[error("{kind} name '{value}' must start and end with an alphanumeric character")]
    InvalidBoundary { kind: &'static str, value: String },
}

impl NameError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, NameError::Empty { .. })
    }
}

/// Errors returned by an [`InstanceLister`](crate::InstanceLister).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListError {
    /// The node is not known to the lister.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The listing source could not be reached.
    #[error("instance listing unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by an [`Evictor`](crate::Evictor).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvictError {
    /// The instance no longer exists (already evicted or deleted).
    #[error("instance not found: {0}")]
    NotFound(String),

    /// The eviction was refused, e.g. by a disruption budget.
    #[error("eviction rejected for {instance}: {reason}")]
    Rejected { instance: String, reason: String },

    /// The removal endpoint could not be reached.
    #[error("eviction unavailable: {0}")]
    Unavailable(String),
}

impl EvictError {
    /// Returns true if the instance was already gone.
    ///
    /// A multi-owner instance evicted under one owner key reports this on the
    /// second attempt.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EvictError::NotFound(_))
    }
}
