//! Error types shared by every layer of the graph.
//!
//! Each crate defines its own `thiserror` enum, but all of them classify into
//! the same small set of [`ErrorKind`]s so callers can branch on the category
//! of a failure without matching on crate-specific variants.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKey, LifecycleState};

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Coarse classification of every failure the graph can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input: a value of the wrong shape, an empty name, a
    /// non-finite float.
    ValidationFailure,
    /// The durable sink could not write (or read back) a transaction.
    DurabilityFailure,
    /// Reserved for multi-writer scenarios. Never produced by a single store.
    ConcurrencyConflict,
    /// The operation is not allowed in the entity's (or graph's) current state.
    InvalidOperation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ValidationFailure => "validation failure",
            ErrorKind::DurabilityFailure => "durability failure",
            ErrorKind::ConcurrencyConflict => "concurrency conflict",
            ErrorKind::InvalidOperation => "invalid operation",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors reported synchronously by entity-store mutators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A property value could not be accepted.
    #[error("invalid value for property '{name}': {details}")]
    InvalidValue { name: String, details: String },

    /// A property name or tag was empty.
    #[error("{what} must not be empty")]
    EmptyName { what: &'static str },

    /// The entity type given to `create` was empty.
    #[error("entity type must not be empty")]
    EmptyType,

    /// The entity is tombstoned or scheduled for deletion.
    #[error("entity {key} is {state:?} and cannot be mutated")]
    NotMutable {
        key: EntityKey,
        state: LifecycleState,
    },

    /// The entity handle was created by a different store.
    #[error("entity {key} belongs to another store")]
    ForeignEntity { key: EntityKey },

    /// A persisted record could not be materialized.
    #[error("persisted record '{id}' is invalid: {details}")]
    InvalidRecord { id: String, details: String },
}

impl StoreError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidValue { .. }
            | StoreError::EmptyName { .. }
            | StoreError::EmptyType
            | StoreError::InvalidRecord { .. } => ErrorKind::ValidationFailure,
            StoreError::NotMutable { .. } | StoreError::ForeignEntity { .. } => {
                ErrorKind::InvalidOperation
            }
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
