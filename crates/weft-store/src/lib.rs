//! Weft Store -- typed entities with mutable properties and tags.
//!
//! This crate is the bottom layer of the weft object graph:
//!
//! - [`entity`]: entity keys, lifecycle states, records and the shared
//!   [`Entity`](entity::Entity) handle.
//! - [`value`]: the closed set of scalar property values.
//! - [`mutation`]: the per-commit-cycle mutation log and its snapshots.
//! - [`store`]: [`EntityStore`](store::EntityStore), the thread-safe owner of
//!   every mutator.
//!
//! The commit pipeline and notifications live in `weft-graph` and
//! `weft-watch`; this crate knows nothing about durability beyond the
//! snapshot / restore / finalize boundary.
//!
//! # Quick Start
//!
//! ```
//! use std::collections::HashMap;
//! use weft_store::prelude::*;
//!
//! let store = EntityStore::new();
//! let e = store.create("T").unwrap();
//! store.set(&e, "P", 111).unwrap();
//!
//! // A commit pipeline drains the log, persists it, then finalizes.
//! let entries = store.snapshot();
//! let ids: HashMap<_, _> = entries
//!     .iter()
//!     .map(|entry| (entry.entity.key(), "0001".to_owned()))
//!     .collect();
//! store.finalize(&entries, &ids);
//!
//! assert_eq!(e.id().as_deref(), Some("0001"));
//! assert_eq!(e.state(), LifecycleState::Persisted);
//! ```

#![deny(unsafe_code)]

pub mod entity;
pub mod error;
pub mod mutation;
pub mod store;
pub mod value;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::entity::{Entity, EntityKey, EntityRecord, LifecycleState};
    pub use crate::error::{ErrorKind, StoreError, StoreResult};
    pub use crate::mutation::{Delta, MutationLog, SnapshotEntry};
    pub use crate::store::EntityStore;
    pub use crate::value::Value;
}
