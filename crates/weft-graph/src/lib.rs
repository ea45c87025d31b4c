//! Weft Graph -- an embedded object graph with asynchronous durable commits
//! and filtered change notifications.
//!
//! This crate ties the lower layers together:
//!
//! - [`graph`]: [`Graph`](graph::Graph), the facade callers hold.
//! - [`coordinator`]: the single-writer commit worker and
//!   [`CommitReport`](coordinator::CommitReport).
//! - [`sink`]: the [`DurableSink`](sink::DurableSink) contract plus an
//!   in-memory and a JSON-file implementation.
//! - [`config`]: [`GraphConfig`](config::GraphConfig).
//! - [`ids`]: durable id generation.
//! - [`error`]: sink, commit and graph errors.
//! - [`telemetry`]: `tracing` subscriber setup.
//!
//! Entities and mutators come from `weft-store`; filters, delegates and
//! subscriptions from `weft-watch`. Both are re-exported through the
//! [`prelude`].

#![deny(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod ids;
pub mod sink;
pub mod telemetry;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::GraphConfig;
    pub use crate::coordinator::{CommitReport, CommitResult};
    pub use crate::error::{CommitError, GraphError, GraphResult, SinkError};
    pub use crate::graph::Graph;
    pub use crate::sink::{
        BatchOperation, DurableSink, JsonFileSink, LoadedState, MemorySink, MutationBatch,
    };
    pub use weft_store::prelude::*;
    pub use weft_watch::prelude::*;
}
