//! Weft Watch -- change diffing and filtered notification delivery.
//!
//! - [`event`]: [`ElementaryEvent`](event::ElementaryEvent), the unit of
//!   observable change, and the [`ChangedEntity`](event::ChangedEntity)
//!   images it is computed from.
//! - [`diff`]: the pure diff engine.
//! - [`filter`]: [`WatchFilter`](filter::WatchFilter) predicates over type,
//!   tags and property names.
//! - [`delegate`]: per-kind callback slots.
//! - [`registry`]: subscriptions and their handles.
//! - [`dispatch`]: ordered, panic-contained delivery.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use weft_store::prelude::*;
//! use weft_watch::prelude::*;
//!
//! let registry = WatchRegistry::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//!
//! let sub = registry.subscribe(WatchFilter::new().for_types(["T"]));
//! sub.bind(WatchDelegate::new().on_inserted(move |_, _| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! }));
//! sub.activate();
//!
//! let events = diff(vec![ChangedEntity {
//!     key: EntityKey::from_raw(1),
//!     before: None,
//!     after: EntityRecord::tombstone("0001", "T"),
//!     deleted: false,
//! }]);
//! let info = CommitInfo { graph: "demo".to_owned(), sequence: 1 };
//! let report = registry.dispatch(&info, &events);
//!
//! assert_eq!(report.deliveries, 1);
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

#![deny(unsafe_code)]

pub mod delegate;
pub mod diff;
pub mod dispatch;
pub mod event;
pub mod filter;
pub mod registry;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::delegate::{CommitInfo, WatchDelegate};
    pub use crate::diff::diff;
    pub use crate::dispatch::DispatchReport;
    pub use crate::event::{ChangedEntity, ElementaryEvent, EventKind};
    pub use crate::filter::WatchFilter;
    pub use crate::registry::{Subscription, SubscriptionId, WatchRegistry};
}
