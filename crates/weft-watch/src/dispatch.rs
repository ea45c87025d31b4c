//! Notification dispatcher.
//!
//! Delivers the events of one commit, in order, to every active subscription
//! whose filter matches. Each subscriber therefore observes an entity's
//! events in diff order. A panicking callback is contained: it is logged,
//! counted in the [`DispatchReport`] and delivery continues.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::delegate::CommitInfo;
use crate::event::ElementaryEvent;
use crate::registry::WatchRegistry;

/// Delivery counters for one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Events offered to the registry.
    pub events: usize,
    /// Callbacks invoked, including ones that panicked.
    pub deliveries: usize,
    /// Callbacks that panicked.
    pub failures: usize,
}

impl WatchRegistry {
    /// Deliver `events` to matching subscriptions.
    ///
    /// The subscription set is captured once per call; a subscription added
    /// by a callback sees events from the next commit onwards. Activation and
    /// removal are re-checked before every delivery, so pausing or
    /// unsubscribing from inside a callback takes effect immediately.
    pub fn dispatch(&self, info: &CommitInfo, events: &[ElementaryEvent]) -> DispatchReport {
        let mut report = DispatchReport {
            events: events.len(),
            ..DispatchReport::default()
        };
        if events.is_empty() {
            return report;
        }

        let slots = self.slots();
        for event in events {
            for slot in &slots {
                if !slot.filter.matches(event) {
                    continue;
                }
                let Some(delegate) = slot.receiver() else {
                    continue;
                };
                let outcome = catch_unwind(AssertUnwindSafe(|| delegate.deliver(info, event)));
                match outcome {
                    Ok(true) => {
                        report.deliveries += 1;
                        trace!(
                            subscription = %slot.id,
                            sequence = info.sequence,
                            kind = ?event.kind(),
                            entity_id = event.entity().id(),
                            "event delivered"
                        );
                    }
                    Ok(false) => {}
                    Err(panic) => {
                        report.deliveries += 1;
                        report.failures += 1;
                        error!(
                            subscription = %slot.id,
                            sequence = info.sequence,
                            kind = ?event.kind(),
                            message = panic_message(panic.as_ref()),
                            "watch callback panicked"
                        );
                    }
                }
            }
        }
        report
    }
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
