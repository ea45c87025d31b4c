//! Watch registry: the set of live subscriptions.
//!
//! [`WatchRegistry::subscribe`] returns a [`Subscription`] handle that owns
//! the registration. Dropping the handle, or calling
//! [`Subscription::unsubscribe`], removes it; the second removal is a no-op.
//!
//! A subscription starts *paused*. Bind a [`WatchDelegate`] and call
//! [`Subscription::activate`] to begin delivery.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::delegate::WatchDelegate;
use crate::filter::WatchFilter;

// ---------------------------------------------------------------------------
// SubscriptionId
// ---------------------------------------------------------------------------

/// Registry-unique subscription identifier. Never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw u64 representation.
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Registry-side state of one subscription, shared with its handle.
pub(crate) struct Slot {
    pub(crate) id: SubscriptionId,
    pub(crate) filter: WatchFilter,
    active: AtomicBool,
    removed: AtomicBool,
    delegate: RwLock<Option<Arc<WatchDelegate>>>,
}

impl Slot {
    /// Delegate to deliver to, if the subscription is live, active and bound.
    pub(crate) fn receiver(&self) -> Option<Arc<WatchDelegate>> {
        if self.removed.load(Ordering::Acquire) || !self.active.load(Ordering::Acquire) {
            return None;
        }
        self.delegate.read().clone()
    }
}

// ---------------------------------------------------------------------------
// WatchRegistry
// ---------------------------------------------------------------------------

struct RegistryInner {
    slots: RwLock<BTreeMap<SubscriptionId, Arc<Slot>>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.slots.write().remove(&id);
        match removed {
            Some(slot) => {
                slot.removed.store(true, Ordering::Release);
                debug!(subscription = %id, "subscription removed");
                true
            }
            None => false,
        }
    }
}

/// Registry of subscriptions. Clones share the same registry.
#[derive(Clone)]
pub struct WatchRegistry {
    inner: Arc<RegistryInner>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                slots: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a paused, unbound subscription.
    pub fn subscribe(&self, filter: WatchFilter) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(Slot {
            id,
            filter,
            active: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            delegate: RwLock::new(None),
        });
        self.inner.slots.write().insert(id, slot.clone());
        debug!(subscription = %id, filter = ?slot.filter, "subscription registered");
        Subscription {
            slot,
            registry: self.inner.clone(),
        }
    }

    /// Remove a subscription by id. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.remove(id)
    }

    /// Number of registered subscriptions, active or paused.
    pub fn len(&self) -> usize {
        self.inner.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered slots in subscription order. The registry lock is released
    /// before returning so callbacks may subscribe and unsubscribe freely.
    pub(crate) fn slots(&self) -> Vec<Arc<Slot>> {
        self.inner.slots.read().values().cloned().collect()
    }
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("subscriptions", &self.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle to a registered subscription. Unsubscribes on drop.
pub struct Subscription {
    slot: Arc<Slot>,
    registry: Arc<RegistryInner>,
}

impl Subscription {
    /// Registry id of this subscription.
    pub fn id(&self) -> SubscriptionId {
        self.slot.id
    }

    /// The filter fixed at subscription time.
    pub fn filter(&self) -> &WatchFilter {
        &self.slot.filter
    }

    /// Replace the bound delegate. Takes effect from the next delivered event.
    pub fn bind(&self, delegate: WatchDelegate) {
        *self.slot.delegate.write() = Some(Arc::new(delegate));
        trace!(subscription = %self.slot.id, "delegate bound");
    }

    /// Start delivering. Events of commits dispatched while paused are not
    /// replayed.
    pub fn activate(&self) {
        self.slot.active.store(true, Ordering::Release);
        trace!(subscription = %self.slot.id, "subscription activated");
    }

    /// Stop delivering until the next `activate`. Also applies to a dispatch
    /// already in progress.
    pub fn pause(&self) {
        self.slot.active.store(false, Ordering::Release);
        trace!(subscription = %self.slot.id, "subscription paused");
    }

    /// Returns `true` if the subscription is live and not paused.
    pub fn is_active(&self) -> bool {
        self.slot.active.load(Ordering::Acquire) && !self.is_removed()
    }

    /// Returns `true` once the subscription has been unsubscribed.
    pub fn is_removed(&self) -> bool {
        self.slot.removed.load(Ordering::Acquire)
    }

    /// Stop delivery and remove the registration. Returns `false` when the
    /// subscription had already been removed.
    pub fn unsubscribe(&self) -> bool {
        self.registry.remove(self.slot.id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.registry.remove(self.slot.id) {
            trace!(subscription = %self.slot.id, "subscription dropped");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.slot.id)
            .field("filter", &self.slot.filter)
            .field("active", &self.is_active())
            .field("removed", &self.is_removed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
