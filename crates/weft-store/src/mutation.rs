//! Mutation log: what changed since the last successful commit.
//!
//! Every mutator appends a [`Delta`] to the touched entity and, on the
//! entity's first touch in a commit cycle, appends the entity to the log's
//! touch order. A commit takes a [`snapshot`](MutationLog::snapshot) of the
//! log, which drains both.
//!
//! # Locking
//!
//! Mutators hold the *read* side of the commit gate plus the entity's own
//! lock, so mutators on different entities never contend. Snapshot, restore
//! and finalize hold the *write* side, which makes a snapshot an exact cut:
//! every mutation is either wholly inside it or wholly after it.
//!
//! Lock order is always gate -> entity -> touch order.

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityRecord, EntityState, LifecycleState};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// A single recorded change to one entity.
///
/// - **Set**: `old` is `None` when the property was absent.
/// - **Removal**: `old` carries the last value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Delta {
    Created,
    PropertySet {
        name: String,
        old: Option<Value>,
        new: Value,
    },
    PropertyRemoved {
        name: String,
        old: Value,
    },
    TagAdded(String),
    TagRemoved(String),
    Deleted,
}

// ---------------------------------------------------------------------------
// SnapshotEntry
// ---------------------------------------------------------------------------

/// One touched entity as captured by a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub entity: Entity,
    /// Deltas consumed by this snapshot, in the order they were made.
    pub deltas: Vec<Delta>,
    /// Image as of the last successful commit (`None` if never committed).
    pub before: Option<EntityRecord>,
    /// Live image at the moment of the snapshot.
    pub after: EntityRecord,
    /// `delete` was called and not yet committed.
    pub delete_requested: bool,
}

impl SnapshotEntry {
    /// Created and deleted without ever being committed: nothing to persist
    /// and nothing to notify.
    pub fn is_ephemeral(&self) -> bool {
        self.before.is_none() && self.delete_requested
    }

    /// First commit of this entity.
    pub fn is_insert(&self) -> bool {
        self.before.is_none() && !self.delete_requested
    }
}

// ---------------------------------------------------------------------------
// MutationLog
// ---------------------------------------------------------------------------

/// Touch-ordered record of entities with uncommitted deltas.
#[derive(Debug, Default)]
pub struct MutationLog {
    gate: RwLock<()>,
    order: Mutex<Vec<Entity>>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a mutation under the shared side of the commit gate and the
    /// entity lock. `op` returns the delta to record (if any) and a result.
    pub(crate) fn mutate<T>(
        &self,
        entity: &Entity,
        op: impl FnOnce(&mut EntityState) -> (Option<Delta>, T),
    ) -> T {
        let _gate = self.gate.read();
        let mut state = entity.cell.state.lock();
        let (delta, out) = op(&mut state);
        if let Some(delta) = delta {
            self.record(entity, &mut state, delta);
        }
        out
    }

    fn record(&self, entity: &Entity, state: &mut EntityState, delta: Delta) {
        tracing::trace!(entity_key = %entity.key(), ?delta, "recording delta");
        if !state.queued {
            state.queued = true;
            self.order.lock().push(entity.clone());
        }
        state.pending.push(delta);
    }

    /// Number of entities with uncommitted deltas.
    pub fn pending_entities(&self) -> usize {
        self.order.lock().len()
    }

    /// Take everything recorded so far, in first-touch order.
    pub fn snapshot(&self) -> Vec<SnapshotEntry> {
        let _gate = self.exclusive();
        let touched = std::mem::take(&mut *self.order.lock());

        touched
            .into_iter()
            .filter_map(|entity| {
                let mut state = entity.cell.state.lock();
                state.queued = false;
                let deltas = std::mem::take(&mut state.pending);
                if deltas.is_empty() {
                    return None;
                }
                let entry = SnapshotEntry {
                    before: state.committed.clone(),
                    after: entity.cell.live_record(&state),
                    delete_requested: state.lifecycle == LifecycleState::PendingDelete,
                    deltas,
                    entity: entity.clone(),
                };
                drop(state);
                Some(entry)
            })
            .collect()
    }

    /// Put a failed snapshot back so a later commit retries it.
    ///
    /// Restored entities go ahead of anything touched since the snapshot,
    /// and their restored deltas go ahead of any newer deltas.
    pub fn restore(&self, entries: Vec<SnapshotEntry>) {
        let _gate = self.exclusive();
        let mut order = self.order.lock();
        let newer = std::mem::take(&mut *order);

        for entry in entries {
            let mut state = entry.entity.cell.state.lock();
            let mut deltas = entry.deltas;
            deltas.append(&mut state.pending);
            state.pending = deltas;
            state.queued = true;
            drop(state);
            order.push(entry.entity);
        }
        for entity in newer {
            if !order.iter().any(|e| e.same_as(&entity)) {
                order.push(entity);
            }
        }
    }

    /// Exclusive side of the commit gate. Held while the store applies a
    /// successful commit so no mutation interleaves with finalization.
    pub(crate) fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }
}
