//! Entity identity, lifecycle and the shared entity handle.
//!
//! An entity has two identities. The [`EntityKey`] is a process-local key
//! handed out by the store at `create` time; it orders and identifies the
//! entity before anything is durable. The `id` is the durable, globally
//! unique string assigned exactly once, when the entity's first insert commit
//! succeeds.
//!
//! [`Entity`] is a shared handle: clones refer to the same live state, and
//! reads through any clone observe every mutation made through the store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::mutation::Delta;
use crate::value::Value;

// ---------------------------------------------------------------------------
// EntityKey
// ---------------------------------------------------------------------------

/// Process-local entity key, unique within one store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(u64);

impl EntityKey {
    /// Construct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw u64 representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({})", self.0)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Where an entity is in its create / commit / delete lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Created in memory, never committed. No `id` yet.
    New,
    /// At least one commit containing this entity has succeeded.
    Persisted,
    /// `delete` was called; the deletion is not committed yet. Reads still
    /// return the prior properties and tags.
    PendingDelete,
    /// The deletion committed. Only `id` and type remain.
    Deleted,
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// A point-in-time image of an entity.
///
/// Records are what the durable sink persists, what the diff engine compares
/// and what watch callbacks receive. `BTreeMap`/`BTreeSet` give a stable,
/// lexicographic iteration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Durable id. Empty for an entity that has never been committed.
    pub id: String,
    pub entity_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl EntityRecord {
    /// Identity-only record of a deleted entity.
    pub fn tombstone(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            properties: BTreeMap::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns `true` if the record holds every tag in `tags`.
    pub fn has_all_tags<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        tags.into_iter().all(|t| self.tags.contains(t))
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// Mutable state guarded by the per-entity lock.
#[derive(Debug)]
pub(crate) struct EntityState {
    pub(crate) id: Option<String>,
    pub(crate) lifecycle: LifecycleState,
    pub(crate) properties: BTreeMap<String, Value>,
    pub(crate) tags: BTreeSet<String>,
    /// Image as of the last successful commit. `None` until the first insert
    /// commits and again after a delete commits.
    pub(crate) committed: Option<EntityRecord>,
    /// Deltas recorded since the last snapshot.
    pub(crate) pending: Vec<Delta>,
    /// Whether the entity currently sits in the mutation log's touch order.
    pub(crate) queued: bool,
}

#[derive(Debug)]
pub(crate) struct EntityCell {
    pub(crate) key: EntityKey,
    pub(crate) store_id: u64,
    pub(crate) entity_type: String,
    pub(crate) state: Mutex<EntityState>,
}

impl EntityCell {
    /// Live image of the entity. Caller holds the state lock.
    pub(crate) fn live_record(&self, state: &EntityState) -> EntityRecord {
        EntityRecord {
            id: state.id.clone().unwrap_or_default(),
            entity_type: self.entity_type.clone(),
            properties: state.properties.clone(),
            tags: state.tags.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Shared handle to a live entity.
///
/// All reads go through the per-entity lock and reflect the latest mutation.
/// Mutations go through [`EntityStore`](crate::store::EntityStore), which
/// also records them in the mutation log.
#[derive(Clone)]
pub struct Entity {
    pub(crate) cell: Arc<EntityCell>,
}

impl Entity {
    pub(crate) fn from_cell(cell: EntityCell) -> Self {
        Self {
            cell: Arc::new(cell),
        }
    }

    /// Process-local key. Stable for the handle's lifetime, never persisted.
    pub fn key(&self) -> EntityKey {
        self.cell.key
    }

    /// The entity type. Fixed at creation.
    pub fn entity_type(&self) -> &str {
        &self.cell.entity_type
    }

    /// Durable id, or `None` before the first successful commit.
    pub fn id(&self) -> Option<String> {
        self.cell.state.lock().id.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.cell.state.lock().lifecycle
    }

    /// Current value of a property.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.cell.state.lock().properties.get(name).cloned()
    }

    /// Returns `true` if the entity currently holds `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.cell.state.lock().tags.contains(tag)
    }

    /// Copy of the current property map.
    pub fn properties(&self) -> BTreeMap<String, Value> {
        self.cell.state.lock().properties.clone()
    }

    /// Copy of the current tag set.
    pub fn tags(&self) -> BTreeSet<String> {
        self.cell.state.lock().tags.clone()
    }

    /// Live image, including uncommitted mutations.
    pub fn record(&self) -> EntityRecord {
        let state = self.cell.state.lock();
        self.cell.live_record(&state)
    }

    /// Image as of the last successful commit.
    pub fn committed(&self) -> Option<EntityRecord> {
        self.cell.state.lock().committed.clone()
    }

    /// Returns `true` if both handles refer to the same entity.
    pub fn same_as(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.cell.state.lock();
        f.debug_struct("Entity")
            .field("key", &self.cell.key)
            .field("type", &self.cell.entity_type)
            .field("id", &state.id)
            .field("lifecycle", &state.lifecycle)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
