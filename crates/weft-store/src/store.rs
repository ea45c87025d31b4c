//! The in-memory entity store.
//!
//! [`EntityStore`] owns every mutator. Each call is individually atomic and
//! safe to make concurrently from any thread, on the same or different
//! entities; callers never serialize externally. Compound sequences such as
//! set-then-tag are *not* transactional across calls.
//!
//! Each mutator updates the live value immediately and records a [`Delta`]
//! in the [`MutationLog`]. Nothing becomes visible through
//! [`committed`](EntityStore::committed) or to watchers until a commit
//! succeeds and the commit pipeline calls [`finalize`](EntityStore::finalize).
//!
//! # Example
//!
//! ```
//! use weft_store::prelude::*;
//!
//! let store = EntityStore::new();
//! let action = store.create("T").unwrap();
//! store.set(&action, "P", 111).unwrap();
//! store.add_tag(&action, "G").unwrap();
//!
//! assert_eq!(action.get("P"), Some(Value::Integer(111)));
//! assert!(action.has_tag("G"));
//! assert_eq!(action.state(), LifecycleState::New);
//! assert_eq!(store.pending_entities(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::entity::{Entity, EntityCell, EntityKey, EntityRecord, EntityState, LifecycleState};
use crate::error::{StoreError, StoreResult};
use crate::mutation::{Delta, MutationLog, SnapshotEntry};
use crate::value::Value;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

struct StoreInner {
    id: u64,
    next_key: AtomicU64,
    log: MutationLog,
    /// Persisted, not-deleted entities by durable id.
    by_id: RwLock<HashMap<String, Entity>>,
}

/// Thread-safe store of live entities. Clones share the same store.
#[derive(Clone)]
pub struct EntityStore {
    inner: Arc<StoreInner>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                next_key: AtomicU64::new(1),
                log: MutationLog::new(),
                by_id: RwLock::new(HashMap::new()),
            }),
        }
    }

    fn allocate_cell(&self, entity_type: String, state: EntityState) -> Entity {
        let key = EntityKey::from_raw(self.inner.next_key.fetch_add(1, Ordering::Relaxed));
        Entity::from_cell(EntityCell {
            key,
            store_id: self.inner.id,
            entity_type,
            state: Mutex::new(state),
        })
    }

    // -- creation -----------------------------------------------------------

    /// Create a new, uncommitted entity of the given type.
    pub fn create(&self, entity_type: &str) -> StoreResult<Entity> {
        if entity_type.is_empty() {
            return Err(StoreError::EmptyType);
        }
        let entity = self.allocate_cell(
            entity_type.to_owned(),
            EntityState {
                id: None,
                lifecycle: LifecycleState::New,
                properties: BTreeMap::new(),
                tags: BTreeSet::new(),
                committed: None,
                pending: Vec::new(),
                queued: false,
            },
        );
        self.inner
            .log
            .mutate(&entity, |_| (Some(Delta::Created), ()));
        debug!(entity_key = %entity.key(), entity_type, "entity created");
        Ok(entity)
    }

    /// Materialize records read back from durable storage as persisted
    /// entities. Nothing is recorded in the mutation log.
    pub fn load(&self, records: Vec<EntityRecord>) -> StoreResult<Vec<Entity>> {
        let mut loaded = Vec::with_capacity(records.len());
        for record in records {
            if record.id.is_empty() || record.entity_type.is_empty() {
                return Err(StoreError::InvalidRecord {
                    id: record.id,
                    details: "id and type must be non-empty".to_owned(),
                });
            }
            for (name, value) in &record.properties {
                value.validate(name).map_err(|e| StoreError::InvalidRecord {
                    id: record.id.clone(),
                    details: e.to_string(),
                })?;
            }
            let entity = self.allocate_cell(
                record.entity_type.clone(),
                EntityState {
                    id: Some(record.id.clone()),
                    lifecycle: LifecycleState::Persisted,
                    properties: record.properties.clone(),
                    tags: record.tags.clone(),
                    committed: Some(record.clone()),
                    pending: Vec::new(),
                    queued: false,
                },
            );
            self.inner.by_id.write().insert(record.id, entity.clone());
            loaded.push(entity);
        }
        debug!(count = loaded.len(), "loaded persisted entities");
        Ok(loaded)
    }

    // -- mutators -----------------------------------------------------------

    fn check_owner(&self, entity: &Entity) -> StoreResult<()> {
        if entity.cell.store_id != self.inner.id {
            return Err(StoreError::ForeignEntity { key: entity.key() });
        }
        Ok(())
    }

    /// Run a mutator that requires the entity to be `New` or `Persisted`.
    fn mutate_live<T>(
        &self,
        entity: &Entity,
        op: impl FnOnce(&mut EntityState) -> (Option<Delta>, T),
    ) -> StoreResult<T> {
        self.check_owner(entity)?;
        self.inner.log.mutate(entity, |state| match state.lifecycle {
            LifecycleState::New | LifecycleState::Persisted => {
                let (delta, out) = op(state);
                (delta, Ok(out))
            }
            lifecycle @ (LifecycleState::PendingDelete | LifecycleState::Deleted) => {
                warn!(entity_key = %entity.key(), ?lifecycle, "mutation rejected");
                (
                    None,
                    Err(StoreError::NotMutable {
                        key: entity.key(),
                        state: lifecycle,
                    }),
                )
            }
        })
    }

    /// Set a property, returning the previous value. Setting the current
    /// value again records nothing.
    pub fn set(
        &self,
        entity: &Entity,
        name: &str,
        value: impl Into<Value>,
    ) -> StoreResult<Option<Value>> {
        non_empty("property name", name)?;
        let value = value.into();
        value.validate(name)?;
        self.mutate_live(entity, |state| {
            let old = state.properties.insert(name.to_owned(), value.clone());
            if old.as_ref() == Some(&value) {
                return (None, old);
            }
            let delta = Delta::PropertySet {
                name: name.to_owned(),
                old: old.clone(),
                new: value,
            };
            (Some(delta), old)
        })
    }

    /// Set a property from a dynamic JSON value. Non-scalar shapes are
    /// rejected as a validation failure.
    pub fn set_json(
        &self,
        entity: &Entity,
        name: &str,
        json: serde_json::Value,
    ) -> StoreResult<Option<Value>> {
        let value = Value::from_json(name, json)?;
        self.set(entity, name, value)
    }

    /// Remove a property, returning its last value.
    pub fn remove(&self, entity: &Entity, name: &str) -> StoreResult<Option<Value>> {
        non_empty("property name", name)?;
        self.mutate_live(entity, |state| match state.properties.remove(name) {
            Some(old) => {
                let delta = Delta::PropertyRemoved {
                    name: name.to_owned(),
                    old: old.clone(),
                };
                (Some(delta), Some(old))
            }
            None => (None, None),
        })
    }

    /// Add a tag. Returns `false` if the entity already had it.
    pub fn add_tag(&self, entity: &Entity, tag: &str) -> StoreResult<bool> {
        non_empty("tag", tag)?;
        self.mutate_live(entity, |state| {
            if state.tags.insert(tag.to_owned()) {
                (Some(Delta::TagAdded(tag.to_owned())), true)
            } else {
                (None, false)
            }
        })
    }

    /// Remove a tag. Returns `false` if the entity did not have it.
    pub fn remove_tag(&self, entity: &Entity, tag: &str) -> StoreResult<bool> {
        non_empty("tag", tag)?;
        self.mutate_live(entity, |state| {
            if state.tags.remove(tag) {
                (Some(Delta::TagRemoved(tag.to_owned())), true)
            } else {
                (None, false)
            }
        })
    }

    /// Schedule the entity for deletion. The entity moves to
    /// `PendingDelete`; properties and tags stay readable until the deletion
    /// commits. Deleting an entity that is already pending deletion is a
    /// no-op.
    pub fn delete(&self, entity: &Entity) -> StoreResult<()> {
        self.check_owner(entity)?;
        self.inner.log.mutate(entity, |state| match state.lifecycle {
            LifecycleState::New | LifecycleState::Persisted => {
                state.lifecycle = LifecycleState::PendingDelete;
                (Some(Delta::Deleted), Ok(()))
            }
            LifecycleState::PendingDelete => (None, Ok(())),
            LifecycleState::Deleted => (
                None,
                Err(StoreError::NotMutable {
                    key: entity.key(),
                    state: LifecycleState::Deleted,
                }),
            ),
        })
    }

    // -- commit boundary ----------------------------------------------------

    /// Number of entities with uncommitted deltas.
    pub fn pending_entities(&self) -> usize {
        self.inner.log.pending_entities()
    }

    /// Drain the mutation log. See [`MutationLog::snapshot`].
    pub fn snapshot(&self) -> Vec<SnapshotEntry> {
        self.inner.log.snapshot()
    }

    /// Re-queue a snapshot whose commit failed.
    pub fn restore(&self, entries: Vec<SnapshotEntry>) {
        self.inner.log.restore(entries);
    }

    /// Apply a successfully committed snapshot.
    ///
    /// `assigned_ids` maps each inserted entity's key to the durable id it
    /// was written under. Inserted and updated entities take their `after`
    /// image as the committed image; deleted entities become tombstones.
    pub fn finalize(&self, entries: &[SnapshotEntry], assigned_ids: &HashMap<EntityKey, String>) {
        let _gate = self.inner.log.exclusive();
        let mut by_id = self.inner.by_id.write();

        for entry in entries {
            let mut state = entry.entity.cell.state.lock();
            if entry.delete_requested {
                state.lifecycle = LifecycleState::Deleted;
                state.properties.clear();
                state.tags.clear();
                state.committed = None;
                if let Some(id) = &state.id {
                    by_id.remove(id);
                }
                continue;
            }

            if state.id.is_none() {
                if let Some(id) = assigned_ids.get(&entry.entity.key()) {
                    state.id = Some(id.clone());
                    by_id.insert(id.clone(), entry.entity.clone());
                }
            }
            let mut committed = entry.after.clone();
            committed.id = state.id.clone().unwrap_or_default();
            state.committed = Some(committed);
            if state.lifecycle == LifecycleState::New {
                state.lifecycle = LifecycleState::Persisted;
            }
        }
    }

    // -- lookups ------------------------------------------------------------

    /// Live handle of a persisted entity.
    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.inner.by_id.read().get(id).cloned()
    }

    /// Last committed image of a persisted entity.
    pub fn committed(&self, id: &str) -> Option<EntityRecord> {
        self.entity(id).and_then(|e| e.committed())
    }

    /// Number of persisted, not-deleted entities.
    pub fn persisted_count(&self) -> usize {
        self.inner.by_id.read().len()
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("id", &self.inner.id)
            .field("pending_entities", &self.pending_entities())
            .field("persisted", &self.persisted_count())
            .finish()
    }
}

fn non_empty(what: &'static str, name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::EmptyName { what });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
