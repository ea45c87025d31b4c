//! Elementary events: the smallest observable unit of change in a commit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use weft_store::entity::{EntityKey, EntityRecord};
use weft_store::value::Value;

// ---------------------------------------------------------------------------
// ChangedEntity
// ---------------------------------------------------------------------------

/// One entity touched by a commit, with its images on both sides of it.
///
/// `after` is the post-commit record. For a deletion it is the tombstone
/// (identity only); `before` then still carries the last committed
/// properties and tags.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedEntity {
    pub key: EntityKey,
    pub before: Option<EntityRecord>,
    pub after: EntityRecord,
    pub deleted: bool,
}

impl ChangedEntity {
    pub fn entity_type(&self) -> &str {
        &self.after.entity_type
    }

    pub fn id(&self) -> &str {
        &self.after.id
    }

    /// Tags used when matching tag filters. A tombstone holds no tags, so
    /// for deletions the last committed tags stand in.
    pub fn match_tags(&self) -> &std::collections::BTreeSet<String> {
        match (&self.before, self.deleted) {
            (Some(before), true) => &before.tags,
            _ => &self.after.tags,
        }
    }
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Discriminant of [`ElementaryEvent`], in per-entity emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Inserted,
    PropertyAdded,
    PropertyUpdated,
    PropertyRemoved,
    TagAdded,
    TagRemoved,
    Deleted,
}

// ---------------------------------------------------------------------------
// ElementaryEvent
// ---------------------------------------------------------------------------

/// A single decomposed change.
///
/// Every variant carries the [`ChangedEntity`] it belongs to; events of the
/// same entity share one allocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementaryEvent {
    Inserted {
        entity: Arc<ChangedEntity>,
    },
    PropertyAdded {
        entity: Arc<ChangedEntity>,
        name: String,
        value: Value,
    },
    PropertyUpdated {
        entity: Arc<ChangedEntity>,
        name: String,
        old: Value,
        value: Value,
    },
    /// `value` is the last value the property held.
    PropertyRemoved {
        entity: Arc<ChangedEntity>,
        name: String,
        value: Value,
    },
    TagAdded {
        entity: Arc<ChangedEntity>,
        tag: String,
    },
    TagRemoved {
        entity: Arc<ChangedEntity>,
        tag: String,
    },
    Deleted {
        entity: Arc<ChangedEntity>,
    },
}

impl ElementaryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ElementaryEvent::Inserted { .. } => EventKind::Inserted,
            ElementaryEvent::PropertyAdded { .. } => EventKind::PropertyAdded,
            ElementaryEvent::PropertyUpdated { .. } => EventKind::PropertyUpdated,
            ElementaryEvent::PropertyRemoved { .. } => EventKind::PropertyRemoved,
            ElementaryEvent::TagAdded { .. } => EventKind::TagAdded,
            ElementaryEvent::TagRemoved { .. } => EventKind::TagRemoved,
            ElementaryEvent::Deleted { .. } => EventKind::Deleted,
        }
    }

    pub fn entity(&self) -> &Arc<ChangedEntity> {
        match self {
            ElementaryEvent::Inserted { entity }
            | ElementaryEvent::PropertyAdded { entity, .. }
            | ElementaryEvent::PropertyUpdated { entity, .. }
            | ElementaryEvent::PropertyRemoved { entity, .. }
            | ElementaryEvent::TagAdded { entity, .. }
            | ElementaryEvent::TagRemoved { entity, .. }
            | ElementaryEvent::Deleted { entity } => entity,
        }
    }

    /// The property name for property events.
    pub fn property(&self) -> Option<&str> {
        match self {
            ElementaryEvent::PropertyAdded { name, .. }
            | ElementaryEvent::PropertyUpdated { name, .. }
            | ElementaryEvent::PropertyRemoved { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The tag for tag events.
    pub fn tag(&self) -> Option<&str> {
        match self {
            ElementaryEvent::TagAdded { tag, .. } | ElementaryEvent::TagRemoved { tag, .. } => {
                Some(tag)
            }
            _ => None,
        }
    }
}
