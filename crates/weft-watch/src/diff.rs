//! Change diff engine.
//!
//! [`diff`] decomposes the entities touched by one commit into an ordered
//! sequence of [`ElementaryEvent`]s. The order is a contract watchers rely on:
//!
//! - Across entities: the order in which entities were first touched.
//! - Per entity: inserted -> property-added -> property-updated ->
//!   property-removed -> tag-added -> tag-removed -> deleted.
//! - Within one kind: lexicographic by property name or tag.
//!
//! The function is pure; it compares the `before` and `after` images and
//! ignores how the entity got from one to the other.
//!
//! # Example
//!
//! ```
//! use weft_store::prelude::*;
//! use weft_watch::diff::diff;
//! use weft_watch::event::{ChangedEntity, EventKind};
//!
//! let mut after = EntityRecord::tombstone("0001", "T");
//! after.properties.insert("P".to_owned(), Value::Integer(111));
//! after.tags.insert("G".to_owned());
//!
//! let events = diff(vec![ChangedEntity {
//!     key: EntityKey::from_raw(1),
//!     before: None,
//!     after,
//!     deleted: false,
//! }]);
//!
//! let kinds: Vec<EventKind> = events.iter().map(|e| e.kind()).collect();
//! assert_eq!(
//!     kinds,
//!     vec![EventKind::Inserted, EventKind::PropertyAdded, EventKind::TagAdded]
//! );
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::event::{ChangedEntity, ElementaryEvent};

/// Decompose a commit into elementary events.
pub fn diff(changes: Vec<ChangedEntity>) -> Vec<ElementaryEvent> {
    let mut events = Vec::new();
    for change in changes {
        diff_entity(Arc::new(change), &mut events);
    }
    events
}

fn diff_entity(entity: Arc<ChangedEntity>, out: &mut Vec<ElementaryEvent>) {
    let empty_props = BTreeMap::new();
    let empty_tags = BTreeSet::new();

    // Created and deleted before ever being committed: nothing was observable.
    if entity.before.is_none() && entity.deleted {
        return;
    }

    let (before_props, before_tags) = match &entity.before {
        Some(before) => (&before.properties, &before.tags),
        None => (&empty_props, &empty_tags),
    };
    let after_props = &entity.after.properties;
    let after_tags = &entity.after.tags;

    if entity.before.is_none() {
        out.push(ElementaryEvent::Inserted {
            entity: entity.clone(),
        });
    }

    for (name, value) in after_props {
        if !before_props.contains_key(name) {
            out.push(ElementaryEvent::PropertyAdded {
                entity: entity.clone(),
                name: name.clone(),
                value: value.clone(),
            });
        }
    }

    for (name, value) in after_props {
        if let Some(old) = before_props.get(name) {
            // Variant changes count: Integer(1) -> Float(1.0) is an update.
            if old != value {
                out.push(ElementaryEvent::PropertyUpdated {
                    entity: entity.clone(),
                    name: name.clone(),
                    old: old.clone(),
                    value: value.clone(),
                });
            }
        }
    }

    for (name, old) in before_props {
        if !after_props.contains_key(name) {
            out.push(ElementaryEvent::PropertyRemoved {
                entity: entity.clone(),
                name: name.clone(),
                value: old.clone(),
            });
        }
    }

    for tag in after_tags.difference(before_tags) {
        out.push(ElementaryEvent::TagAdded {
            entity: entity.clone(),
            tag: tag.clone(),
        });
    }

    for tag in before_tags.difference(after_tags) {
        out.push(ElementaryEvent::TagRemoved {
            entity: entity.clone(),
            tag: tag.clone(),
        });
    }

    if entity.deleted {
        out.push(ElementaryEvent::Deleted { entity });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
