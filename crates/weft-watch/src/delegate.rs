//! Per-kind callback slots bound to a subscription.
//!
//! A [`WatchDelegate`] holds one optional callback per [`EventKind`]
//! (`EventKind::PropertyAdded` etc.). Dispatch is an exhaustive match from
//! [`ElementaryEvent`] to the corresponding slot; an empty slot ignores the
//! event.
//!
//! Callbacks receive the post-commit record of the entity. For deletions
//! that record is the tombstone: `id` and type only.
//!
//! [`EventKind`]: crate::event::EventKind

use weft_store::entity::EntityRecord;
use weft_store::value::Value;

use crate::event::ElementaryEvent;

// ---------------------------------------------------------------------------
// CommitInfo
// ---------------------------------------------------------------------------

/// Which commit an event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Name of the graph that committed.
    pub graph: String,
    /// Commit sequence number, starting at 1.
    pub sequence: u64,
}

// ---------------------------------------------------------------------------
// WatchDelegate
// ---------------------------------------------------------------------------

pub type EntityCallback = Box<dyn Fn(&CommitInfo, &EntityRecord) + Send + Sync>;
pub type PropertyCallback = Box<dyn Fn(&CommitInfo, &EntityRecord, &str, &Value) + Send + Sync>;
pub type TagCallback = Box<dyn Fn(&CommitInfo, &EntityRecord, &str) + Send + Sync>;

/// Callback slots, one per elementary event kind.
///
/// ```
/// use weft_watch::delegate::WatchDelegate;
///
/// let delegate = WatchDelegate::new()
///     .on_inserted(|_info, entity| println!("inserted {}", entity.id))
///     .on_property_added(|_info, _entity, name, value| println!("{name} = {value}"));
/// assert!(delegate.is_bound_to_any());
/// ```
#[derive(Default)]
pub struct WatchDelegate {
    inserted: Option<EntityCallback>,
    deleted: Option<EntityCallback>,
    property_added: Option<PropertyCallback>,
    property_updated: Option<PropertyCallback>,
    property_removed: Option<PropertyCallback>,
    tag_added: Option<TagCallback>,
    tag_removed: Option<TagCallback>,
}

impl WatchDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_inserted(
        mut self,
        f: impl Fn(&CommitInfo, &EntityRecord) + Send + Sync + 'static,
    ) -> Self {
        self.inserted = Some(Box::new(f));
        self
    }

    pub fn on_deleted(
        mut self,
        f: impl Fn(&CommitInfo, &EntityRecord) + Send + Sync + 'static,
    ) -> Self {
        self.deleted = Some(Box::new(f));
        self
    }

    pub fn on_property_added(
        mut self,
        f: impl Fn(&CommitInfo, &EntityRecord, &str, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.property_added = Some(Box::new(f));
        self
    }

    /// The callback receives the new value.
    pub fn on_property_updated(
        mut self,
        f: impl Fn(&CommitInfo, &EntityRecord, &str, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.property_updated = Some(Box::new(f));
        self
    }

    /// The callback receives the last value the property held.
    pub fn on_property_removed(
        mut self,
        f: impl Fn(&CommitInfo, &EntityRecord, &str, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.property_removed = Some(Box::new(f));
        self
    }

    pub fn on_tag_added(
        mut self,
        f: impl Fn(&CommitInfo, &EntityRecord, &str) + Send + Sync + 'static,
    ) -> Self {
        self.tag_added = Some(Box::new(f));
        self
    }

    /// Fires for each tag the entity lost. A tag filter treats the removed
    /// tag as held for this event.
    pub fn on_tag_removed(
        mut self,
        f: impl Fn(&CommitInfo, &EntityRecord, &str) + Send + Sync + 'static,
    ) -> Self {
        self.tag_removed = Some(Box::new(f));
        self
    }

    pub fn is_bound_to_any(&self) -> bool {
        self.inserted.is_some()
            || self.deleted.is_some()
            || self.property_added.is_some()
            || self.property_updated.is_some()
            || self.property_removed.is_some()
            || self.tag_added.is_some()
            || self.tag_removed.is_some()
    }

    /// Invoke the slot for `event`. Returns `false` if the slot is empty.
    pub(crate) fn deliver(&self, info: &CommitInfo, event: &ElementaryEvent) -> bool {
        match event {
            ElementaryEvent::Inserted { entity } => call(&self.inserted, |f| f(info, &entity.after)),
            ElementaryEvent::Deleted { entity } => call(&self.deleted, |f| f(info, &entity.after)),
            ElementaryEvent::PropertyAdded {
                entity,
                name,
                value,
            } => call(&self.property_added, |f| f(info, &entity.after, name.as_str(), value)),
            ElementaryEvent::PropertyUpdated {
                entity,
                name,
                value,
                ..
            } => call(&self.property_updated, |f| {
                f(info, &entity.after, name.as_str(), value)
            }),
            ElementaryEvent::PropertyRemoved {
                entity,
                name,
                value,
            } => call(&self.property_removed, |f| {
                f(info, &entity.after, name.as_str(), value)
            }),
            ElementaryEvent::TagAdded { entity, tag } => {
                call(&self.tag_added, |f| f(info, &entity.after, tag.as_str()))
            }
            ElementaryEvent::TagRemoved { entity, tag } => {
                call(&self.tag_removed, |f| f(info, &entity.after, tag.as_str()))
            }
        }
    }
}

fn call<F: ?Sized>(slot: &Option<Box<F>>, invoke: impl FnOnce(&F)) -> bool {
    match slot {
        Some(f) => {
            invoke(&**f);
            true
        }
        None => false,
    }
}

impl std::fmt::Debug for WatchDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchDelegate")
            .field("inserted", &self.inserted.is_some())
            .field("deleted", &self.deleted.is_some())
            .field("property_added", &self.property_added.is_some())
            .field("property_updated", &self.property_updated.is_some())
            .field("property_removed", &self.property_removed.is_some())
            .field("tag_added", &self.tag_added.is_some())
            .field("tag_removed", &self.tag_removed.is_some())
            .finish()
    }
}
