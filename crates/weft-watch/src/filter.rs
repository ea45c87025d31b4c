//! Subscription predicates.
//!
//! A [`WatchFilter`] has three independent dimensions. Dimensions combine
//! with AND; values within one dimension combine with OR, except the tag
//! dimension, which requires the entity to hold *every* listed tag.
//!
//! | Dimension  | Empty means | Checked against |
//! |------------|-------------|-----------------|
//! | types      | any type    | entity type |
//! | tags       | no tag requirement, any tag event | entity tags; the changed tag for tag events |
//! | properties | any property | the changed name for property events |
//!
//! A tag-removed event counts its own tag as still held, so a filter on `G`
//! sees `G` being removed.
//!
//! # Example
//!
//! ```
//! use weft_watch::filter::WatchFilter;
//!
//! let filter = WatchFilter::new()
//!     .for_types(["T"])
//!     .has_tags(["G"])
//!     .where_properties(["P"]);
//! assert!(filter.accepts_type("T"));
//! assert!(!filter.accepts_type("U"));
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::event::ElementaryEvent;

/// Predicate over entity type, tags and property names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchFilter {
    pub types: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub properties: BTreeSet<String>,
}

impl WatchFilter {
    /// A filter that matches every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match entities of any of these types.
    pub fn for_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Match entities holding all of these tags, and only tag events for
    /// these tags.
    pub fn has_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Limit property events to these names. Other event kinds are not
    /// affected.
    pub fn where_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Returns `true` if the type dimension admits `entity_type`.
    pub fn accepts_type(&self, entity_type: &str) -> bool {
        self.types.is_empty() || self.types.contains(entity_type)
    }

    /// Returns `true` if the event passes all three dimensions.
    pub fn matches(&self, event: &ElementaryEvent) -> bool {
        let entity = event.entity();
        if !self.accepts_type(entity.entity_type()) {
            return false;
        }
        let held = entity.match_tags();
        let removed = match event {
            ElementaryEvent::TagRemoved { tag, .. } => Some(tag.as_str()),
            _ => None,
        };
        if !self
            .tags
            .iter()
            .all(|t| held.contains(t) || removed == Some(t.as_str()))
        {
            return false;
        }
        if let Some(name) = event.property() {
            return self.properties.is_empty() || self.properties.contains(name);
        }
        if let Some(tag) = event.tag() {
            return self.tags.is_empty() || self.tags.contains(tag);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::event::{ChangedEntity, EventKind};
    use weft_store::prelude::*;

    fn inserted(entity_type: &str, props: &[&str], tags: &[&str]) -> Vec<ElementaryEvent> {
        let mut after = EntityRecord::tombstone("id", entity_type);
        for p in props {
            after.properties.insert((*p).to_owned(), Value::Integer(1));
        }
        for t in tags {
            after.tags.insert((*t).to_owned());
        }
        diff(vec![ChangedEntity {
            key: EntityKey::from_raw(1),
            before: None,
            after,
            deleted: false,
        }])
    }

    fn matched_kinds(filter: &WatchFilter, events: &[ElementaryEvent]) -> Vec<EventKind> {
        events
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| e.kind())
            .collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let events = inserted("T", &["P", "Q"], &["G"]);
        assert_eq!(matched_kinds(&WatchFilter::new(), &events).len(), events.len());
    }

    #[test]
    fn type_dimension_is_or() {
        let events = inserted("T", &[], &[]);
        let f = WatchFilter::new().for_types(["U", "T"]);
        assert_eq!(matched_kinds(&f, &events), vec![EventKind::Inserted]);
        let f = WatchFilter::new().for_types(["U"]);
        assert!(matched_kinds(&f, &events).is_empty());
    }

    #[test]
    fn tag_dimension_requires_all_tags() {
        let events = inserted("T", &[], &["G", "H"]);
        let f = WatchFilter::new().has_tags(["G", "H"]);
        assert_eq!(
            matched_kinds(&f, &events),
            vec![EventKind::Inserted, EventKind::TagAdded, EventKind::TagAdded]
        );
        let f = WatchFilter::new().has_tags(["G", "X"]);
        assert!(matched_kinds(&f, &events).is_empty());
    }

    #[test]
    fn tag_events_limited_to_filtered_tags() {
        let events = inserted("T", &[], &["G", "H"]);
        let f = WatchFilter::new().has_tags(["G"]);
        let tags: Vec<&str> = events
            .iter()
            .filter(|e| f.matches(e))
            .filter_map(|e| e.tag())
            .collect();
        assert_eq!(tags, vec!["G"]);
    }

    #[test]
    fn property_dimension_limits_property_events_only() {
        let events = inserted("T", &["P", "Q"], &["G"]);
        let f = WatchFilter::new().where_properties(["P"]);
        assert_eq!(
            matched_kinds(&f, &events),
            vec![EventKind::Inserted, EventKind::PropertyAdded, EventKind::TagAdded]
        );
    }

    #[test]
    fn deleted_entity_matches_on_last_tags() {
        let mut before = EntityRecord::tombstone("id", "T");
        before.tags.insert("G".to_owned());
        let events = diff(vec![ChangedEntity {
            key: EntityKey::from_raw(1),
            before: Some(before),
            after: EntityRecord::tombstone("id", "T"),
            deleted: true,
        }]);
        let f = WatchFilter::new().for_types(["T"]).has_tags(["G"]);
        assert_eq!(
            matched_kinds(&f, &events),
            vec![EventKind::TagRemoved, EventKind::Deleted]
        );
    }

    #[test]
    fn removed_tag_is_held_for_its_own_event() {
        let mut before = EntityRecord::tombstone("id", "T");
        before.tags.insert("G".to_owned());
        before.tags.insert("H".to_owned());
        before.properties.insert("P".to_owned(), Value::Integer(1));
        let mut after = EntityRecord::tombstone("id", "T");
        after.tags.insert("H".to_owned());
        after.properties.insert("P".to_owned(), Value::Integer(2));
        let events = diff(vec![ChangedEntity {
            key: EntityKey::from_raw(1),
            before: Some(before),
            after,
            deleted: false,
        }]);

        let on_g = WatchFilter::new().has_tags(["G"]);
        assert_eq!(matched_kinds(&on_g, &events), vec![EventKind::TagRemoved]);
        let on_g_and_h = WatchFilter::new().has_tags(["G", "H"]);
        assert_eq!(matched_kinds(&on_g_and_h, &events), vec![EventKind::TagRemoved]);
        let on_h = WatchFilter::new().has_tags(["H"]);
        assert_eq!(matched_kinds(&on_h, &events), vec![EventKind::PropertyUpdated]);
    }
}
