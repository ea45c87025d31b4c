//! Property tests for the diff engine.
//!
//! Random before/after images are diffed and the resulting event stream is
//! checked for ordering and for being a faithful description of the change.

use std::collections::BTreeMap;

use proptest::prelude::*;
use weft_store::prelude::*;
use weft_watch::prelude::*;

const NAMES: &[&str] = &["a", "b", "c", "d", "e"];

fn record_strategy() -> impl Strategy<Value = EntityRecord> {
    (
        prop::collection::btree_map(prop::sample::select(NAMES), 0i64..3, 0..5),
        prop::collection::btree_set(prop::sample::select(NAMES), 0..5),
    )
        .prop_map(|(props, tags)| {
            let mut r = EntityRecord::tombstone("id", "T");
            r.properties = props
                .into_iter()
                .map(|(k, v)| (k.to_owned(), Value::Integer(v)))
                .collect();
            r.tags = tags.into_iter().map(str::to_owned).collect();
            r
        })
}

#[derive(Debug, Clone)]
struct Change {
    before: Option<EntityRecord>,
    after: EntityRecord,
    deleted: bool,
}

fn change_strategy() -> impl Strategy<Value = Change> {
    (
        prop::option::of(record_strategy()),
        record_strategy(),
        prop::bool::weighted(0.2),
    )
        .prop_map(|(before, after, deleted)| Change {
            after: if deleted {
                EntityRecord::tombstone("id", "T")
            } else {
                after
            },
            before,
            deleted,
        })
}

fn to_changed(changes: &[Change]) -> Vec<ChangedEntity> {
    changes
        .iter()
        .enumerate()
        .map(|(i, c)| ChangedEntity {
            key: EntityKey::from_raw(i as u64 + 1),
            before: c.before.clone(),
            after: c.after.clone(),
            deleted: c.deleted,
        })
        .collect()
}

/// Apply one entity's events to its `before` image.
fn replay(before: Option<&EntityRecord>, events: &[&ElementaryEvent]) -> EntityRecord {
    let mut r = before
        .cloned()
        .unwrap_or_else(|| EntityRecord::tombstone("id", "T"));
    for event in events {
        match event {
            ElementaryEvent::PropertyAdded { name, value, .. }
            | ElementaryEvent::PropertyUpdated { name, value, .. } => {
                r.properties.insert(name.clone(), value.clone());
            }
            ElementaryEvent::PropertyRemoved { name, .. } => {
                r.properties.remove(name);
            }
            ElementaryEvent::TagAdded { tag, .. } => {
                r.tags.insert(tag.clone());
            }
            ElementaryEvent::TagRemoved { tag, .. } => {
                r.tags.remove(tag);
            }
            ElementaryEvent::Inserted { .. } | ElementaryEvent::Deleted { .. } => {}
        }
    }
    r
}

proptest! {
    #[test]
    fn per_entity_kinds_follow_fixed_order(changes in prop::collection::vec(change_strategy(), 1..8)) {
        let events = diff(to_changed(&changes));
        let mut per_entity: BTreeMap<u64, Vec<&ElementaryEvent>> = BTreeMap::new();
        for e in &events {
            per_entity.entry(e.entity().key.to_raw()).or_default().push(e);
        }
        for list in per_entity.values() {
            for pair in list.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                prop_assert!(a.kind() <= b.kind(), "{:?} before {:?}", a.kind(), b.kind());
                if a.kind() == b.kind() {
                    let an = a.property().or(a.tag());
                    let bn = b.property().or(b.tag());
                    prop_assert!(an < bn, "names out of order: {:?} {:?}", an, bn);
                }
            }
        }
    }

    #[test]
    fn entities_appear_in_input_order(changes in prop::collection::vec(change_strategy(), 1..8)) {
        let events = diff(to_changed(&changes));
        let mut seen: Vec<u64> = Vec::new();
        for e in &events {
            let key = e.entity().key.to_raw();
            if seen.last() != Some(&key) {
                prop_assert!(!seen.contains(&key), "entity {} interleaved", key);
                seen.push(key);
            }
        }
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        prop_assert_eq!(seen, sorted);
    }

    #[test]
    fn replaying_events_reproduces_after_image(changes in prop::collection::vec(change_strategy(), 1..8)) {
        let changed = to_changed(&changes);
        let events = diff(changed.clone());
        for c in &changed {
            if c.before.is_none() && c.deleted {
                prop_assert!(events.iter().all(|e| e.entity().key != c.key));
                continue;
            }
            let mine: Vec<&ElementaryEvent> =
                events.iter().filter(|e| e.entity().key == c.key).collect();
            let replayed = replay(c.before.as_ref(), &mine);
            prop_assert_eq!(&replayed.properties, &c.after.properties);
            prop_assert_eq!(&replayed.tags, &c.after.tags);

            let inserted = mine.iter().filter(|e| e.kind() == EventKind::Inserted).count();
            let deleted = mine.iter().filter(|e| e.kind() == EventKind::Deleted).count();
            prop_assert_eq!(inserted, usize::from(c.before.is_none()));
            prop_assert_eq!(deleted, usize::from(c.deleted));
        }
    }
}
