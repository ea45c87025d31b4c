//! Property tests for the mutation log.
//!
//! Random sequences of store mutations, interleaved with commits and failed
//! commits, must keep two invariants:
//!
//! - Replaying a snapshot entry's deltas on top of its `before` image yields
//!   exactly its `after` image.
//! - A durable id, once assigned, never changes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use proptest::prelude::*;
use weft_store::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Create,
    Set(usize, u8, i64),
    Remove(usize, u8),
    AddTag(usize, u8),
    RemoveTag(usize, u8),
    Delete(usize),
    Commit,
    FailedCommit,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Create),
        4 => (0..8usize, 0..4u8, -5..5i64).prop_map(|(e, p, v)| Op::Set(e, p, v)),
        2 => (0..8usize, 0..4u8).prop_map(|(e, p)| Op::Remove(e, p)),
        2 => (0..8usize, 0..3u8).prop_map(|(e, t)| Op::AddTag(e, t)),
        1 => (0..8usize, 0..3u8).prop_map(|(e, t)| Op::RemoveTag(e, t)),
        1 => (0..8usize).prop_map(Op::Delete),
        1 => Just(Op::Commit),
        1 => Just(Op::FailedCommit),
    ]
}

fn replay(entry: &SnapshotEntry) -> (BTreeMap<String, Value>, BTreeSet<String>) {
    let (mut props, mut tags) = match &entry.before {
        Some(before) => (before.properties.clone(), before.tags.clone()),
        None => (BTreeMap::new(), BTreeSet::new()),
    };
    for delta in &entry.deltas {
        match delta {
            Delta::PropertySet { name, new, .. } => {
                props.insert(name.clone(), new.clone());
            }
            Delta::PropertyRemoved { name, .. } => {
                props.remove(name);
            }
            Delta::TagAdded(tag) => {
                tags.insert(tag.clone());
            }
            Delta::TagRemoved(tag) => {
                tags.remove(tag);
            }
            Delta::Created | Delta::Deleted => {}
        }
    }
    (props, tags)
}

fn pick(entities: &[Entity], i: usize) -> Option<Entity> {
    if entities.is_empty() {
        return None;
    }
    Some(entities[i % entities.len()].clone())
}

fn check_and_commit(
    store: &EntityStore,
    next_id: &mut u64,
    fail: bool,
) -> Result<(), TestCaseError> {
    let entries = store.snapshot();
    for entry in &entries {
        let (props, tags) = replay(entry);
        prop_assert_eq!(&props, &entry.after.properties);
        prop_assert_eq!(&tags, &entry.after.tags);
    }
    if fail {
        store.restore(entries);
        return Ok(());
    }
    let mut ids = HashMap::new();
    for entry in entries.iter().filter(|e| e.is_insert()) {
        *next_id += 1;
        ids.insert(entry.entity.key(), format!("id-{next_id}"));
    }
    store.finalize(&entries, &ids);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn deltas_replay_to_snapshot_image(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let store = EntityStore::new();
        let mut entities: Vec<Entity> = Vec::new();
        let mut seen_ids: HashMap<EntityKey, String> = HashMap::new();
        let mut next_id = 0u64;

        for op in ops {
            match op {
                Op::Create => entities.push(store.create("T").unwrap()),
                Op::Set(i, p, v) => {
                    if let Some(e) = pick(&entities, i) {
                        let _ = store.set(&e, &format!("p{p}"), v);
                    }
                }
                Op::Remove(i, p) => {
                    if let Some(e) = pick(&entities, i) {
                        let _ = store.remove(&e, &format!("p{p}"));
                    }
                }
                Op::AddTag(i, t) => {
                    if let Some(e) = pick(&entities, i) {
                        let _ = store.add_tag(&e, &format!("t{t}"));
                    }
                }
                Op::RemoveTag(i, t) => {
                    if let Some(e) = pick(&entities, i) {
                        let _ = store.remove_tag(&e, &format!("t{t}"));
                    }
                }
                Op::Delete(i) => {
                    if let Some(e) = pick(&entities, i) {
                        let _ = store.delete(&e);
                    }
                }
                Op::Commit => check_and_commit(&store, &mut next_id, false)?,
                Op::FailedCommit => check_and_commit(&store, &mut next_id, true)?,
            }

            for e in &entities {
                if let Some(id) = e.id() {
                    let first = seen_ids.entry(e.key()).or_insert_with(|| id.clone());
                    prop_assert_eq!(first, &id);
                }
            }
        }

        check_and_commit(&store, &mut next_id, false)?;
        prop_assert_eq!(store.pending_entities(), 0);
    }
}
