//! Dispatch integration tests: several subscriptions with different filters
//! watching the same commits.

use std::sync::Arc;

use parking_lot::Mutex;
use weft_store::prelude::*;
use weft_watch::prelude::*;

type Log = Arc<Mutex<Vec<String>>>;

fn info(sequence: u64) -> CommitInfo {
    CommitInfo {
        graph: "dispatch".to_owned(),
        sequence,
    }
}

fn record(id: &str, entity_type: &str, props: &[(&str, i64)], tags: &[&str]) -> EntityRecord {
    let mut r = EntityRecord::tombstone(id, entity_type);
    for (k, v) in props {
        r.properties.insert((*k).to_owned(), Value::Integer(*v));
    }
    for t in tags {
        r.tags.insert((*t).to_owned());
    }
    r
}

/// A delegate that writes every callback into `log` as a short line.
fn logger(log: &Log) -> WatchDelegate {
    let l = |log: &Log| log.clone();
    let (a, b, c, d, e, f, g) = (l(log), l(log), l(log), l(log), l(log), l(log), l(log));
    WatchDelegate::new()
        .on_inserted(move |i, r| a.lock().push(format!("{} inserted {}", i.sequence, r.id)))
        .on_deleted(move |i, r| b.lock().push(format!("{} deleted {}", i.sequence, r.id)))
        .on_property_added(move |_, r, n, v| c.lock().push(format!("{} +{n}={v}", r.id)))
        .on_property_updated(move |_, r, n, v| d.lock().push(format!("{} ~{n}={v}", r.id)))
        .on_property_removed(move |_, r, n, v| e.lock().push(format!("{} -{n}={v}", r.id)))
        .on_tag_added(move |_, r, t| f.lock().push(format!("{} +#{t}", r.id)))
        .on_tag_removed(move |_, r, t| g.lock().push(format!("{} -#{t}", r.id)))
}

fn watch(registry: &WatchRegistry, filter: WatchFilter) -> (Subscription, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sub = registry.subscribe(filter);
    sub.bind(logger(&log));
    sub.activate();
    (sub, log)
}

fn commit_events() -> Vec<ElementaryEvent> {
    diff(vec![
        ChangedEntity {
            key: EntityKey::from_raw(1),
            before: None,
            after: record("a", "T", &[("P", 1), ("Q", 2)], &["G"]),
            deleted: false,
        },
        ChangedEntity {
            key: EntityKey::from_raw(2),
            before: Some(record("b", "U", &[("P", 5)], &["G", "H"])),
            after: record("b", "U", &[("P", 6)], &["G"]),
            deleted: false,
        },
        ChangedEntity {
            key: EntityKey::from_raw(3),
            before: Some(record("c", "T", &[("P", 9)], &["G"])),
            after: EntityRecord::tombstone("c", "T"),
            deleted: true,
        },
    ])
}

#[test]
fn each_subscriber_sees_its_matching_slice_in_order() {
    let registry = WatchRegistry::new();
    let (_all, all) = watch(&registry, WatchFilter::new());
    let (_t, only_t) = watch(&registry, WatchFilter::new().for_types(["T"]));
    let (_p, only_p) = watch(
        &registry,
        WatchFilter::new().has_tags(["G"]).where_properties(["P"]),
    );

    let report = registry.dispatch(&info(1), &commit_events());
    assert_eq!(report.events, 9);
    assert_eq!(report.failures, 0);

    assert_eq!(
        *all.lock(),
        vec![
            "1 inserted a",
            "a +P=1",
            "a +Q=2",
            "a +#G",
            "b ~P=6",
            "b -#H",
            "c -P=9",
            "c -#G",
            "1 deleted c",
        ]
    );
    assert_eq!(
        *only_t.lock(),
        vec!["1 inserted a", "a +P=1", "a +Q=2", "a +#G", "c -P=9", "c -#G", "1 deleted c"]
    );
    // Tag filter {G}: H events are out, Q events are out.
    assert_eq!(
        *only_p.lock(),
        vec!["1 inserted a", "a +P=1", "a +#G", "b ~P=6", "c -P=9", "c -#G", "1 deleted c"]
    );
    assert_eq!(
        report.deliveries,
        all.lock().len() + only_t.lock().len() + only_p.lock().len()
    );
}

#[test]
fn paused_then_resumed_subscription_misses_only_paused_commits() {
    let registry = WatchRegistry::new();
    let (sub, log) = watch(&registry, WatchFilter::new().for_types(["T"]));

    sub.pause();
    registry.dispatch(&info(1), &commit_events());
    assert!(log.lock().is_empty());

    sub.activate();
    registry.dispatch(&info(2), &commit_events());
    assert_eq!(log.lock().first().map(String::as_str), Some("2 inserted a"));
}

#[test]
fn unsubscribed_twice_receives_nothing() {
    let registry = WatchRegistry::new();
    let (sub, log) = watch(&registry, WatchFilter::new());
    assert!(sub.unsubscribe());
    assert!(!sub.unsubscribe());

    let report = registry.dispatch(&info(1), &commit_events());
    assert_eq!(report.deliveries, 0);
    assert!(log.lock().is_empty());
}

#[test]
fn rebinding_switches_delegate() {
    let registry = WatchRegistry::new();
    let (sub, first) = watch(&registry, WatchFilter::new().for_types(["U"]));
    registry.dispatch(&info(1), &commit_events());
    assert_eq!(first.lock().len(), 2);

    let second: Log = Arc::new(Mutex::new(Vec::new()));
    sub.bind(logger(&second));
    registry.dispatch(&info(2), &commit_events());
    assert_eq!(first.lock().len(), 2);
    assert_eq!(*second.lock(), vec!["b ~P=6", "b -#H"]);
}
