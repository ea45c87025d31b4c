//! Walks one entity through insert, update and delete while a watcher prints
//! every elementary event it is notified of.
//!
//! Run with: `cargo run -p weft-graph --example watch_demo [graph.json]`
//!
//! With a path argument the graph is persisted to that JSON file; otherwise
//! an in-memory sink is used. Set `RUST_LOG=weft_graph=debug` for commit
//! pipeline logs.

use std::sync::Arc;

use anyhow::Context;
use weft_graph::prelude::*;
use weft_graph::telemetry::init_tracing;

fn printer() -> WatchDelegate {
    WatchDelegate::new()
        .on_inserted(|info, e| println!("[{}] inserted {} {}", info.sequence, e.entity_type, e.id))
        .on_property_added(|info, _, name, value| println!("[{}]   + {name} = {value}", info.sequence))
        .on_property_updated(|info, _, name, value| println!("[{}]   ~ {name} = {value}", info.sequence))
        .on_property_removed(|info, _, name, value| println!("[{}]   - {name} (was {value})", info.sequence))
        .on_tag_added(|info, _, tag| println!("[{}]   + #{tag}", info.sequence))
        .on_tag_removed(|info, _, tag| println!("[{}]   - #{tag}", info.sequence))
        .on_deleted(|info, e| println!("[{}] deleted {} {}", info.sequence, e.entity_type, e.id))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("weft_graph=info");

    let sink: Arc<dyn DurableSink> = match std::env::args().nth(1) {
        Some(path) => Arc::new(JsonFileSink::new(path)),
        None => Arc::new(MemorySink::new()),
    };
    let graph = Graph::open(GraphConfig::named("demo"), sink)
        .await
        .context("opening graph")?;

    let _watch = graph.watch(
        WatchFilter::new().for_types(["Action"]).has_tags(["G"]),
        printer(),
    );

    let action = graph.create("Action")?;
    graph.set(&action, "P", 111)?;
    graph.set(&action, "label", "first")?;
    graph.add_tag(&action, "G")?;
    let report = graph.commit().await.context("first commit")?;
    println!("commit {}: {} inserted, {} events", report.sequence, report.inserted, report.events);

    graph.set(&action, "P", 222)?;
    graph.remove(&action, "label")?;
    let report = graph.commit().await.context("second commit")?;
    println!("commit {}: {} updated, {} events", report.sequence, report.updated, report.events);

    graph.delete(&action)?;
    let report = graph.commit().await.context("third commit")?;
    println!("commit {}: {} deleted, {} events", report.sequence, report.deleted, report.events);

    graph.close().await;
    Ok(())
}
