//! The single-writer commit pipeline.
//!
//! One [`CommitWorker`] task per graph consumes commit requests from an
//! unbounded channel, strictly one at a time and in arrival order. Request N
//! completes (its completion callback returns) before request N+1 takes its
//! snapshot.
//!
//! Processing one request:
//!
//! 1. Snapshot the store's mutation log.
//! 2. Build a [`MutationBatch`], with provisional ids for first inserts. A
//!    batch with nothing durable in it finalizes without a sequence number.
//! 3. Write it through the sink, on a separate task so a sink panic comes
//!    back as an error.
//! 4. On success: finalize the store, diff, dispatch, complete with a
//!    [`CommitReport`].
//! 5. On failure: restore the snapshot for a later retry, complete with the
//!    error.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use weft_store::entity::{EntityKey, EntityRecord};
use weft_store::mutation::SnapshotEntry;
use weft_store::store::EntityStore;
use weft_watch::delegate::CommitInfo;
use weft_watch::diff::diff;
use weft_watch::dispatch::panic_message;
use weft_watch::event::ChangedEntity;
use weft_watch::registry::WatchRegistry;

use crate::error::{CommitError, SinkError};
use crate::ids::IdGenerator;
use crate::sink::{BatchOperation, DurableSink, MutationBatch};

// ---------------------------------------------------------------------------
// CommitReport
// ---------------------------------------------------------------------------

/// Outcome of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    /// Sequence number of this commit. A commit with nothing durable to write
    /// reports the previous sequence and is not recorded in history.
    pub sequence: u64,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Entities created and deleted within the commit cycle.
    pub discarded: usize,
    /// Elementary events produced by the diff.
    pub events: usize,
    /// Callback invocations across all subscriptions.
    pub deliveries: usize,
    /// Callbacks that panicked.
    pub callback_failures: usize,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.inserted + self.updated + self.deleted + self.discarded == 0
    }
}

pub type CommitResult = Result<CommitReport, CommitError>;

/// Called exactly once per commit request.
pub type Completion = Box<dyn FnOnce(CommitResult) + Send + 'static>;

pub(crate) enum Message {
    Commit(Completion),
    Close(oneshot::Sender<()>),
}

// ---------------------------------------------------------------------------
// CommitWorker
// ---------------------------------------------------------------------------

pub(crate) struct CommitWorker {
    pub(crate) name: String,
    pub(crate) store: EntityStore,
    pub(crate) registry: WatchRegistry,
    pub(crate) sink: Arc<dyn DurableSink>,
    pub(crate) ids: IdGenerator,
    pub(crate) sequence: u64,
    pub(crate) history: Arc<Mutex<VecDeque<CommitReport>>>,
    pub(crate) history_len: usize,
}

impl CommitWorker {
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        debug!(graph = %self.name, "commit worker started");
        while let Some(message) = rx.recv().await {
            match message {
                Message::Commit(completion) => self.handle(completion).await,
                Message::Close(ack) => {
                    // Everything accepted before the close is already ahead
                    // of it in the channel. Anything that raced in behind it
                    // is refused.
                    rx.close();
                    while let Ok(late) = rx.try_recv() {
                        match late {
                            Message::Commit(completion) => {
                                complete(&self.name, completion, Err(CommitError::Closed))
                            }
                            Message::Close(ack) => {
                                let _ = ack.send(());
                            }
                        }
                    }
                    let _ = ack.send(());
                    break;
                }
            }
        }
        debug!(graph = %self.name, sequence = self.sequence, "commit worker stopped");
    }

    async fn handle(&mut self, completion: Completion) {
        let result = self.process().await;
        complete(&self.name, completion, result);
    }

    async fn process(&mut self) -> CommitResult {
        let entries = self.store.snapshot();
        if entries.is_empty() {
            debug!(graph = %self.name, "nothing to commit");
            return Ok(CommitReport {
                sequence: self.sequence,
                ..CommitReport::default()
            });
        }

        let sequence = self.sequence + 1;
        let assigned = self.assign_ids(&entries);
        let batch = build_batch(sequence, &entries, &assigned);
        if batch.is_empty() {
            // Every entity was created and deleted within the cycle.
            self.store.finalize(&entries, &assigned);
            debug!(graph = %self.name, discarded = entries.len(), "nothing durable to commit");
            return Ok(CommitReport {
                sequence: self.sequence,
                discarded: entries.len(),
                ..CommitReport::default()
            });
        }
        debug!(
            graph = %self.name,
            sequence,
            entities = entries.len(),
            operations = batch.len(),
            "committing"
        );

        if let Err(source) = self.write(batch).await {
            warn!(
                graph = %self.name,
                sequence,
                error = %source,
                "commit failed, snapshot re-queued"
            );
            self.store.restore(entries);
            return Err(CommitError::Durability { sequence, source });
        }

        self.sequence = sequence;
        self.store.finalize(&entries, &assigned);

        let mut report = CommitReport {
            sequence,
            ..CommitReport::default()
        };
        let changes: Vec<ChangedEntity> = entries
            .into_iter()
            .map(|entry| {
                if entry.is_ephemeral() {
                    report.discarded += 1;
                } else if entry.delete_requested {
                    report.deleted += 1;
                } else if entry.is_insert() {
                    report.inserted += 1;
                } else {
                    report.updated += 1;
                }
                changed_entity(entry, &assigned)
            })
            .collect();

        let events = diff(changes);
        let info = CommitInfo {
            graph: self.name.clone(),
            sequence,
        };
        let dispatch = self.registry.dispatch(&info, &events);
        report.events = dispatch.events;
        report.deliveries = dispatch.deliveries;
        report.callback_failures = dispatch.failures;

        info!(
            graph = %self.name,
            sequence,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            events = report.events,
            "commit succeeded"
        );
        self.record(&report);
        Ok(report)
    }

    /// Hand the batch to the sink on its own task. A panicking sink fails
    /// this commit; the worker keeps serving requests.
    async fn write(&self, batch: MutationBatch) -> Result<(), SinkError> {
        let sink = Arc::clone(&self.sink);
        match tokio::spawn(async move { sink.write_transaction(&batch).await }).await {
            Ok(result) => result,
            Err(join) if join.is_panic() => {
                let payload = join.into_panic();
                Err(SinkError::Panicked(panic_message(payload.as_ref()).to_owned()))
            }
            Err(join) => Err(SinkError::Write(join.to_string())),
        }
    }

    /// Provisional ids for first inserts, unique among persisted entities
    /// and within the batch. Discarded if the write fails.
    fn assign_ids(&mut self, entries: &[SnapshotEntry]) -> HashMap<EntityKey, String> {
        let mut assigned = HashMap::new();
        let mut taken = HashSet::new();
        for entry in entries.iter().filter(|e| e.is_insert()) {
            let id = loop {
                let candidate = self.ids.next_id();
                if self.store.entity(&candidate).is_none() && !taken.contains(&candidate) {
                    break candidate;
                }
            };
            taken.insert(id.clone());
            assigned.insert(entry.entity.key(), id);
        }
        assigned
    }

    fn record(&self, report: &CommitReport) {
        if self.history_len == 0 {
            return;
        }
        let mut history = self.history.lock();
        history.push_back(report.clone());
        while history.len() > self.history_len {
            history.pop_front();
        }
    }
}

fn complete(graph: &str, completion: Completion, result: CommitResult) {
    if catch_unwind(AssertUnwindSafe(|| completion(result))).is_err() {
        error!(graph, "commit completion panicked");
    }
}

fn durable_id(entry: &SnapshotEntry, assigned: &HashMap<EntityKey, String>) -> String {
    match &entry.before {
        Some(before) => before.id.clone(),
        None => assigned
            .get(&entry.entity.key())
            .cloned()
            .unwrap_or_default(),
    }
}

fn build_batch(
    sequence: u64,
    entries: &[SnapshotEntry],
    assigned: &HashMap<EntityKey, String>,
) -> MutationBatch {
    let operations = entries
        .iter()
        .filter(|entry| !entry.is_ephemeral())
        .map(|entry| {
            let id = durable_id(entry, assigned);
            if entry.delete_requested {
                BatchOperation::Delete {
                    id,
                    entity_type: entry.after.entity_type.clone(),
                    deltas: entry.deltas.clone(),
                }
            } else {
                let mut record = entry.after.clone();
                record.id = id;
                BatchOperation::Upsert {
                    record,
                    deltas: entry.deltas.clone(),
                }
            }
        })
        .collect();
    MutationBatch {
        sequence,
        operations,
    }
}

fn changed_entity(entry: SnapshotEntry, assigned: &HashMap<EntityKey, String>) -> ChangedEntity {
    let id = durable_id(&entry, assigned);
    let after = if entry.delete_requested {
        EntityRecord::tombstone(id, entry.after.entity_type)
    } else {
        EntityRecord { id, ..entry.after }
    };
    ChangedEntity {
        key: entry.entity.key(),
        before: entry.before,
        after,
        deleted: entry.delete_requested,
    }
}
