//! Durable sinks: where committed transactions go.
//!
//! The commit worker hands each commit to a [`DurableSink`] as one
//! [`MutationBatch`]. A sink must apply a batch atomically: either every
//! operation is persisted or none is. The worker treats any error as "nothing
//! was written" and re-queues the snapshot.
//!
//! Two sinks ship with the crate:
//!
//! - [`MemorySink`]: an in-process table with failure injection.
//! - [`JsonFileSink`]: one JSON document on disk, replaced atomically per
//!   transaction and guarded by a BLAKE3 digest.

mod json_file;
mod memory;

pub use json_file::JsonFileSink;
pub use memory::MemorySink;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use weft_store::entity::EntityRecord;
use weft_store::mutation::Delta;

use crate::error::SinkError;

// ---------------------------------------------------------------------------
// MutationBatch
// ---------------------------------------------------------------------------

/// One operation of a transaction. Deltas are carried for sinks that keep a
/// change log; table-style sinks only need the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BatchOperation {
    /// Insert or replace the full committed image of an entity.
    Upsert {
        record: EntityRecord,
        deltas: Vec<Delta>,
    },
    /// Remove a persisted entity.
    Delete {
        id: String,
        entity_type: String,
        deltas: Vec<Delta>,
    },
}

impl BatchOperation {
    pub fn id(&self) -> &str {
        match self {
            BatchOperation::Upsert { record, .. } => &record.id,
            BatchOperation::Delete { id, .. } => id,
        }
    }
}

/// Everything one commit persists, in entity first-touch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationBatch {
    pub sequence: u64,
    pub operations: Vec<BatchOperation>,
}

impl MutationBatch {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Apply the batch to an id-keyed table.
    pub fn apply_to(&self, table: &mut BTreeMap<String, EntityRecord>) {
        for op in &self.operations {
            match op {
                BatchOperation::Upsert { record, .. } => {
                    table.insert(record.id.clone(), record.clone());
                }
                BatchOperation::Delete { id, .. } => {
                    table.remove(id);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DurableSink
// ---------------------------------------------------------------------------

/// What a sink hands back when a graph opens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedState {
    /// Sequence of the last persisted batch, 0 for a fresh sink.
    pub sequence: u64,
    pub records: Vec<EntityRecord>,
}

/// Atomic persistence backend for committed transactions.
#[async_trait]
pub trait DurableSink: Send + Sync {
    /// Persist one batch, all or nothing.
    async fn write_transaction(&self, batch: &MutationBatch) -> Result<(), SinkError>;

    /// Read back every persisted record and the last persisted sequence.
    /// Called once when a graph opens.
    async fn load(&self) -> Result<LoadedState, SinkError>;
}

#[cfg(test)]
mod tests {
    use weft_store::value::Value;

    use super::*;

    #[test]
    fn apply_upserts_and_deletes() {
        let mut a = EntityRecord::tombstone("a", "T");
        a.properties.insert("P".to_owned(), Value::Integer(1));
        let mut table = BTreeMap::new();
        table.insert("b".to_owned(), EntityRecord::tombstone("b", "T"));

        let batch = MutationBatch {
            sequence: 1,
            operations: vec![
                BatchOperation::Upsert {
                    record: a.clone(),
                    deltas: vec![Delta::Created],
                },
                BatchOperation::Delete {
                    id: "b".to_owned(),
                    entity_type: "T".to_owned(),
                    deltas: vec![Delta::Deleted],
                },
            ],
        };
        batch.apply_to(&mut table);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a"), Some(&a));
        assert_eq!(batch.operations[1].id(), "b");
    }

    #[test]
    fn operations_are_tagged_in_json() {
        let op = BatchOperation::Delete {
            id: "x".to_owned(),
            entity_type: "T".to_owned(),
            deltas: vec![],
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "delete");
        assert_eq!(json["id"], "x");
    }
}
