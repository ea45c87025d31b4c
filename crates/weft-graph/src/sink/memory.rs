use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};
use weft_store::entity::EntityRecord;

use super::{DurableSink, LoadedState, MutationBatch};
use crate::error::SinkError;

#[derive(Debug, Default)]
struct MemoryState {
    table: BTreeMap<String, EntityRecord>,
    sequence: u64,
    batches: Vec<MutationBatch>,
    fail_next: usize,
}

/// In-memory sink. Keeps the committed table plus every accepted batch.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that already holds `records`, as if written by an earlier
    /// session.
    pub fn with_records(records: impl IntoIterator<Item = EntityRecord>) -> Self {
        let table = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            state: Mutex::new(MemoryState {
                table,
                ..MemoryState::default()
            }),
        }
    }

    /// Reject the next `count` transactions.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    pub fn get(&self, id: &str) -> Option<EntityRecord> {
        self.state.lock().table.get(id).cloned()
    }

    pub fn records(&self) -> Vec<EntityRecord> {
        self.state.lock().table.values().cloned().collect()
    }

    /// Accepted batches, oldest first.
    pub fn batches(&self) -> Vec<MutationBatch> {
        self.state.lock().batches.clone()
    }

    pub fn transactions(&self) -> usize {
        self.state.lock().batches.len()
    }

    /// Sequence of the last accepted batch.
    pub fn sequence(&self) -> u64 {
        self.state.lock().sequence
    }
}

#[async_trait]
impl DurableSink for MemorySink {
    async fn write_transaction(&self, batch: &MutationBatch) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            warn!(sequence = batch.sequence, "memory sink rejecting transaction");
            return Err(SinkError::Injected(format!(
                "transaction {} rejected",
                batch.sequence
            )));
        }
        batch.apply_to(&mut state.table);
        state.sequence = batch.sequence;
        state.batches.push(batch.clone());
        debug!(
            sequence = batch.sequence,
            operations = batch.len(),
            "memory sink committed"
        );
        Ok(())
    }

    async fn load(&self) -> Result<LoadedState, SinkError> {
        let state = self.state.lock();
        Ok(LoadedState {
            sequence: state.sequence,
            records: state.table.values().cloned().collect(),
        })
    }
}
