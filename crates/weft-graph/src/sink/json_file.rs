use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use weft_store::entity::EntityRecord;

use super::{DurableSink, LoadedState, MutationBatch};
use crate::error::SinkError;

const FORMAT_VERSION: u32 = 1;

/// On-disk layout. `digest` is the BLAKE3 hex digest of `records`
/// serialized as compact JSON.
#[derive(Debug, Serialize, Deserialize)]
struct Document {
    format: u32,
    sequence: u64,
    digest: String,
    records: Vec<EntityRecord>,
}

#[derive(Debug, Default)]
struct Table {
    sequence: u64,
    records: BTreeMap<String, EntityRecord>,
}

/// Sink that keeps the whole committed table in one JSON file.
///
/// Every transaction rewrites the document to a sibling temp file, syncs it
/// and renames it over the previous version. A crash mid-write leaves the old
/// document intact.
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
    table: Mutex<Option<Table>>,
}

impl JsonFileSink {
    /// Nothing is read until the first `load` or `write_transaction`. A
    /// missing file is an empty table.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_table(&self) -> Result<Table, SinkError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Table::default()),
            Err(e) => {
                return Err(SinkError::Read(format!("{}: {e}", self.path.display())));
            }
        };
        let doc: Document = serde_json::from_slice(&bytes)
            .map_err(|e| SinkError::Read(format!("{}: {e}", self.path.display())))?;
        if doc.format != FORMAT_VERSION {
            return Err(SinkError::Read(format!(
                "{}: unsupported format {}",
                self.path.display(),
                doc.format
            )));
        }
        let computed = digest(&doc.records)?;
        if computed != doc.digest {
            return Err(SinkError::DigestMismatch {
                path: self.path.display().to_string(),
                recorded: doc.digest,
                computed,
            });
        }
        Ok(Table {
            sequence: doc.sequence,
            records: doc.records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        })
    }

    async fn replace_file(&self, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::File::open(&tmp).await?.sync_all().await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

fn digest(records: &[EntityRecord]) -> Result<String, SinkError> {
    let bytes = serde_json::to_vec(records).map_err(|e| SinkError::Write(e.to_string()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[async_trait]
impl DurableSink for JsonFileSink {
    async fn write_transaction(&self, batch: &MutationBatch) -> Result<(), SinkError> {
        let mut guard = self.table.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_table().await?);
        }
        let Some(current) = guard.as_ref() else {
            return Err(SinkError::Read("table not loaded".to_owned()));
        };

        let mut records = current.records.clone();
        batch.apply_to(&mut records);
        let list: Vec<EntityRecord> = records.values().cloned().collect();
        let doc = Document {
            format: FORMAT_VERSION,
            sequence: batch.sequence,
            digest: digest(&list)?,
            records: list,
        };
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| SinkError::Write(e.to_string()))?;

        if let Err(e) = self.replace_file(&bytes).await {
            let _ = tokio::fs::remove_file(self.temp_path()).await;
            warn!(path = %self.path.display(), sequence = batch.sequence, error = %e, "json sink write failed");
            return Err(SinkError::Write(format!("{}: {e}", self.path.display())));
        }

        debug!(
            path = %self.path.display(),
            sequence = batch.sequence,
            records = records.len(),
            "json sink committed"
        );
        *guard = Some(Table {
            sequence: batch.sequence,
            records,
        });
        Ok(())
    }

    async fn load(&self) -> Result<LoadedState, SinkError> {
        let table = self.read_table().await?;
        debug!(
            path = %self.path.display(),
            sequence = table.sequence,
            records = table.records.len(),
            "json sink loaded"
        );
        let loaded = LoadedState {
            sequence: table.sequence,
            records: table.records.values().cloned().collect(),
        };
        *self.table.lock().await = Some(table);
        Ok(loaded)
    }
}
