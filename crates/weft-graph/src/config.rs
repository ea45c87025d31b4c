//! Graph configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

/// Configuration for a [`Graph`](crate::graph::Graph).
///
/// Missing fields take their defaults when deserializing, so `{}` is a valid
/// configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Name reported to watchers in every `CommitInfo`. Must be non-empty.
    pub name: String,
    /// Seed for id generation. `None` seeds from OS entropy.
    pub id_seed: Option<u64>,
    /// Number of commit reports retained by `Graph::history`.
    pub history_len: usize,
}

impl Default for GraphConfig {
    /// Unnamed graph ("default"), entropy-seeded ids, 64 reports of history.
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            id_seed: None,
            history_len: 64,
        }
    }
}

impl GraphConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id_seed(mut self, seed: u64) -> Self {
        self.id_seed = Some(seed);
        self
    }

    pub fn with_history_len(mut self, len: usize) -> Self {
        self.history_len = len;
        self
    }

    /// Read a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Config(format!("{}: {e}", path.display())))?;
        let config: GraphConfig = serde_json::from_str(&text)
            .map_err(|e| GraphError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GraphResult<()> {
        if self.name.is_empty() {
            return Err(GraphError::Config("graph name must not be empty".to_owned()));
        }
        Ok(())
    }
}
