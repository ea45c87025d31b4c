//! Error types for the commit pipeline and the graph facade.
//!
//! Every error classifies into a [`weft_store::error::ErrorKind`], the same
//! categories the store reports for synchronous mutation failures.

use weft_store::error::{ErrorKind, StoreError};

// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

/// Failure reported by a durable sink. Always a durability failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    /// The transaction could not be written. Nothing was persisted.
    #[error("sink write failed: {0}")]
    Write(String),

    /// Persisted state could not be read back.
    #[error("sink read failed: {0}")]
    Read(String),

    /// Persisted state does not match its recorded digest.
    #[error("digest mismatch in '{path}': recorded {recorded}, computed {computed}")]
    DigestMismatch {
        path: String,
        recorded: String,
        computed: String,
    },

    /// The sink panicked while writing. Nothing is assumed persisted.
    #[error("sink panicked: {0}")]
    Panicked(String),

    /// A failure scheduled through a test sink.
    #[error("injected sink failure: {0}")]
    Injected(String),
}

impl SinkError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DurabilityFailure
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Write(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// CommitError
// ---------------------------------------------------------------------------

/// Reason a commit request completed unsuccessfully.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommitError {
    /// The sink rejected the transaction. The snapshot was re-queued and
    /// will be retried by the next commit request.
    #[error("commit {sequence} failed: {source}")]
    Durability {
        sequence: u64,
        #[source]
        source: SinkError,
    },

    /// The graph was closed before the request was accepted.
    #[error("graph is closed")]
    Closed,

    /// The commit worker stopped without completing the request, e.g.
    /// because its runtime shut down.
    #[error("commit worker stopped before completing the request")]
    WorkerStopped,
}

impl CommitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommitError::Durability { .. } => ErrorKind::DurabilityFailure,
            CommitError::Closed | CommitError::WorkerStopped => ErrorKind::InvalidOperation,
        }
    }
}

// ---------------------------------------------------------------------------
// GraphError
// ---------------------------------------------------------------------------

/// Errors from opening or configuring a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The configuration could not be read or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `Graph::open` was polled outside a tokio runtime.
    #[error("a tokio runtime is required to run the commit worker")]
    NoRuntime,
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Store(e) => e.kind(),
            GraphError::Sink(e) => e.kind(),
            GraphError::Config(_) => ErrorKind::ValidationFailure,
            GraphError::NoRuntime => ErrorKind::InvalidOperation,
        }
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let sink = SinkError::Write("disk full".to_owned());
        assert_eq!(sink.kind(), ErrorKind::DurabilityFailure);
        let commit = CommitError::Durability {
            sequence: 3,
            source: sink.clone(),
        };
        assert_eq!(commit.kind(), ErrorKind::DurabilityFailure);
        assert_eq!(commit.to_string(), "commit 3 failed: sink write failed: disk full");
        assert_eq!(CommitError::Closed.kind(), ErrorKind::InvalidOperation);
        assert_eq!(
            GraphError::from(StoreError::EmptyType).kind(),
            ErrorKind::ValidationFailure
        );
        assert_eq!(GraphError::from(sink).kind(), ErrorKind::DurabilityFailure);
    }
}
