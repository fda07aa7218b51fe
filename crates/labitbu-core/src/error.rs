//! Error types for the labitbu indexing pipeline.

use thiserror::Error;

/// Errors that can occur during indexing and reconciliation.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error came from an external service and the
    /// operation can be retried on a later run.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}
