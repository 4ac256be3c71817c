//! Error types for the page-index-rag pipeline.
//!
//! Failures are grouped into four kinds so that call sites can tell
//! client mistakes from broken configuration, degraded collaborators,
//! and unrecoverable storage state:
//!
//! - [`RagError::Validation`]: rejected request payloads (client-facing).
//! - [`RagError::Configuration`]: invalid settings, rejected at load or
//!   at collaborator construction; never transient.
//! - [`RagError::TransientCollaborator`]: a vector-store, reranker, or
//!   generator call failed. Caught at the invoking boundary; retrieval
//!   and reranking degrade to their local fallback, only generation may
//!   surface this to the caller.
//! - [`RagError::StorageCorruption`]: the persisted snapshot is
//!   unreadable or structurally invalid. Fatal, never silently repaired.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RagError>;

/// All errors produced by the ingestion and retrieval pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// The request payload is invalid (empty ingest content, blank query).
    #[error("validation error: {0}")]
    Validation(String),

    /// The configuration is invalid (e.g. chunk overlap >= window size).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An external collaborator call failed or timed out.
    #[error("{collaborator} call failed: {message}")]
    TransientCollaborator {
        /// Which collaborator failed (`"qdrant"`, `"reranker"`, `"generator"`).
        collaborator: &'static str,
        message: String,
    },

    /// The persisted snapshot could not be read or failed validation.
    #[error("storage snapshot corrupted: {0}")]
    StorageCorruption(String),

    /// I/O error while writing the snapshot.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error while writing the snapshot.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RagError {
    /// Wrap a collaborator failure, preserving the failing endpoint name.
    pub fn transient(collaborator: &'static str, err: impl std::fmt::Display) -> Self {
        Self::TransientCollaborator {
            collaborator,
            message: err.to_string(),
        }
    }

    /// True for failures that should degrade rather than abort a request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientCollaborator { .. })
    }
}
