//! Error types for docsift.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::types::DocumentStatus;

/// Main error type for docsift operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Submitted format tag is not one of the supported extraction formats
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A status transition outside the lifecycle was attempted.
    ///
    /// This indicates a scheduling defect and is never surfaced to users.
    #[error("invalid transition for document {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// Content extraction failed
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    /// Embedding generation failed
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    /// Writing the vector entry failed or its outcome is unknown
    #[error("index write failed: {0}")]
    IndexWrite(String),

    /// Unknown document id
    #[error("document not found: {0}")]
    NotFound(Uuid),

    /// Resubmission of a document that is not `FAILED`
    #[error("document {id} is {status} and cannot be resubmitted")]
    NotResubmittable { id: Uuid, status: DocumentStatus },

    /// Search called with blank query text
    #[error("query text is empty")]
    EmptyQuery,

    /// Metadata store, vector index or blob store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The ingestion queue no longer accepts jobs
    #[error("ingestion queue is closed")]
    QueueClosed,

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error belongs on the caller's side of the API rather than
    /// signalling an internal defect.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::InvalidTransition { .. })
    }
}

/// Content extraction errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction failed: {0}")]
    Failed(String),

    #[error("no extractable text")]
    NoText,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("embedder unavailable: {0}")]
    Unavailable(String),

    #[error("input too long: {tokens} tokens, max {max}")]
    InputTooLong { tokens: usize, max: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Metadata store, vector index and blob store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("duplicate id: {0}")]
    Duplicate(Uuid),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for docsift operations.
pub type Result<T> = std::result::Result<T, Error>;
