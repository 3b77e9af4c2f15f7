//! Core types for docsift.
//!
//! ## Documents
//! - [`DocumentRecord`]: Metadata row for one submitted document
//! - [`DocumentStatus`]: Lifecycle state of a document
//! - [`DocumentFormat`]: Supported input formats
//!
//! ## Extraction
//! - [`ExtractedContent`]: Text extracted from a document
//! - [`ContentMetadataInfo`]: Optional document-level metadata
//!
//! ## Embeddings
//! - [`EmbeddingConfig`]: Configuration for embedding generation
//! - [`EmbeddingOutput`]: Result of embedding a text
//!
//! ## Vectors and Search
//! - [`VectorEntry`]: One vector keyed by document id
//! - [`ScoredId`]: A candidate returned by a vector index query
//! - [`SearchHit`]: A ranked document with its score
//!
//! ## Store Results
//! - [`CasOutcome`]: Result of a conditional status write
//! - [`StatusCounts`]: Number of records per status

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

// ============================================================================
// Documents
// ============================================================================

/// Metadata about a submitted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique document identifier, assigned at submission
    pub id: Uuid,
    /// File name as supplied by the submitter
    pub original_name: String,
    /// Format tag the document was submitted with
    pub format: DocumentFormat,
    /// Current lifecycle status
    pub status: DocumentStatus,
    /// Failure description, present only when status is `FAILED`
    pub error_detail: Option<String>,
    /// Size of the submitted bytes
    pub size_bytes: u64,
    /// Content hash of the submitted bytes (blake3)
    pub content_hash: String,
    /// Number of times this document has been enqueued
    pub attempts: u32,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Time of the last status transition
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Create a new `PENDING` record for freshly submitted bytes.
    #[must_use]
    pub fn new(original_name: impl Into<String>, format: DocumentFormat, bytes: &[u8]) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            original_name: original_name.into(),
            format,
            status: DocumentStatus::Pending,
            error_detail: None,
            size_bytes: bytes.len() as u64,
            content_hash: blake3::hash(bytes).to_hex().to_string(),
            attempts: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the record may appear in search results.
    #[must_use]
    pub fn is_searchable(&self) -> bool {
        self.status == DocumentStatus::Complete
    }
}

/// Document lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    /// Waiting for a worker
    Pending,
    /// Claimed by a worker
    Processing,
    /// Extracted, embedded and indexed
    Complete,
    /// Ingestion failed; see `error_detail`
    Failed,
}

impl DocumentStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Complete,
        Self::Failed,
    ];

    /// Stable string form used in storage and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    /// Whether no worker will move the document any further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETE" => Ok(Self::Complete),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::Other(format!("unknown document status: {other}"))),
        }
    }
}

/// Supported document formats.
///
/// The set is closed: each variant has exactly one extraction strategy in the
/// registry. Adding a format means adding a variant and an extractor; the
/// lifecycle is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Image,
    #[serde(rename = "plaintext")]
    PlainText,
}

impl DocumentFormat {
    /// All formats.
    pub const ALL: [Self; 4] = [Self::Pdf, Self::Docx, Self::Image, Self::PlainText];

    /// Canonical format tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Image => "image",
            Self::PlainText => "plaintext",
        }
    }

    /// Infer the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" => Some(Self::Image),
            "txt" | "text" | "md" => Some(Self::PlainText),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "image" => Ok(Self::Image),
            "plaintext" | "txt" | "text" => Ok(Self::PlainText),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Content extracted from a document.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    /// Main text content
    pub text: String,
    /// Document-level metadata
    pub metadata: ContentMetadataInfo,
}

impl ExtractedContent {
    /// Create content with only text.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: ContentMetadataInfo::default(),
        }
    }

    /// Number of non-whitespace characters in the text.
    #[must_use]
    pub fn meaningful_chars(&self) -> usize {
        self.text.chars().filter(|c| !c.is_whitespace()).count()
    }
}

/// Metadata extracted from document content.
#[derive(Debug, Clone, Default)]
pub struct ContentMetadataInfo {
    /// Document title
    pub title: Option<String>,
    /// Author
    pub author: Option<String>,
    /// Language
    pub language: Option<String>,
    /// Page count (for PDFs)
    pub page_count: Option<u32>,
}

// ============================================================================
// Embedding
// ============================================================================

/// Configuration for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Normalize embeddings to unit length
    pub normalize: bool,
    /// Instruction prefix for models that support it
    pub instruction: Option<String>,
    /// Batch size for processing
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            instruction: None,
            batch_size: 32,
        }
    }
}

/// Output from embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    /// The embedding vector
    pub embedding: Vec<f32>,
    /// Number of tokens in input
    pub token_count: usize,
}

// ============================================================================
// Vectors and Search
// ============================================================================

/// A vector stored for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Document id this vector belongs to
    pub id: Uuid,
    /// Embedding vector
    pub vector: Vec<f32>,
    /// When the vector was written
    pub indexed_at: DateTime<Utc>,
}

impl VectorEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(id: Uuid, vector: Vec<f32>) -> Self {
        Self {
            id,
            vector,
            indexed_at: Utc::now(),
        }
    }
}

/// A candidate id with its similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    pub id: Uuid,
    pub score: f32,
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matching document
    pub record: DocumentRecord,
    /// Similarity score (higher is more similar)
    pub score: f32,
}

impl SearchHit {
    /// The external view of a hit: id, name and score.
    #[must_use]
    pub fn summary(&self) -> SearchHitSummary {
        SearchHitSummary {
            id: self.record.id,
            original_name: self.record.original_name.clone(),
            score: self.score,
        }
    }
}

/// Compact search result returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHitSummary {
    pub id: Uuid,
    pub original_name: String,
    pub score: f32,
}

// ============================================================================
// Store Results
// ============================================================================

/// Outcome of [`MetadataStore::compare_and_swap`](crate::MetadataStore::compare_and_swap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The record was replaced
    Applied,
    /// No record exists for the id
    NotFound,
    /// The stored status differed from the expected one
    Conflict(DocumentStatus),
}

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub complete: u64,
    pub failed: u64,
}

impl StatusCounts {
    /// Count one record with the given status.
    pub fn add(&mut self, status: DocumentStatus) {
        match status {
            DocumentStatus::Pending => self.pending += 1,
            DocumentStatus::Processing => self.processing += 1,
            DocumentStatus::Complete => self.complete += 1,
            DocumentStatus::Failed => self.failed += 1,
        }
    }

    /// Total number of records.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.complete + self.failed
    }
}

/// Overall ingestion statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// Records per status
    pub documents: StatusCounts,
    /// Entries in the vector index
    pub vectors: u64,
    /// Time the stats were gathered
    pub gathered_at: Option<DateTime<Utc>>,
}
