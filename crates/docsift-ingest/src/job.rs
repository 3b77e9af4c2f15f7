//! Ingestion jobs and the updates they emit.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One unit of background work: bring a document to a terminal status.
///
/// Jobs are not persisted. A job lost with its process is recovered from
/// the document's `PENDING` record on the next start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestJob {
    /// Document the job processes
    pub id: Uuid,
    /// Attempt number of the document when the job was enqueued
    pub attempt: u32,
    /// Time the job was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl IngestJob {
    /// Create a job for attempt `attempt` of document `id`.
    #[must_use]
    pub fn new(id: Uuid, attempt: u32) -> Self {
        Self {
            id,
            attempt,
            enqueued_at: Utc::now(),
        }
    }
}

/// Ingestion progress events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestUpdate {
    Queued { id: Uuid, attempt: u32 },
    Processing { id: Uuid },
    Completed { id: Uuid },
    Failed { id: Uuid, detail: String },
    /// The job ended without a transition, e.g. its record was deleted
    Abandoned { id: Uuid },
}

impl IngestUpdate {
    /// Document the update refers to.
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Queued { id, .. }
            | Self::Processing { id }
            | Self::Completed { id }
            | Self::Failed { id, .. }
            | Self::Abandoned { id } => *id,
        }
    }

    /// Whether the job that emitted this update has finished.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Abandoned { .. }
        )
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    Abandoned,
}

impl JobOutcome {
    /// The update announcing this outcome for document `id`.
    #[must_use]
    pub fn to_update(&self, id: Uuid) -> IngestUpdate {
        match self {
            Self::Completed => IngestUpdate::Completed { id },
            Self::Failed(detail) => IngestUpdate::Failed {
                id,
                detail: detail.clone(),
            },
            Self::Abandoned => IngestUpdate::Abandoned { id },
        }
    }
}
