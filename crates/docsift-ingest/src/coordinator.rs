//! Ingestion coordinator.
//!
//! The coordinator is the synchronous face of ingestion: it validates and
//! records submissions, hands jobs to the [`WorkerPool`], and answers status
//! lookups. It never waits for a job unless asked to via
//! [`wait_for`](IngestionCoordinator::wait_for).

use chrono::Utc;
use docsift_core::{
    BlobStore, CasOutcome, DocumentFormat, DocumentRecord, DocumentStatus, EmbedError, Embedder,
    Error, IngestStats, MetadataStore, Result, VectorIndex,
};
use docsift_extract::ExtractorRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::job::{IngestJob, IngestUpdate};
use crate::retry::RetryPolicy;
use crate::state::{JobStateMachine, Transition};
use crate::worker::{WorkerContext, WorkerPool};

/// Detail recorded for jobs cut short by a process exit.
pub const INTERRUPTED_DETAIL: &str = "interrupted before completion";

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Store and capability handles the pipeline is assembled from.
pub struct IngestServices {
    pub metadata: Arc<dyn MetadataStore>,
    pub index: Arc<dyn VectorIndex>,
    pub blobs: Arc<dyn BlobStore>,
    pub extractors: Arc<ExtractorRegistry>,
    pub embedder: Arc<dyn Embedder>,
}

/// What [`IngestionCoordinator::recover`] repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// `PENDING` records put back on the queue
    pub requeued: usize,
    /// `PROCESSING` records marked `FAILED`
    pub interrupted: usize,
    /// Vectors removed because their record is missing or not `COMPLETE`
    pub orphans_removed: usize,
}

/// Accepts documents and schedules their ingestion.
pub struct IngestionCoordinator {
    metadata: Arc<dyn MetadataStore>,
    index: Arc<dyn VectorIndex>,
    blobs: Arc<dyn BlobStore>,
    extractors: Arc<ExtractorRegistry>,
    state: JobStateMachine,
    pool: WorkerPool,
    updates: broadcast::Sender<IngestUpdate>,
    retry: RetryPolicy,
}

impl IngestionCoordinator {
    /// Initialize the stores and start the worker pool.
    ///
    /// Fails if the embedder and the index disagree on dimension.
    pub async fn start(services: IngestServices, config: IngestConfig) -> Result<Self> {
        let expected = services.index.dimension();
        let actual = services.embedder.dimension();
        if expected != actual {
            return Err(EmbedError::DimensionMismatch { expected, actual }.into());
        }

        services.metadata.init().await?;
        services.index.init().await?;

        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let retry = config.retry;
        let state = JobStateMachine::new(Arc::clone(&services.metadata), retry);

        info!(
            "Starting ingestion with {} ({} dims)",
            services.embedder.model_name(),
            actual
        );
        let pool = WorkerPool::spawn(WorkerContext {
            state: state.clone(),
            blobs: Arc::clone(&services.blobs),
            extractors: Arc::clone(&services.extractors),
            embedder: services.embedder,
            index: Arc::clone(&services.index),
            config,
            updates: updates.clone(),
        });

        Ok(Self {
            metadata: services.metadata,
            index: services.index,
            blobs: services.blobs,
            extractors: services.extractors,
            state,
            pool,
            updates,
            retry,
        })
    }

    /// Subscribe to ingestion updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IngestUpdate> {
        self.updates.subscribe()
    }

    /// Submit a document under a format tag such as `pdf` or `plaintext`.
    ///
    /// Returns the new `PENDING` record without waiting for processing.
    pub async fn submit(
        &self,
        bytes: &[u8],
        format: &str,
        original_name: &str,
    ) -> Result<DocumentRecord> {
        let format: DocumentFormat = format.parse()?;
        self.submit_as(bytes, format, original_name).await
    }

    /// Submit a document with an already parsed format.
    pub async fn submit_as(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
        original_name: &str,
    ) -> Result<DocumentRecord> {
        if !self.extractors.supports(format) {
            return Err(Error::UnsupportedFormat(format.to_string()));
        }

        let record = DocumentRecord::new(original_name, format, bytes);
        self.blobs.put(record.id, bytes).await?;
        if let Err(e) = self.metadata.insert(&record).await {
            if let Err(cleanup) = self.blobs.delete(record.id).await {
                warn!("Could not remove bytes of rejected {}: {}", record.id, cleanup);
            }
            return Err(e.into());
        }

        if let Err(e) = self.enqueue(&record).await {
            self.withdraw(&record).await;
            return Err(e);
        }
        info!(
            "Accepted {} as {} ({}, {} bytes)",
            original_name, record.id, format, record.size_bytes
        );
        Ok(record)
    }

    /// Put a `FAILED` document back into the queue.
    pub async fn resubmit(&self, id: Uuid) -> Result<DocumentRecord> {
        let current = self.status(id).await?;
        if current.status != DocumentStatus::Failed {
            return Err(Error::NotResubmittable {
                id,
                status: current.status,
            });
        }

        match self
            .state
            .transition(id, DocumentStatus::Failed, DocumentStatus::Pending, None)
            .await?
        {
            Transition::Applied(record) => {
                if let Err(e) = self.enqueue(&record).await {
                    self.restore_failed(&current).await;
                    return Err(e);
                }
                info!("Resubmitted {} (attempt {})", id, record.attempts);
                Ok(record)
            }
            Transition::Missing => Err(Error::NotFound(id)),
            Transition::Conflict(status) => Err(Error::NotResubmittable { id, status }),
        }
    }

    /// Current record of a document.
    pub async fn status(&self, id: Uuid) -> Result<DocumentRecord> {
        self.metadata.get(id).await?.ok_or(Error::NotFound(id))
    }

    /// Wait until a document reaches `COMPLETE` or `FAILED`.
    pub async fn wait_for(&self, id: Uuid, limit: Duration) -> Result<DocumentRecord> {
        tokio::time::timeout(limit, self.wait_terminal(id))
            .await
            .map_err(|_| Error::Other(format!("timed out waiting for document {id}")))?
    }

    async fn wait_terminal(&self, id: Uuid) -> Result<DocumentRecord> {
        let mut updates = self.subscribe();
        loop {
            let record = self.status(id).await?;
            if record.status.is_terminal() {
                return Ok(record);
            }
            // Any update, or a lag, is a cue to look again.
            if let Err(RecvError::Closed) = updates.recv().await {
                return self.status(id).await;
            }
        }
    }

    /// Remove a document: record first, then its vector and bytes.
    ///
    /// A job still running for the document notices the missing record and
    /// removes anything it wrote.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.metadata.delete(id).await? {
            return Err(Error::NotFound(id));
        }

        let what = format!("vector removal for {id}");
        self.retry
            .run(&what, move |_| self.index.delete(id))
            .await?;
        if let Err(e) = self.blobs.delete(id).await {
            warn!("Could not remove bytes of {}: {}", id, e);
        }

        info!("Deleted document {}", id);
        Ok(())
    }

    /// Records, optionally filtered by status, oldest first.
    pub async fn list(&self, status: Option<DocumentStatus>) -> Result<Vec<DocumentRecord>> {
        Ok(self.metadata.list(status).await?)
    }

    /// Counts per status and number of stored vectors.
    pub async fn stats(&self) -> Result<IngestStats> {
        Ok(IngestStats {
            documents: self.metadata.count_by_status().await?,
            vectors: self.index.count().await?,
            gathered_at: Some(Utc::now()),
        })
    }

    /// Repair state left by a previous process. Run before submitting work.
    ///
    /// `PROCESSING` records are failed, vectors without a `COMPLETE` record
    /// are removed, and `PENDING` records are queued again, in that order.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for record in self.metadata.list(Some(DocumentStatus::Processing)).await? {
            let outcome = self
                .state
                .transition(
                    record.id,
                    DocumentStatus::Processing,
                    DocumentStatus::Failed,
                    Some(INTERRUPTED_DETAIL),
                )
                .await?;
            if matches!(outcome, Transition::Applied(_)) {
                report.interrupted += 1;
            }
        }

        for id in self.index.ids().await? {
            let searchable = self
                .metadata
                .get(id)
                .await?
                .is_some_and(|record| record.is_searchable());
            if !searchable && self.index.delete(id).await? {
                debug!("Removed orphaned vector {}", id);
                report.orphans_removed += 1;
            }
        }

        for record in self.metadata.list(Some(DocumentStatus::Pending)).await? {
            self.enqueue(&record).await?;
            report.requeued += 1;
        }

        if report != RecoveryReport::default() {
            info!(
                "Recovery: {} requeued, {} interrupted, {} orphaned vectors removed",
                report.requeued, report.interrupted, report.orphans_removed
            );
        }
        Ok(report)
    }

    /// Stop accepting work and wait for queued jobs to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    async fn enqueue(&self, record: &DocumentRecord) -> Result<()> {
        let _ = self.updates.send(IngestUpdate::Queued {
            id: record.id,
            attempt: record.attempts,
        });
        let queued = self
            .pool
            .enqueue(IngestJob::new(record.id, record.attempts))
            .await;
        if queued.is_err() {
            let _ = self.updates.send(IngestUpdate::Abandoned { id: record.id });
        }
        queued
    }

    /// Undo a submission whose job never reached the queue.
    ///
    /// If the record cannot be removed it stays `PENDING` and is queued by
    /// the next [`recover`](Self::recover).
    async fn withdraw(&self, record: &DocumentRecord) {
        let id = record.id;
        let what = format!("withdrawal of {id}");
        match self.retry.run(&what, move |_| self.metadata.delete(id)).await {
            Ok(_) => {
                if let Err(e) = self.blobs.delete(id).await {
                    warn!("Could not remove bytes of withdrawn {}: {}", id, e);
                }
            }
            Err(e) => warn!("Document {} stays pending until recovery: {}", id, e),
        }
    }

    /// Put back the `FAILED` record of a resubmission that was not queued.
    async fn restore_failed(&self, previous: &DocumentRecord) {
        let id = previous.id;
        let what = format!("restoring {id} to {}", previous.status);
        let restored = self
            .retry
            .run(&what, move |_| {
                self.metadata
                    .compare_and_swap(DocumentStatus::Pending, previous)
            })
            .await;
        match restored {
            Ok(CasOutcome::Applied) => debug!("Document {} is {} again", id, previous.status),
            Ok(outcome) => warn!("Could not restore document {}: {:?}", id, outcome),
            Err(e) => warn!("Document {} stays pending until recovery: {}", id, e),
        }
    }
}
