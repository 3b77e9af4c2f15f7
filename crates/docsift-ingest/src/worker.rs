//! Bounded worker pool running ingestion jobs.
//!
//! Each job runs `extract → embed → upsert → COMPLETE`. The vector is always
//! written before `COMPLETE` is committed, and any vector that may exist is
//! removed before `FAILED` is committed after an upsert attempt.

use docsift_core::{
    BlobStore, DocumentRecord, DocumentStatus, EmbedError, Embedder, Error, ExtractError,
    VectorEntry, VectorIndex,
};
use docsift_extract::ExtractorRegistry;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::job::{IngestJob, IngestUpdate, JobOutcome};
use crate::state::{JobStateMachine, Transition};

/// Handles shared by every job.
pub struct WorkerContext {
    pub state: JobStateMachine,
    pub blobs: Arc<dyn BlobStore>,
    pub extractors: Arc<ExtractorRegistry>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub config: IngestConfig,
    pub updates: broadcast::Sender<IngestUpdate>,
}

/// Fixed-size pool consuming a bounded job queue.
pub struct WorkerPool {
    sender: RwLock<Option<mpsc::Sender<IngestJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    workers: usize,
}

impl WorkerPool {
    /// Start the pool. Must be called from within a tokio runtime.
    pub fn spawn(ctx: WorkerContext) -> Self {
        let workers = ctx.config.workers.max(1);
        let (sender, receiver) = mpsc::channel(ctx.config.queue_capacity.max(1));

        info!("Starting worker pool with {} workers", workers);
        let dispatcher = tokio::spawn(dispatch(Arc::new(ctx), receiver, workers));

        Self {
            sender: RwLock::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            workers,
        }
    }

    /// Number of jobs that may run at once.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Whether the pool still accepts jobs.
    pub async fn is_open(&self) -> bool {
        self.sender.read().await.is_some()
    }

    /// Queue a job. Waits while the queue is full.
    pub async fn enqueue(&self, job: IngestJob) -> Result<(), Error> {
        let sender = self.sender.read().await.clone().ok_or(Error::QueueClosed)?;
        sender.send(job).await.map_err(|_| Error::QueueClosed)
    }

    /// Stop accepting jobs and wait until every queued and running job has
    /// reached a terminal status.
    pub async fn shutdown(&self) {
        self.sender.write().await.take();

        let dispatcher = self.dispatcher.lock().await.take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                error!("Worker pool dispatcher failed: {}", e);
            }
        }
    }
}

async fn dispatch(
    ctx: Arc<WorkerContext>,
    mut receiver: mpsc::Receiver<IngestJob>,
    workers: usize,
) {
    let semaphore = Arc::new(Semaphore::new(workers));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let _permit = permit;
            run_isolated(ctx, job).await;
        });
    }

    // All permits free means no job is in flight.
    let _ = semaphore.acquire_many(workers as u32).await;
    info!("Worker pool stopped");
}

/// Run one job in its own task so a panic only fails that job.
async fn run_isolated(ctx: Arc<WorkerContext>, job: IngestJob) {
    let id = job.id;
    let task = tokio::spawn({
        let ctx = Arc::clone(&ctx);
        async move { process_job(&ctx, job).await }
    });

    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Job for document {} aborted: {}", id, e);
            ctx.settle_unknown(id, &format!("worker aborted: {e}")).await
        }
    };

    let _ = ctx.updates.send(outcome.to_update(id));
}

async fn process_job(ctx: &WorkerContext, job: IngestJob) -> JobOutcome {
    let id = job.id;
    let record = match ctx
        .state
        .transition(id, DocumentStatus::Pending, DocumentStatus::Processing, None)
        .await
    {
        Ok(Transition::Applied(record)) => record,
        Ok(Transition::Missing) => {
            debug!("Document {} was deleted before processing", id);
            return JobOutcome::Abandoned;
        }
        Ok(Transition::Conflict(status)) => {
            warn!("Skipping stale job for document {} (status {})", id, status);
            return JobOutcome::Abandoned;
        }
        Err(e) => {
            error!("Cannot claim document {}: {}", id, e);
            return JobOutcome::Abandoned;
        }
    };
    let _ = ctx.updates.send(IngestUpdate::Processing { id });

    debug!(
        "Processing {} ({}, attempt {})",
        record.original_name, record.format, job.attempt
    );

    let vector = match ctx.embed_document(&record).await {
        Ok(vector) => vector,
        Err(e) => return ctx.fail(id, &e.to_string()).await,
    };

    if let Err(e) = ctx.write_vector(id, vector).await {
        return ctx.fail_after_upsert(id, &e.to_string()).await;
    }

    match ctx
        .state
        .transition(id, DocumentStatus::Processing, DocumentStatus::Complete, None)
        .await
    {
        Ok(Transition::Applied(_)) => {
            info!("Ingested {} ({})", record.original_name, id);
            JobOutcome::Completed
        }
        Ok(Transition::Missing) => {
            debug!("Document {} was deleted during processing", id);
            ctx.remove_vector(id).await;
            JobOutcome::Abandoned
        }
        Ok(Transition::Conflict(status)) => {
            error!(
                "Document {} changed to {} while being processed",
                id, status
            );
            ctx.remove_vector(id).await;
            JobOutcome::Abandoned
        }
        Err(e) => {
            ctx.settle_unknown(id, &format!("could not record completion: {e}"))
                .await
        }
    }
}

impl WorkerContext {
    /// Extract and embed the stored bytes of `record`.
    async fn embed_document(&self, record: &DocumentRecord) -> Result<Vec<f32>, Error> {
        let limit = self.config.capability_timeout;

        let bytes = self.blobs.get(record.id).await?.ok_or_else(|| {
            ExtractError::Failed("stored document bytes are missing".to_string())
        })?;

        let content = timeout(limit, self.extractors.extract(record.format, &bytes))
            .await
            .map_err(|_| ExtractError::Timeout(limit))??;

        if content.meaningful_chars() < self.config.min_text_chars {
            return Err(ExtractError::NoText.into());
        }
        debug!(
            "Extracted {} chars from {}",
            content.text.len(),
            record.original_name
        );

        let outputs = timeout(
            limit,
            self.embedder
                .embed_text(&[content.text.as_str()], &self.config.embedding),
        )
        .await
        .map_err(|_| EmbedError::Timeout(limit))??;

        let embedding = outputs
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("embedder returned no vector".to_string()))?
            .embedding;

        let expected = self.index.dimension();
        if embedding.len() != expected {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            }
            .into());
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(
                EmbedError::Inference("embedding has non-finite values".to_string()).into(),
            );
        }
        // Text with no embeddable tokens yields the zero vector, which no
        // query can match.
        if embedding.iter().all(|&x| x == 0.0) {
            return Err(ExtractError::NoText.into());
        }

        Ok(embedding)
    }

    async fn write_vector(&self, id: Uuid, vector: Vec<f32>) -> Result<(), Error> {
        let limit = self.config.capability_timeout;
        let entry = VectorEntry::new(id, vector);

        match timeout(limit, self.index.upsert(&entry)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::IndexWrite(e.to_string())),
            Err(_) => Err(Error::IndexWrite(format!("upsert timed out after {limit:?}"))),
        }
    }

    /// Remove any vector for `id`. Returns whether the index confirmed it.
    async fn remove_vector(&self, id: Uuid) -> bool {
        let what = format!("vector cleanup for {id}");
        match self
            .config
            .retry
            .run(&what, move |_| self.index.delete(id))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!("Could not remove vector for document {}: {}", id, e);
                false
            }
        }
    }

    /// Commit `FAILED` for a job that never touched the index.
    async fn fail(&self, id: Uuid, detail: &str) -> JobOutcome {
        warn!("Document {} failed: {}", id, detail);

        match self
            .state
            .transition(id, DocumentStatus::Processing, DocumentStatus::Failed, Some(detail))
            .await
        {
            Ok(Transition::Applied(_)) => JobOutcome::Failed(detail.to_string()),
            Ok(Transition::Missing) => JobOutcome::Abandoned,
            Ok(Transition::Conflict(status)) => {
                warn!(
                    "Not recording failure of document {}: status is {}",
                    id, status
                );
                JobOutcome::Abandoned
            }
            Err(e) => {
                error!("Could not record failure of document {}: {}", id, e);
                JobOutcome::Failed(detail.to_string())
            }
        }
    }

    /// Remove a possibly written vector, then commit `FAILED`.
    async fn fail_after_upsert(&self, id: Uuid, detail: &str) -> JobOutcome {
        if !self.remove_vector(id).await {
            warn!(
                "Document {} may keep an orphaned vector until recovery",
                id
            );
        }
        self.fail(id, detail).await
    }

    /// End a job whose vector may be written and whose status is unknown.
    ///
    /// The vector is only removed once a read shows the record is not
    /// `COMPLETE`. If the status cannot be read the vector stays: a
    /// `PROCESSING` record is hidden from search and swept by recovery.
    async fn settle_unknown(&self, id: Uuid, detail: &str) -> JobOutcome {
        let what = format!("status check for {id}");
        let store = self.state.store();
        let current = self.config.retry.run(&what, move |_| store.get(id)).await;

        match current {
            Ok(Some(record)) if record.status == DocumentStatus::Complete => {
                info!("Document {} completed despite: {}", id, detail);
                JobOutcome::Completed
            }
            Ok(Some(record)) if record.status == DocumentStatus::Processing => {
                self.fail_after_upsert(id, detail).await
            }
            Ok(Some(record)) => {
                warn!(
                    "Document {} changed to {} while being processed",
                    id, record.status
                );
                self.remove_vector(id).await;
                JobOutcome::Abandoned
            }
            Ok(None) => {
                self.remove_vector(id).await;
                JobOutcome::Abandoned
            }
            Err(e) => {
                error!(
                    "Status of document {} is unknown ({}); leaving it to recovery: {}",
                    id, e, detail
                );
                JobOutcome::Abandoned
            }
        }
    }
}
