//! Integration tests for the full docsift pipeline.
//!
//! Tests the complete flow: submit → extract → embed → index → search, with
//! in-memory stores and the hash embedder.

use async_trait::async_trait;
use docsift_core::{
    BlobStore, DocumentFormat, DocumentRecord, DocumentStatus, EmbedError, Embedder,
    EmbeddingConfig, EmbeddingOutput, Error, MetadataStore, VectorEntry, VectorIndex,
};
use docsift_embed::HashEmbedder;
use docsift_extract::{ExtractorRegistry, TesseractRecognizer};
use docsift_ingest::{
    IngestConfig, IngestServices, IngestUpdate, IngestionCoordinator, RecoveryReport,
    RetryPolicy, INTERRUPTED_DETAIL,
};
use docsift_query::{SearchConfig, SearchProcessor};
use docsift_store::{FsBlobStore, MemoryBlobStore, MemoryMetadataStore, MemoryVectorIndex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::Semaphore;
use uuid::Uuid;

const TEST_DIM: usize = 384;
const WAIT: Duration = Duration::from_secs(10);

const FOX: &str = "the quick brown fox jumps over the lazy dog";
const MARKET: &str = "quarterly stock market report with revenue figures";
const CATS: &str = "cats sleep on warm windowsills";

// ==================== Mock Embedders ====================

/// Hash embedder that blocks until the test opens the gate.
struct GatedEmbedder {
    inner: HashEmbedder,
    gate: Semaphore,
}

impl GatedEmbedder {
    fn new() -> Self {
        Self {
            inner: HashEmbedder::new(TEST_DIM),
            gate: Semaphore::new(0),
        }
    }

    fn open(&self) {
        self.gate.add_permits(1_000);
    }
}

#[async_trait]
impl Embedder for GatedEmbedder {
    fn model_name(&self) -> &str {
        "gated"
    }

    fn dimension(&self) -> usize {
        TEST_DIM
    }

    fn max_tokens(&self) -> usize {
        512
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| EmbedError::Unavailable("gate closed".to_string()))?;
        self.inner.embed_text(texts, config).await
    }
}

/// Hash embedder whose first call fails.
struct FailOnceEmbedder {
    inner: HashEmbedder,
    failed: AtomicBool,
}

impl FailOnceEmbedder {
    fn new() -> Self {
        Self {
            inner: HashEmbedder::new(TEST_DIM),
            failed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Embedder for FailOnceEmbedder {
    fn model_name(&self) -> &str {
        "fail-once"
    }

    fn dimension(&self) -> usize {
        TEST_DIM
    }

    fn max_tokens(&self) -> usize {
        512
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(EmbedError::Unavailable("model offline".to_string()));
        }
        self.inner.embed_text(texts, config).await
    }
}

// ==================== Harness ====================

struct Stores {
    metadata: Arc<MemoryMetadataStore>,
    index: Arc<MemoryVectorIndex>,
    blobs: Arc<dyn BlobStore>,
}

impl Stores {
    fn in_memory() -> Self {
        Self {
            metadata: Arc::new(MemoryMetadataStore::new()),
            index: Arc::new(MemoryVectorIndex::new(TEST_DIM)),
            blobs: Arc::new(MemoryBlobStore::new()),
        }
    }
}

struct Pipeline {
    coordinator: IngestionCoordinator,
    search: SearchProcessor,
    stores: Stores,
}

impl Pipeline {
    async fn ingest(&self, text: &str, name: &str) -> DocumentRecord {
        let record = self
            .coordinator
            .submit(text.as_bytes(), "plaintext", name)
            .await
            .unwrap();
        self.coordinator.wait_for(record.id, WAIT).await.unwrap()
    }

    async fn search_ids(&self, query: &str, k: Option<usize>) -> Vec<Uuid> {
        self.search
            .search(query, k)
            .await
            .unwrap()
            .iter()
            .map(|hit| hit.record.id)
            .collect()
    }

    /// Every record has a vector exactly when it is `COMPLETE`.
    async fn assert_index_matches_records(&self) {
        for record in self.stores.metadata.list(None).await.unwrap() {
            let indexed = self.stores.index.contains(record.id).await.unwrap();
            assert_eq!(
                indexed,
                record.status == DocumentStatus::Complete,
                "{} is {} but indexed={}",
                record.original_name,
                record.status,
                indexed
            );
        }
    }
}

fn test_config() -> IngestConfig {
    IngestConfig {
        workers: 2,
        capability_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        },
        ..Default::default()
    }
}

async fn start(stores: Stores, embedder: Arc<dyn Embedder>) -> Pipeline {
    let metadata: Arc<dyn MetadataStore> = stores.metadata.clone();
    let index: Arc<dyn VectorIndex> = stores.index.clone();

    // No OCR engine is installed under this name.
    let recognizer = TesseractRecognizer::new("docsift-test-no-such-ocr", "eng");
    let extractors = Arc::new(ExtractorRegistry::with_defaults(Arc::new(recognizer)));

    let coordinator = IngestionCoordinator::start(
        IngestServices {
            metadata: Arc::clone(&metadata),
            index: Arc::clone(&index),
            blobs: Arc::clone(&stores.blobs),
            extractors,
            embedder,
        },
        test_config(),
    )
    .await
    .unwrap();

    let search = SearchProcessor::new(
        metadata,
        index,
        Arc::new(HashEmbedder::new(TEST_DIM)),
        SearchConfig::default(),
    );

    Pipeline {
        coordinator,
        search,
        stores,
    }
}

async fn pipeline() -> Pipeline {
    start(Stores::in_memory(), Arc::new(HashEmbedder::new(TEST_DIM))).await
}

// ==================== Scenarios ====================

#[tokio::test]
async fn test_submitted_document_becomes_searchable() {
    let p = pipeline().await;

    let submitted = p
        .coordinator
        .submit(FOX.as_bytes(), "plaintext", "fox.txt")
        .await
        .unwrap();
    assert_eq!(submitted.status, DocumentStatus::Pending);
    assert_eq!(submitted.attempts, 1);
    assert!(submitted.error_detail.is_none());

    let done = p.coordinator.wait_for(submitted.id, WAIT).await.unwrap();
    assert_eq!(done.status, DocumentStatus::Complete);
    assert!(p.stores.index.contains(done.id).await.unwrap());

    let market = p.ingest(MARKET, "market.txt").await;
    let cats = p.ingest(CATS, "cats.txt").await;
    assert_eq!(market.status, DocumentStatus::Complete);
    assert_eq!(cats.status, DocumentStatus::Complete);

    let ids = p.search_ids("a fast fox", None).await;
    assert_eq!(ids.first(), Some(&submitted.id));
}

#[tokio::test]
async fn test_corrupt_pdf_fails_without_vector() {
    let p = pipeline().await;

    let headerless = p
        .coordinator
        .submit(b"definitely not a pdf", "pdf", "broken.pdf")
        .await
        .unwrap();
    let truncated = p
        .coordinator
        .submit(b"%PDF-1.7\n%%EOF", "pdf", "truncated.pdf")
        .await
        .unwrap();

    for id in [headerless.id, truncated.id] {
        let record = p.coordinator.wait_for(id, WAIT).await.unwrap();
        assert_eq!(record.status, DocumentStatus::Failed);
        let detail = record.error_detail.unwrap_or_default();
        assert!(!detail.is_empty());
        assert!(!p.stores.index.contains(id).await.unwrap());
    }

    let fox = p.ingest(FOX, "fox.txt").await;
    let ids = p.search_ids("pdf broken", Some(10)).await;
    assert_eq!(ids, vec![fox.id]);
}

#[tokio::test]
async fn test_resubmit_while_in_flight_is_rejected() {
    let embedder = Arc::new(GatedEmbedder::new());
    let p = start(Stores::in_memory(), embedder.clone()).await;

    let record = p
        .coordinator
        .submit(FOX.as_bytes(), "plaintext", "fox.txt")
        .await
        .unwrap();

    match p.coordinator.resubmit(record.id).await {
        Err(Error::NotResubmittable { id, status }) => {
            assert_eq!(id, record.id);
            assert!(matches!(
                status,
                DocumentStatus::Pending | DocumentStatus::Processing
            ));
        }
        other => panic!("Expected NotResubmittable, got {other:?}"),
    }

    embedder.open();
    let done = p.coordinator.wait_for(record.id, WAIT).await.unwrap();
    assert_eq!(done.status, DocumentStatus::Complete);
    assert_eq!(done.attempts, 1);

    assert!(matches!(
        p.coordinator.resubmit(record.id).await,
        Err(Error::NotResubmittable {
            status: DocumentStatus::Complete,
            ..
        })
    ));
}

#[tokio::test]
async fn test_top_one_result() {
    let p = pipeline().await;
    p.ingest(FOX, "fox.txt").await;
    let market = p.ingest(MARKET, "market.txt").await;
    p.ingest(CATS, "cats.txt").await;

    let hits = p.search.search("stock market revenue", Some(1)).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, market.id);
    assert_eq!(hits[0].record.original_name, "market.txt");
    assert!(hits[0].score > 0.0);
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let p = pipeline().await;
    p.ingest(FOX, "fox.txt").await;

    for query in ["", "   ", "\n\t"] {
        let result = p.search.search(query, Some(5)).await;
        assert!(matches!(result, Err(Error::EmptyQuery)), "query {query:?}");
    }
}

// ==================== Submission ====================

#[tokio::test]
async fn test_unsupported_format_rejected_without_record() {
    let p = pipeline().await;

    let result = p.coordinator.submit(b"a,b,c", "xlsx", "sheet.xlsx").await;

    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    assert!(p.coordinator.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_format_aliases_accepted() {
    let p = pipeline().await;

    let record = p
        .coordinator
        .submit(CATS.as_bytes(), " TXT ", "cats")
        .await
        .unwrap();

    assert_eq!(record.format, DocumentFormat::PlainText);
    let done = p.coordinator.wait_for(record.id, WAIT).await.unwrap();
    assert_eq!(done.status, DocumentStatus::Complete);
}

#[tokio::test]
async fn test_image_without_ocr_engine_fails() {
    let p = pipeline().await;

    let record = p
        .coordinator
        .submit(b"\x89PNG not really", "image", "scan.png")
        .await
        .unwrap();
    let done = p.coordinator.wait_for(record.id, WAIT).await.unwrap();

    assert_eq!(done.status, DocumentStatus::Failed);
    assert!(done.error_detail.is_some());
    assert!(!p.stores.index.contains(record.id).await.unwrap());
}

#[tokio::test]
async fn test_status_of_unknown_document() {
    let p = pipeline().await;
    let id = Uuid::new_v4();

    assert!(matches!(
        p.coordinator.status(id).await,
        Err(Error::NotFound(missing)) if missing == id
    ));
    assert!(matches!(
        p.coordinator.resubmit(id).await,
        Err(Error::NotFound(_))
    ));
}

// ==================== Resubmission ====================

#[tokio::test]
async fn test_failed_document_resubmits_once() {
    let p = start(Stores::in_memory(), Arc::new(FailOnceEmbedder::new())).await;

    let failed = p.ingest(FOX, "fox.txt").await;
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert!(failed
        .error_detail
        .as_deref()
        .is_some_and(|d| d.contains("unavailable")));
    assert!(p.search_ids("fox", None).await.is_empty());

    let (first, second) = tokio::join!(
        p.coordinator.resubmit(failed.id),
        p.coordinator.resubmit(failed.id)
    );
    let accepted: Vec<_> = [first, second]
        .into_iter()
        .filter_map(|result| match result {
            Ok(record) => Some(record),
            Err(Error::NotResubmittable { .. }) => None,
            Err(e) => panic!("Unexpected error: {e}"),
        })
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].status, DocumentStatus::Pending);
    assert_eq!(accepted[0].attempts, 2);
    assert!(accepted[0].error_detail.is_none());

    let done = p.coordinator.wait_for(failed.id, WAIT).await.unwrap();
    assert_eq!(done.status, DocumentStatus::Complete);
    assert_eq!(done.attempts, 2);
    assert_eq!(p.search_ids("fox", None).await, vec![failed.id]);
}

// ==================== Consistency ====================

#[tokio::test]
async fn test_index_holds_exactly_the_complete_documents() {
    let p = pipeline().await;

    let mut ids = Vec::new();
    for (bytes, format, name) in [
        (FOX.as_bytes(), "plaintext", "fox.txt"),
        (b"garbage".as_slice(), "pdf", "bad.pdf"),
        (MARKET.as_bytes(), "plaintext", "market.txt"),
        (b"   \n  ".as_slice(), "plaintext", "blank.txt"),
        (b"PK\x03\x04 truncated".as_slice(), "docx", "bad.docx"),
        (CATS.as_bytes(), "plaintext", "cats.txt"),
    ] {
        ids.push(p.coordinator.submit(bytes, format, name).await.unwrap().id);
    }
    for id in &ids {
        let record = p.coordinator.wait_for(*id, WAIT).await.unwrap();
        assert!(record.status.is_terminal());
    }

    p.assert_index_matches_records().await;

    let stats = p.coordinator.stats().await.unwrap();
    assert_eq!(stats.documents.complete, 3);
    assert_eq!(stats.documents.failed, 3);
    assert_eq!(stats.documents.total(), 6);
    assert_eq!(stats.vectors, 3);

    let failed = p
        .coordinator
        .list(Some(DocumentStatus::Failed))
        .await
        .unwrap();
    assert!(failed.iter().all(|r| r.error_detail.is_some()));
}

#[tokio::test]
async fn test_search_ignores_vectors_without_complete_record() {
    let p = pipeline().await;
    let fox = p.ingest(FOX, "fox.txt").await;

    let embedder = HashEmbedder::new(TEST_DIM);
    let stray = Uuid::new_v4();
    p.stores
        .index
        .upsert(&VectorEntry::new(stray, embedder.embed_sync(FOX)))
        .await
        .unwrap();

    let pending = DocumentRecord::new("pending.txt", DocumentFormat::PlainText, FOX.as_bytes());
    p.stores.metadata.insert(&pending).await.unwrap();
    p.stores
        .index
        .upsert(&VectorEntry::new(pending.id, embedder.embed_sync(FOX)))
        .await
        .unwrap();

    let ids = p.search_ids("quick brown fox", Some(10)).await;
    assert_eq!(ids, vec![fox.id]);
}

#[tokio::test]
async fn test_search_is_deterministic_and_never_padded() {
    let p = pipeline().await;
    p.ingest(FOX, "fox.txt").await;
    p.ingest(MARKET, "market.txt").await;

    let first = p.search.search("brown fox", Some(10)).await.unwrap();
    let second = p.search.search("brown fox", Some(10)).await.unwrap();

    assert_eq!(first.len(), 2);
    let ranked: Vec<(Uuid, f32)> = first.iter().map(|h| (h.record.id, h.score)).collect();
    let again: Vec<(Uuid, f32)> = second.iter().map(|h| (h.record.id, h.score)).collect();
    assert_eq!(ranked, again);
    assert!(first[0].score >= first[1].score);
}

#[tokio::test]
async fn test_delete_removes_document_from_search() {
    let p = pipeline().await;
    let fox = p.ingest(FOX, "fox.txt").await;
    assert_eq!(p.search_ids("fox", None).await, vec![fox.id]);

    p.coordinator.delete(fox.id).await.unwrap();

    assert!(matches!(
        p.coordinator.status(fox.id).await,
        Err(Error::NotFound(_))
    ));
    assert!(!p.stores.index.contains(fox.id).await.unwrap());
    assert!(p.stores.blobs.get(fox.id).await.unwrap().is_none());
    assert!(p.search_ids("fox", None).await.is_empty());
    assert!(matches!(
        p.coordinator.delete(fox.id).await,
        Err(Error::NotFound(_))
    ));
}

// ==================== Lifecycle ====================

#[tokio::test]
async fn test_updates_follow_lifecycle_order() {
    let p = pipeline().await;
    let mut updates = p.coordinator.subscribe();

    let record = p
        .coordinator
        .submit(FOX.as_bytes(), "plaintext", "fox.txt")
        .await
        .unwrap();

    let mut seen = Vec::new();
    tokio::time::timeout(WAIT, async {
        loop {
            let update = updates.recv().await.unwrap();
            if update.id() != record.id {
                continue;
            }
            let last = update.is_final();
            seen.push(update);
            if last {
                break;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(
        seen,
        vec![
            IngestUpdate::Queued {
                id: record.id,
                attempt: 1
            },
            IngestUpdate::Processing { id: record.id },
            IngestUpdate::Completed { id: record.id },
        ]
    );
}

#[tokio::test]
async fn test_many_documents_all_complete() {
    let p = pipeline().await;

    let mut ids = Vec::new();
    for i in 0..20 {
        let text = format!("{FOX} number {i}");
        let record = p
            .coordinator
            .submit(text.as_bytes(), "plaintext", &format!("doc_{i}.txt"))
            .await
            .unwrap();
        ids.push(record.id);
    }

    p.coordinator.shutdown().await;

    for id in ids {
        let record = p.coordinator.status(id).await.unwrap();
        assert_eq!(record.status, DocumentStatus::Complete);
    }
    assert_eq!(p.coordinator.stats().await.unwrap().vectors, 20);
    assert!(matches!(
        p.coordinator.submit(CATS.as_bytes(), "plaintext", "late.txt").await,
        Err(Error::QueueClosed)
    ));
    assert_eq!(p.coordinator.list(None).await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_recover_repairs_previous_run() {
    let stores = Stores::in_memory();
    let embedder = HashEmbedder::new(TEST_DIM);

    // State left behind by a process that died mid-run.
    let pending = DocumentRecord::new("cats.txt", DocumentFormat::PlainText, CATS.as_bytes());
    stores.metadata.insert(&pending).await.unwrap();
    stores.blobs.put(pending.id, CATS.as_bytes()).await.unwrap();

    let mut interrupted =
        DocumentRecord::new("fox.txt", DocumentFormat::PlainText, FOX.as_bytes());
    interrupted.status = DocumentStatus::Processing;
    stores.metadata.insert(&interrupted).await.unwrap();
    stores.blobs.put(interrupted.id, FOX.as_bytes()).await.unwrap();

    let orphan = Uuid::new_v4();
    stores
        .index
        .upsert(&VectorEntry::new(orphan, embedder.embed_sync(MARKET)))
        .await
        .unwrap();

    let p = start(stores, Arc::new(embedder)).await;
    let report = p.coordinator.recover().await.unwrap();

    assert_eq!(
        report,
        RecoveryReport {
            requeued: 1,
            interrupted: 1,
            orphans_removed: 1,
        }
    );

    let failed = p.coordinator.status(interrupted.id).await.unwrap();
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert_eq!(failed.error_detail.as_deref(), Some(INTERRUPTED_DETAIL));

    let done = p.coordinator.wait_for(pending.id, WAIT).await.unwrap();
    assert_eq!(done.status, DocumentStatus::Complete);
    assert!(!p.stores.index.contains(orphan).await.unwrap());
    p.assert_index_matches_records().await;

    // The interrupted document can be retried from its stored bytes.
    p.coordinator.resubmit(interrupted.id).await.unwrap();
    let retried = p.coordinator.wait_for(interrupted.id, WAIT).await.unwrap();
    assert_eq!(retried.status, DocumentStatus::Complete);
}

#[tokio::test]
async fn test_pipeline_with_filesystem_blobs() {
    let dir = tempdir().unwrap();
    let stores = Stores {
        metadata: Arc::new(MemoryMetadataStore::new()),
        index: Arc::new(MemoryVectorIndex::new(TEST_DIM)),
        blobs: Arc::new(FsBlobStore::new(dir.path().join("blobs"))),
    };
    let p = start(stores, Arc::new(HashEmbedder::new(TEST_DIM))).await;

    let market = p.ingest(MARKET, "market.txt").await;

    assert_eq!(market.status, DocumentStatus::Complete);
    assert!(dir.path().join("blobs").join(market.id.to_string()).exists());
    assert_eq!(
        p.search_ids("stock market revenue", Some(1)).await,
        vec![market.id]
    );
}

#[tokio::test]
async fn test_dimension_mismatch_refuses_to_start() {
    let stores = Stores::in_memory();
    let metadata: Arc<dyn MetadataStore> = stores.metadata.clone();
    let index: Arc<dyn VectorIndex> = stores.index.clone();

    let result = IngestionCoordinator::start(
        IngestServices {
            metadata,
            index,
            blobs: stores.blobs,
            extractors: Arc::new(ExtractorRegistry::new()),
            embedder: Arc::new(HashEmbedder::new(64)),
        },
        test_config(),
    )
    .await;

    assert!(matches!(
        result,
        Err(Error::Embedding(EmbedError::DimensionMismatch {
            expected: 384,
            actual: 64
        }))
    ));
}
