//! `LanceDB` implementation of `MetadataStore` and `VectorIndex`.
//!
//! Records and vectors live in two tables of the same database. `LanceDB` has
//! no row-level update, so replacing a row is delete-then-add. Every write
//! to a table goes through that table's mutex, which makes
//! [`compare_and_swap`](MetadataStore::compare_and_swap) atomic for all
//! writers sharing this `LanceStore`.

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array, UInt64Array,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use docsift_core::{
    CasOutcome, DocumentRecord, DocumentStatus, MetadataStore, ScoredId, StoreError,
    VectorEntry, VectorIndex,
};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::memory::rank_candidates;
use crate::schema::{records_schema, vectors_schema, RECORDS_TABLE, VECTORS_TABLE};

/// LanceDB-backed record store and vector index.
pub struct LanceStore {
    /// Path to the `LanceDB` database
    db_path: PathBuf,
    /// Embedding dimension
    embedding_dim: usize,
    /// Database connection (lazy initialized)
    connection: RwLock<Option<Connection>>,
    /// Records table handle
    records_table: RwLock<Option<Table>>,
    /// Vectors table handle
    vectors_table: RwLock<Option<Table>>,
    /// Record writes hold it exclusively and reads shared, so a reader never
    /// sees the gap inside a row replacement
    records_lock: RwLock<()>,
    /// Serializes vector writes
    vectors_lock: Mutex<()>,
}

impl LanceStore {
    /// Create a new `LanceStore`.
    #[must_use]
    pub fn new(db_path: PathBuf, embedding_dim: usize) -> Self {
        Self {
            db_path,
            embedding_dim,
            connection: RwLock::new(None),
            records_table: RwLock::new(None),
            vectors_table: RwLock::new(None),
            records_lock: RwLock::new(()),
            vectors_lock: Mutex::new(()),
        }
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get the embedding dimension.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Create the database directory and any missing tables.
    pub async fn open(&self) -> Result<(), StoreError> {
        info!("Initializing LanceDB at {:?}", self.db_path);

        if let Some(parent) = self.db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Init(format!("Failed to create db directory: {e}")))?;
        }

        let conn = self.get_connection().await?;

        let tables = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to list tables: {e}")))?;

        if !tables.iter().any(|t| t == RECORDS_TABLE) {
            info!("Creating records table");
            conn.create_empty_table(RECORDS_TABLE, Arc::new(records_schema()))
                .execute()
                .await
                .map_err(|e| StoreError::Init(format!("Failed to create records table: {e}")))?;
        }

        if !tables.iter().any(|t| t == VECTORS_TABLE) {
            info!("Creating vectors table (dimension: {})", self.embedding_dim);
            conn.create_empty_table(VECTORS_TABLE, Arc::new(vectors_schema(self.embedding_dim)))
                .execute()
                .await
                .map_err(|e| StoreError::Init(format!("Failed to create vectors table: {e}")))?;
        }

        Ok(())
    }

    /// Get or create connection.
    async fn get_connection(&self) -> Result<Connection, StoreError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn = self.connection.write().await;
        if let Some(ref c) = *conn {
            return Ok(c.clone());
        }

        let db_path_str = self.db_path.to_string_lossy().to_string();
        let new_conn = connect(&db_path_str)
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to connect to LanceDB: {e}")))?;
        *conn = Some(new_conn.clone());
        Ok(new_conn)
    }

    /// Get or open a table, caching the handle in `slot`.
    async fn get_table(
        &self,
        slot: &RwLock<Option<Table>>,
        name: &str,
    ) -> Result<Table, StoreError> {
        {
            let table = slot.read().await;
            if let Some(ref t) = *table {
                return Ok(t.clone());
            }
        }

        let conn = self.get_connection().await?;
        let mut table_lock = slot.write().await;
        if let Some(ref t) = *table_lock {
            return Ok(t.clone());
        }

        let t = conn
            .open_table(name)
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to open {name} table: {e}")))?;
        *table_lock = Some(t.clone());
        Ok(t)
    }

    async fn records(&self) -> Result<Table, StoreError> {
        self.get_table(&self.records_table, RECORDS_TABLE).await
    }

    async fn vectors(&self) -> Result<Table, StoreError> {
        self.get_table(&self.vectors_table, VECTORS_TABLE).await
    }

    /// Read every row matching `filter` (all rows if `None`).
    async fn scan(
        table: &Table,
        filter: Option<String>,
    ) -> Result<Vec<RecordBatch>, StoreError> {
        let total = table
            .count_rows(filter.clone())
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count rows: {e}")))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut query = table.query().limit(total);
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to execute query: {e}")))?;

        let mut batches = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch rows: {e}")))?
        {
            batches.push(batch);
        }
        Ok(batches)
    }

    async fn fetch_record(
        &self,
        table: &Table,
        id: Uuid,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let mut records = Vec::new();
        for batch in Self::scan(table, Some(id_filter(id))).await? {
            records.extend(batch_to_records(&batch)?);
        }
        Ok(records.into_iter().next())
    }

    async fn write_record(&self, table: &Table, record: &DocumentRecord) -> Result<(), StoreError> {
        let batch = record_to_batch(record)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StoreError::Insert(format!("Failed to insert record: {e}")))?;
        Ok(())
    }

    /// Convert a vector entry to Arrow `RecordBatch`.
    fn entry_to_batch(&self, entry: &VectorEntry) -> Result<RecordBatch, StoreError> {
        let schema = Arc::new(vectors_schema(self.embedding_dim));
        let vector_array = build_vector_array(&[&entry.vector], self.embedding_dim);

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![entry.id.to_string()])),
                vector_array,
                Arc::new(StringArray::from(vec![timestamp(&entry.indexed_at)])),
            ],
        )
        .map_err(|e| StoreError::Insert(format!("Failed to create vector RecordBatch: {e}")))
    }
}

#[async_trait]
impl MetadataStore for LanceStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.open().await
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        let table = self.records().await?;
        let _guard = self.records_lock.write().await;

        if self.fetch_record(&table, record.id).await?.is_some() {
            return Err(StoreError::Duplicate(record.id));
        }
        self.write_record(&table, record).await?;

        debug!("Inserted record {}", record.id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>, StoreError> {
        let table = self.records().await?;
        let _guard = self.records_lock.read().await;
        self.fetch_record(&table, id).await
    }

    async fn compare_and_swap(
        &self,
        expected: DocumentStatus,
        record: &DocumentRecord,
    ) -> Result<CasOutcome, StoreError> {
        let table = self.records().await?;
        let _guard = self.records_lock.write().await;

        let Some(current) = self.fetch_record(&table, record.id).await? else {
            return Ok(CasOutcome::NotFound);
        };
        if current.status != expected {
            return Ok(CasOutcome::Conflict(current.status));
        }

        table
            .delete(&id_filter(record.id))
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to replace record: {e}")))?;
        if let Err(e) = self.write_record(&table, record).await {
            // Put the previous row back so the record never disappears.
            self.write_record(&table, &current).await?;
            return Err(e);
        }

        debug!("Record {} {} -> {}", record.id, expected, record.status);
        Ok(CasOutcome::Applied)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let table = self.records().await?;
        let _guard = self.records_lock.write().await;

        if self.fetch_record(&table, id).await?.is_none() {
            return Ok(false);
        }
        table
            .delete(&id_filter(id))
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to delete record: {e}")))?;
        Ok(true)
    }

    async fn list(
        &self,
        status: Option<DocumentStatus>,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let table = self.records().await?;
        let filter = status.map(|s| format!("status = '{}'", s.as_str()));

        let mut records = Vec::new();
        {
            let _guard = self.records_lock.read().await;
            for batch in Self::scan(&table, filter).await? {
                records.extend(batch_to_records(&batch)?);
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }
}

#[async_trait]
impl VectorIndex for LanceStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.open().await
    }

    fn dimension(&self) -> usize {
        self.embedding_dim
    }

    async fn upsert(&self, entry: &VectorEntry) -> Result<(), StoreError> {
        if entry.vector.len() != self.embedding_dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: entry.vector.len(),
            });
        }

        let table = self.vectors().await?;
        let batch = self.entry_to_batch(entry)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let _guard = self.vectors_lock.lock().await;
        table
            .delete(&id_filter(entry.id))
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to replace vector: {e}")))?;
        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StoreError::Insert(format!("Failed to insert vector: {e}")))?;

        debug!("Upserted vector for {}", entry.id);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let table = self.vectors().await?;
        let _guard = self.vectors_lock.lock().await;

        let existing = table
            .count_rows(Some(id_filter(id)))
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count vectors: {e}")))?;
        if existing == 0 {
            return Ok(false);
        }
        table
            .delete(&id_filter(id))
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to delete vector: {e}")))?;
        Ok(true)
    }

    async fn contains(&self, id: Uuid) -> Result<bool, StoreError> {
        let table = self.vectors().await?;
        let count = table
            .count_rows(Some(id_filter(id)))
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count vectors: {e}")))?;
        Ok(count > 0)
    }

    async fn ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let table = self.vectors().await?;
        let mut ids = Vec::new();
        for batch in Self::scan(&table, None).await? {
            let column = string_column(&batch, "id")?;
            for i in 0..batch.num_rows() {
                ids.push(parse_uuid(column.value(i))?);
            }
        }
        Ok(ids)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredId>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.embedding_dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: vector.len(),
            });
        }

        let table = self.vectors().await?;
        if VectorIndex::count(self).await? == 0 {
            return Ok(Vec::new());
        }

        let mut results = table
            .vector_search(vector.to_vec())
            .map_err(|e| StoreError::Query(format!("Failed to create search query: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to execute search: {e}")))?;

        let mut candidates = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch results: {e}")))?
        {
            candidates.extend(batch_to_scored(&batch)?);
        }

        rank_candidates(&mut candidates);
        candidates.truncate(k);
        debug!("Vector query returned {} candidates", candidates.len());
        Ok(candidates)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let table = self.vectors().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count vectors: {e}")))?;
        Ok(count as u64)
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn id_filter(id: Uuid) -> String {
    format!("id = '{id}'")
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Schema(format!("invalid timestamp {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Schema(format!("invalid id {s:?}: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Schema(format!("missing column {name}")))
}

fn build_vector_array(vectors: &[&Vec<f32>], dim: usize) -> ArrayRef {
    use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};

    let mut builder = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);
    for values in vectors {
        let values_builder = builder.values();
        for &v in values.iter() {
            values_builder.append_value(v);
        }
        builder.append(true);
    }

    let array: FixedSizeListArray = builder.finish();
    Arc::new(array)
}

/// Convert a document record to Arrow `RecordBatch`.
fn record_to_batch(record: &DocumentRecord) -> Result<RecordBatch, StoreError> {
    let schema = Arc::new(records_schema());

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec![record.id.to_string()])),
            Arc::new(StringArray::from(vec![record.original_name.clone()])),
            Arc::new(StringArray::from(vec![record.format.as_str()])),
            Arc::new(StringArray::from(vec![record.status.as_str()])),
            Arc::new(StringArray::from(vec![record.error_detail.clone()])),
            Arc::new(UInt32Array::from(vec![record.attempts])),
            Arc::new(UInt64Array::from(vec![record.size_bytes])),
            Arc::new(StringArray::from(vec![record.content_hash.clone()])),
            Arc::new(StringArray::from(vec![timestamp(&record.created_at)])),
            Arc::new(StringArray::from(vec![timestamp(&record.updated_at)])),
        ],
    )
    .map_err(|e| StoreError::Insert(format!("Failed to create record RecordBatch: {e}")))
}

fn batch_to_records(batch: &RecordBatch) -> Result<Vec<DocumentRecord>, StoreError> {
    let ids = string_column(batch, "id")?;
    let names = string_column(batch, "original_name")?;
    let formats = string_column(batch, "format")?;
    let statuses = string_column(batch, "status")?;
    let details = string_column(batch, "error_detail")?;
    let hashes = string_column(batch, "content_hash")?;
    let created_ats = string_column(batch, "created_at")?;
    let updated_ats = string_column(batch, "updated_at")?;
    let attempts = batch
        .column_by_name("attempts")
        .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| StoreError::Schema("missing column attempts".to_string()))?;
    let sizes = batch
        .column_by_name("size_bytes")
        .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
        .ok_or_else(|| StoreError::Schema("missing column size_bytes".to_string()))?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let format = formats
            .value(i)
            .parse()
            .map_err(|e| StoreError::Schema(format!("{e}")))?;
        let status = statuses
            .value(i)
            .parse()
            .map_err(|e| StoreError::Schema(format!("{e}")))?;
        let error_detail = if details.is_null(i) {
            None
        } else {
            Some(details.value(i).to_string())
        };

        records.push(DocumentRecord {
            id: parse_uuid(ids.value(i))?,
            original_name: names.value(i).to_string(),
            format,
            status,
            error_detail,
            size_bytes: sizes.value(i),
            content_hash: hashes.value(i).to_string(),
            attempts: attempts.value(i),
            created_at: parse_timestamp(created_ats.value(i))?,
            updated_at: parse_timestamp(updated_ats.value(i))?,
        });
    }

    Ok(records)
}

fn batch_to_scored(batch: &RecordBatch) -> Result<Vec<ScoredId>, StoreError> {
    let ids = string_column(batch, "id")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut scored = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        // Cosine distance is 1 - similarity.
        let score = distances.map_or(0.0, |d| 1.0 - d.value(i));
        scored.push(ScoredId {
            id: parse_uuid(ids.value(i))?,
            score,
        });
    }
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsift_core::{lifecycle, DocumentFormat};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    const TEST_DIM: usize = 8;

    fn create_store(dir: &Path) -> LanceStore {
        LanceStore::new(dir.join("test.lance"), TEST_DIM)
    }

    fn unit_vector(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; TEST_DIM];
        v[axis] = 1.0;
        v
    }

    fn create_test_record(name: &str) -> DocumentRecord {
        DocumentRecord::new(name, DocumentFormat::PlainText, name.as_bytes())
    }

    #[tokio::test]
    async fn test_init_creates_tables() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());

        let result = MetadataStore::init(&store).await;
        assert!(result.is_ok(), "Init failed: {:?}", result.err());

        let conn = store.get_connection().await.unwrap();
        let tables = conn.table_names().execute().await.unwrap();
        assert!(tables.contains(&RECORDS_TABLE.to_string()));
        assert!(tables.contains(&VECTORS_TABLE.to_string()));
    }

    #[tokio::test]
    async fn test_init_idempotent() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());

        MetadataStore::init(&store).await.unwrap();
        assert!(VectorIndex::init(&store).await.is_ok());
    }

    #[tokio::test]
    async fn test_record_roundtrip() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        let record = create_test_record("notes.txt");
        store.insert(&record).await.unwrap();

        let fetched = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_fails() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        let record = create_test_record("notes.txt");
        store.insert(&record).await.unwrap();
        let err = store.insert(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        let record = create_test_record("notes.txt");
        store.insert(&record).await.unwrap();

        let processing = lifecycle::apply(&record, DocumentStatus::Processing, None).unwrap();
        let outcome = store
            .compare_and_swap(DocumentStatus::Pending, &processing)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Applied);

        let failed = lifecycle::apply(&processing, DocumentStatus::Failed, Some("boom")).unwrap();
        let outcome = store
            .compare_and_swap(DocumentStatus::Pending, &failed)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Conflict(DocumentStatus::Processing));

        let fetched = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Processing);
        assert_eq!(store.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reads_never_miss_record_during_swap() {
        let temp = tempdir().unwrap();
        let store = Arc::new(create_store(temp.path()));
        store.open().await.unwrap();

        let record = create_test_record("busy.txt");
        store.insert(&record).await.unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn({
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            async move {
                let mut reads = 0;
                loop {
                    assert!(store.get(record.id).await.unwrap().is_some());
                    assert_eq!(store.list(None).await.unwrap().len(), 1);
                    reads += 1;
                    if done.load(Ordering::SeqCst) {
                        return reads;
                    }
                    tokio::task::yield_now().await;
                }
            }
        });

        let mut current = record.clone();
        for _ in 0..10 {
            for to in [
                DocumentStatus::Processing,
                DocumentStatus::Failed,
                DocumentStatus::Pending,
            ] {
                let next = lifecycle::apply(&current, to, Some("retry")).unwrap();
                let outcome = store.compare_and_swap(current.status, &next).await.unwrap();
                assert_eq!(outcome, CasOutcome::Applied);
                current = next;
            }
        }
        done.store(true, Ordering::SeqCst);

        assert!(reader.await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_failed_record_keeps_detail() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        let record = create_test_record("scan.png");
        store.insert(&record).await.unwrap();
        let processing = lifecycle::apply(&record, DocumentStatus::Processing, None).unwrap();
        store
            .compare_and_swap(DocumentStatus::Pending, &processing)
            .await
            .unwrap();
        let failed =
            lifecycle::apply(&processing, DocumentStatus::Failed, Some("no extractable text"))
                .unwrap();
        store
            .compare_and_swap(DocumentStatus::Processing, &failed)
            .await
            .unwrap();

        let fetched = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.error_detail.as_deref(), Some("no extractable text"));

        let failed_list = store.list(Some(DocumentStatus::Failed)).await.unwrap();
        assert_eq!(failed_list.len(), 1);
        assert!(store.list(Some(DocumentStatus::Pending)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_record() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        let record = create_test_record("notes.txt");
        store.insert(&record).await.unwrap();
        assert!(MetadataStore::delete(&store, record.id).await.unwrap());
        assert!(!MetadataStore::delete(&store, record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_vector_upsert_and_query() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        store.upsert(&VectorEntry::new(near, unit_vector(0))).await.unwrap();
        store.upsert(&VectorEntry::new(far, unit_vector(1))).await.unwrap();

        let results = store.query(&unit_vector(0), 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, near);
        assert!((results[0].score - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_vector_upsert_replaces() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        let id = Uuid::new_v4();
        store.upsert(&VectorEntry::new(id, unit_vector(0))).await.unwrap();
        store.upsert(&VectorEntry::new(id, unit_vector(1))).await.unwrap();

        assert_eq!(VectorIndex::count(&store).await.unwrap(), 1);
        assert_eq!(store.ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_vector_dimension_mismatch() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        let err = store
            .upsert(&VectorEntry::new(Uuid::new_v4(), vec![1.0; TEST_DIM + 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_vector_delete_and_contains() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        let id = Uuid::new_v4();
        store.upsert(&VectorEntry::new(id, unit_vector(2))).await.unwrap();
        assert!(store.contains(id).await.unwrap());
        assert!(VectorIndex::delete(&store, id).await.unwrap());
        assert!(!store.contains(id).await.unwrap());
        assert!(!VectorIndex::delete(&store, id).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_empty_index() {
        let temp = tempdir().unwrap();
        let store = create_store(temp.path());
        store.open().await.unwrap();

        assert!(store.query(&unit_vector(0), 5).await.unwrap().is_empty());
    }
}
