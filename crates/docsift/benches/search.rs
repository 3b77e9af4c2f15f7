//! Benchmarks for search latency.
//!
//! Measures raw index queries and full search requests (embedding, top-k and
//! record join) across different collection sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docsift_core::{
    DocumentFormat, DocumentRecord, DocumentStatus, Embedder, MetadataStore, VectorEntry,
    VectorIndex,
};
use docsift_embed::HashEmbedder;
use docsift_query::{SearchConfig, SearchProcessor};
use docsift_store::{MemoryMetadataStore, MemoryVectorIndex};
use std::sync::Arc;

const EMBEDDING_DIM: usize = 384;

const TOPICS: &[&str] = &[
    "invoice totals and payment terms",
    "network outage postmortem",
    "quarterly stock market revenue",
    "onboarding checklist for new hires",
    "database migration runbook",
];

/// Fill the stores with `count` complete documents.
async fn populate(
    metadata: &MemoryMetadataStore,
    index: &MemoryVectorIndex,
    embedder: &HashEmbedder,
    count: usize,
) {
    for i in 0..count {
        let text = format!("{} report number {i}", TOPICS[i % TOPICS.len()]);
        let mut record =
            DocumentRecord::new(&format!("doc_{i}.txt"), DocumentFormat::PlainText, text.as_bytes());
        record.status = DocumentStatus::Complete;
        metadata.insert(&record).await.unwrap();
        index
            .upsert(&VectorEntry::new(record.id, embedder.embed_sync(&text)))
            .await
            .unwrap();
    }
}

fn search_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("search");

    for count in [100, 1_000, 10_000] {
        // Skip large benchmarks in CI
        if count > 1_000 && std::env::var("CI").is_ok() {
            continue;
        }

        let embedder = Arc::new(HashEmbedder::new(EMBEDDING_DIM));
        let metadata = Arc::new(MemoryMetadataStore::new());
        let index = Arc::new(MemoryVectorIndex::new(EMBEDDING_DIM));
        rt.block_on(populate(&metadata, &index, &embedder, count));

        let query_vector = embedder.embed_sync("stock market revenue");
        group.bench_with_input(
            BenchmarkId::new("index_query", format!("{count}_docs")),
            &count,
            |b, _| {
                b.to_async(&rt)
                    .iter(|| async { black_box(index.query(&query_vector, 10).await) });
            },
        );

        let processor = SearchProcessor::new(
            metadata.clone() as Arc<dyn MetadataStore>,
            index.clone() as Arc<dyn VectorIndex>,
            embedder.clone() as Arc<dyn Embedder>,
            SearchConfig::default(),
        );
        for limit in [1, 10, 50] {
            group.bench_with_input(
                BenchmarkId::new(format!("search_{count}_docs"), format!("top_{limit}")),
                &limit,
                |b, limit| {
                    b.to_async(&rt).iter(|| async {
                        black_box(processor.search("stock market revenue", Some(*limit)).await)
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, search_benchmark);
criterion_main!(benches);
