//! # docsift CLI
//!
//! Command-line interface for docsift, an asynchronous document ingestion
//! pipeline with semantic search.
//!
//! Documents are accepted immediately as `PENDING`, processed by a bounded
//! worker pool (extract, embed, index) and become searchable once they reach
//! `COMPLETE`.
//!
//! ## Commands
//!
//! - `docsift ingest <FILES>...` - Submit documents and wait for them
//! - `docsift status <ID>` - Show a document's record
//! - `docsift resubmit <ID>` - Retry a `FAILED` document
//! - `docsift search <QUERY>` - Rank complete documents against a query
//! - `docsift list` - List records, optionally by status
//! - `docsift delete <ID>` - Remove a document and its vector
//! - `docsift stats` - Counts per status
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a few files
//! docsift ingest report.pdf notes.txt scan.png
//!
//! # Search
//! docsift search "quarterly revenue" -k 5
//!
//! # Get JSON output
//! docsift --format json list --status failed
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsift_core::{
    BlobStore, DocumentFormat, DocumentRecord, DocumentStatus, Embedder, Error, MetadataStore,
    SearchHitSummary, VectorIndex,
};
use docsift_embed::{EmbedderPool, EmbeddingCache, HashEmbedder};
use docsift_extract::{ExtractorRegistry, TesseractRecognizer};
use docsift_ingest::{IngestServices, IngestionCoordinator};
use docsift_query::SearchProcessor;
#[cfg(feature = "lancedb")]
use docsift_store::{FsBlobStore, LanceStore};
use docsift_store::{MemoryBlobStore, MemoryMetadataStore, MemoryVectorIndex};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

mod config;

use config::{Config, EmbedderBackend, StorageBackend};

#[derive(Parser)]
#[command(name = "docsift")]
#[command(about = "Asynchronous document ingestion and semantic search")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/docsift/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit documents for ingestion
    Ingest {
        /// Files to submit
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Document type (pdf, docx, image, plaintext); inferred from the
        /// extension when omitted
        #[arg(short = 't', long = "type")]
        doc_type: Option<String>,

        /// Report the accepted records without waiting for processing
        #[arg(long)]
        no_wait: bool,

        /// Seconds to wait for each document
        #[arg(long, default_value = "600")]
        timeout: u64,
    },

    /// Show a document's record
    Status {
        /// Document id
        id: Uuid,
    },

    /// Put a FAILED document back into the queue
    Resubmit {
        /// Document id
        id: Uuid,

        /// Return as soon as the document is queued
        #[arg(long)]
        no_wait: bool,
    },

    /// Search complete documents
    Search {
        /// Query string
        query: String,

        /// Maximum results
        #[arg(short)]
        k: Option<usize>,
    },

    /// List document records
    List {
        /// Only records with this status
        #[arg(short, long)]
        status: Option<DocumentStatus>,
    },

    /// Delete a document, its vector and its stored bytes
    Delete {
        /// Document id
        id: Uuid,
    },

    /// Show counts per status
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for ingestion.
#[derive(Serialize)]
struct IngestOutput {
    documents: Vec<DocumentRecord>,
    rejected: Vec<Rejected>,
}

#[derive(Serialize)]
struct Rejected {
    file: String,
    error: String,
}

/// Output structure for search results.
#[derive(Serialize)]
struct SearchOutput {
    query: String,
    results: Vec<SearchHitSummary>,
}

/// Assembled pipeline.
struct App {
    coordinator: IngestionCoordinator,
    search: SearchProcessor,
}

type Stores = (
    Arc<dyn MetadataStore>,
    Arc<dyn VectorIndex>,
    Arc<dyn BlobStore>,
);

#[cfg(feature = "lancedb")]
fn open_lance(config: &Config, dimension: usize) -> Result<Stores> {
    let data = config.data_dir().context("Failed to get data directory")?;
    let store = Arc::new(LanceStore::new(data.join("docsift.lance"), dimension));
    let metadata: Arc<dyn MetadataStore> = store.clone();
    let index: Arc<dyn VectorIndex> = store;
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(data.join("blobs")));
    Ok((metadata, index, blobs))
}

#[cfg(not(feature = "lancedb"))]
fn open_lance(_config: &Config, _dimension: usize) -> Result<Stores> {
    anyhow::bail!("docsift was built without LanceDB support; use storage.backend = \"memory\"")
}

#[cfg(feature = "candle")]
fn open_candle(config: &Config) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(docsift_embed::CandleEmbedder::new(
        config.embedding.model.as_str(),
        config.model_dir(),
        config.embedding.dimension,
    )))
}

#[cfg(not(feature = "candle"))]
fn open_candle(_config: &Config) -> Result<Arc<dyn Embedder>> {
    anyhow::bail!("docsift was built without Candle support; use embedding.backend = \"hash\"")
}

/// Create the component stack and repair state left by a previous run.
async fn build_app(config: &Config) -> Result<App> {
    let dimension = config.embedding.dimension;

    let (metadata, index, blobs): Stores = match config.storage.backend {
        StorageBackend::Lance => open_lance(config, dimension)?,
        StorageBackend::Memory => {
            warn!("Using in-memory storage; nothing is kept after exit");
            let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
            let index: Arc<dyn VectorIndex> = Arc::new(MemoryVectorIndex::new(dimension));
            let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
            (metadata, index, blobs)
        }
    };

    let recognizer = TesseractRecognizer::new(
        config.extract.tesseract_command.as_str(),
        config.extract.ocr_language.as_str(),
    );
    let extractors = Arc::new(ExtractorRegistry::with_defaults(Arc::new(recognizer)));

    let model: Arc<dyn Embedder> = match config.embedding.backend {
        EmbedderBackend::Hash => Arc::new(HashEmbedder::new(dimension)),
        EmbedderBackend::Candle => open_candle(config)?,
    };
    info!("Embedding with {} ({} dimensions)", model.model_name(), dimension);
    let embedder: Arc<dyn Embedder> =
        Arc::new(EmbedderPool::new(model, config.embedding.max_concurrent));
    let query_embedder = Arc::new(EmbeddingCache::with_capacity(
        Arc::clone(&embedder),
        config.embedding.query_cache_capacity,
    ));

    let coordinator = IngestionCoordinator::start(
        IngestServices {
            metadata: Arc::clone(&metadata),
            index: Arc::clone(&index),
            blobs,
            extractors,
            embedder,
        },
        config.ingest_config(),
    )
    .await
    .context("Failed to start ingestion")?;

    let report = coordinator
        .recover()
        .await
        .context("Failed to recover previous state")?;
    if report.requeued > 0 {
        info!("Resuming {} pending documents", report.requeued);
    }

    let search = SearchProcessor::new(metadata, index, query_embedder, config.search_config());
    Ok(App {
        coordinator,
        search,
    })
}

fn init_logging(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if let Some(path) = &config.logging.file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        tracing::subscriber::set_global_default(
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .finish(),
        )
    } else {
        tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())
    };
    installed.context("Failed to set tracing subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.clone()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config".to_string(),
    })?;

    init_logging(&config, cli.verbose)?;

    if let Commands::Config { action } = &cli.command {
        return run_config(action, &config, cli.format);
    }

    let app = build_app(&config).await?;
    let result = run(&app, cli.command, cli.format).await;

    // Queued work, including anything recover() picked up, finishes first.
    app.coordinator.shutdown().await;
    result
}

async fn run(app: &App, command: Commands, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Ingest {
            files,
            doc_type,
            no_wait,
            timeout,
        } => {
            let mut output = IngestOutput {
                documents: Vec::new(),
                rejected: Vec::new(),
            };

            for path in &files {
                match submit_file(&app.coordinator, path, doc_type.as_deref()).await {
                    Ok(record) => output.documents.push(record),
                    Err(e) => {
                        warn!("Rejected {:?}: {:#}", path, e);
                        output.rejected.push(Rejected {
                            file: path.display().to_string(),
                            error: format!("{e:#}"),
                        });
                    }
                }
            }

            if !no_wait {
                let limit = Duration::from_secs(timeout);
                for record in &mut output.documents {
                    *record = wait_or_current(&app.coordinator, record.id, limit).await?;
                }
            }

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Text => {
                    for record in &output.documents {
                        print_record_line(record);
                    }
                    for rejected in &output.rejected {
                        println!("rejected  {}  {}", rejected.file, rejected.error);
                    }
                }
            }
        }

        Commands::Status { id } => {
            let record = app.coordinator.status(id).await?;
            print_record(&record, format)?;
        }

        Commands::Resubmit { id, no_wait } => {
            let mut record = app.coordinator.resubmit(id).await?;
            if !no_wait {
                record = wait_or_current(&app.coordinator, id, Duration::from_secs(600)).await?;
            }
            print_record(&record, format)?;
        }

        Commands::Search { query, k } => {
            let hits = app
                .search
                .search(&query, k)
                .await
                .context("Search failed")?;
            let output = SearchOutput {
                query,
                results: hits.iter().map(|hit| hit.summary()).collect(),
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Text => {
                    println!("Query: {}\n", output.query);
                    if output.results.is_empty() {
                        println!("No results found.");
                    } else {
                        for (i, hit) in output.results.iter().enumerate() {
                            println!(
                                "{}. {} (score: {:.3})\n   {}",
                                i + 1,
                                hit.original_name,
                                hit.score,
                                hit.id
                            );
                        }
                    }
                }
            }
        }

        Commands::List { status } => {
            let records = app.coordinator.list(status).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Text => {
                    if records.is_empty() {
                        println!("No documents.");
                    }
                    for record in &records {
                        print_record_line(record);
                    }
                }
            }
        }

        Commands::Delete { id } => {
            app.coordinator.delete(id).await?;
            match format {
                OutputFormat::Json => println!(r#"{{"deleted": "{id}"}}"#),
                OutputFormat::Text => println!("Deleted {id}"),
            }
        }

        Commands::Stats => {
            let stats = app.coordinator.stats().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    let docs = &stats.documents;
                    println!("Documents:  {}", docs.total());
                    println!("  Pending:    {}", docs.pending);
                    println!("  Processing: {}", docs.processing);
                    println!("  Complete:   {}", docs.complete);
                    println!("  Failed:     {}", docs.failed);
                    println!("Vectors:    {}", stats.vectors);
                }
            }
        }

        // Handled before the pipeline starts.
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn run_config(action: &ConfigAction, config: &Config, format: OutputFormat) -> Result<()> {
    match action {
        ConfigAction::Show => match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(config).context("Failed to serialize config")?
                );
            }
            OutputFormat::Text => {
                println!(
                    "{}",
                    toml::to_string_pretty(config).context("Failed to serialize config")?
                );
            }
        },
        ConfigAction::Init => {
            println!("{}", Config::sample_toml());
        }
        ConfigAction::Path => {
            if let Some(path) = Config::config_path() {
                println!("{}", path.display());
            } else {
                println!("Could not determine config directory");
            }
        }
    }
    Ok(())
}

async fn submit_file(
    coordinator: &IngestionCoordinator,
    path: &Path,
    doc_type: Option<&str>,
) -> Result<DocumentRecord> {
    let format = match doc_type {
        Some(tag) => tag.parse::<DocumentFormat>()?,
        None => DocumentFormat::from_path(path)
            .ok_or_else(|| Error::UnsupportedFormat(path.display().to_string()))?,
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string());

    Ok(coordinator.submit_as(&bytes, format, &name).await?)
}

/// Wait for a terminal status; on timeout report whatever is current.
async fn wait_or_current(
    coordinator: &IngestionCoordinator,
    id: Uuid,
    limit: Duration,
) -> Result<DocumentRecord> {
    match coordinator.wait_for(id, limit).await {
        Ok(record) => Ok(record),
        Err(Error::Other(reason)) => {
            warn!("{}", reason);
            Ok(coordinator.status(id).await?)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_record(record: &DocumentRecord, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Text => {
            println!("Document {}", record.id);
            println!("  Name:     {}", record.original_name);
            println!("  Format:   {}", record.format);
            println!("  Status:   {}", record.status);
            if let Some(detail) = &record.error_detail {
                println!("  Error:    {detail}");
            }
            println!("  Size:     {} bytes", record.size_bytes);
            println!("  Attempts: {}", record.attempts);
            println!(
                "  Created:  {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!(
                "  Updated:  {}",
                record.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(())
}

fn print_record_line(record: &DocumentRecord) {
    let detail = record
        .error_detail
        .as_deref()
        .map(|d| format!("  {}", truncate(d, 80)))
        .unwrap_or_default();
    println!(
        "{}  {:<10}  {}{}",
        record.id, record.status, record.original_name, detail
    );
}

/// Truncate a string to max length, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ").replace('\r', "");
    if s.chars().count() <= max_len {
        s
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
