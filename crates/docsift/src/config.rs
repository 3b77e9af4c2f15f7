//! Configuration handling for docsift.
//!
//! Settings are read from `config.toml` in the XDG config directory. Every
//! field has a default, so a missing file or a partial file is fine.

use directories::ProjectDirs;
use docsift_core::EmbeddingConfig;
use docsift_ingest::{IngestConfig, RetryPolicy};
use docsift_query::SearchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Ingestion configuration
    #[serde(default)]
    pub ingest: IngestSettings,

    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingSettings,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Extraction configuration
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where records, vectors and document bytes are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// `LanceDB` tables and a blob directory under the data dir
    #[default]
    Lance,
    /// Process memory; nothing survives the process
    Memory,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: StorageBackend,

    /// Data directory (default: XDG data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Ingestion-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestSettings {
    /// Concurrent ingestion jobs
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs waiting in the queue before submission blocks
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Minimum non-whitespace characters of extracted text
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,

    /// Limit for each extraction, embedding and index call (seconds)
    #[serde(default = "default_capability_timeout_secs")]
    pub capability_timeout_secs: u64,

    /// Attempts for outcome writes and vector cleanup
    #[serde(default = "default_store_retry_attempts")]
    pub store_retry_attempts: u32,

    /// First retry delay, doubled per attempt (ms)
    #[serde(default = "default_store_retry_backoff_ms")]
    pub store_retry_backoff_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_min_text_chars() -> usize {
    3
}

fn default_capability_timeout_secs() -> u64 {
    120
}

fn default_store_retry_attempts() -> u32 {
    3
}

fn default_store_retry_backoff_ms() -> u64 {
    50
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            min_text_chars: default_min_text_chars(),
            capability_timeout_secs: default_capability_timeout_secs(),
            store_retry_attempts: default_store_retry_attempts(),
            store_retry_backoff_ms: default_store_retry_backoff_ms(),
        }
    }
}

/// Which embedder turns text into vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    /// Lexical hashing; no model files
    #[default]
    Hash,
    /// Sentence-transformer model run with Candle
    Candle,
}

/// Embedding-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    /// Embedder backend
    #[serde(default)]
    pub backend: EmbedderBackend,

    /// Hugging Face model id for the `candle` backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Model download cache (default: `models` under the data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,

    /// Vector dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Max concurrent embedding calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Cached query embeddings
    #[serde(default = "default_query_cache_capacity")]
    pub query_cache_capacity: usize,
}

fn default_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_dimension() -> usize {
    docsift_embed::hash::DEFAULT_DIMENSION
}

fn default_max_concurrent() -> usize {
    2
}

fn default_query_cache_capacity() -> usize {
    1024
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::default(),
            model: default_model(),
            model_dir: None,
            dimension: default_dimension(),
            max_concurrent: default_max_concurrent(),
            query_cache_capacity: default_query_cache_capacity(),
        }
    }
}

/// Query-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryConfig {
    /// Default result limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Maximum result limit
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    100
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Extraction-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractConfig {
    /// OCR executable used for images
    #[serde(default = "default_tesseract_command")]
    pub tesseract_command: String,

    /// OCR language code
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
}

fn default_tesseract_command() -> String {
    "tesseract".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            tesseract_command: default_tesseract_command(),
            ocr_language: default_ocr_language(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load from the default config path, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, or from the default config path when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load_from(path: Option<PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::read(&path),
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Data directory, preferring `storage.data_dir`.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.storage.data_dir.clone().or_else(data_dir)
    }

    /// Model cache directory, preferring `embedding.model_dir`.
    pub fn model_dir(&self) -> Option<PathBuf> {
        self.embedding
            .model_dir
            .clone()
            .or_else(|| self.data_dir().map(|dir| dir.join("models")))
    }

    /// Pipeline settings.
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            workers: self.ingest.workers,
            queue_capacity: self.ingest.queue_capacity,
            min_text_chars: self.ingest.min_text_chars,
            capability_timeout: Duration::from_secs(self.ingest.capability_timeout_secs),
            retry: RetryPolicy {
                attempts: self.ingest.store_retry_attempts,
                backoff: Duration::from_millis(self.ingest.store_retry_backoff_ms),
            },
            embedding: EmbeddingConfig::default(),
        }
    }

    /// Search settings.
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            default_limit: self.query.default_limit,
            max_limit: self.query.max_limit,
            embedding: EmbeddingConfig::default(),
        }
    }

    /// Commented sample configuration.
    pub fn sample_toml() -> &'static str {
        r#"# docsift configuration

[storage]
# "lance" keeps everything under the data directory; "memory" forgets on exit
backend = "lance"
# data_dir = "/var/lib/docsift"

[ingest]
workers = 4
queue_capacity = 256
min_text_chars = 3
capability_timeout_secs = 120
store_retry_attempts = 3
store_retry_backoff_ms = 50

[embedding]
# "hash" needs no model; "candle" runs a sentence-transformer (build with
# the `candle` feature)
backend = "hash"
model = "sentence-transformers/all-MiniLM-L6-v2"
# model_dir = "/var/cache/docsift/models"
dimension = 384
max_concurrent = 2
query_cache_capacity = 1024

[query]
default_limit = 10
max_limit = 100

[extract]
tesseract_command = "tesseract"
ocr_language = "eng"

[logging]
level = "info"
# file = "/var/log/docsift.log"
"#
    }
}

/// Get the XDG data directory for docsift.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCSIFT_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "docsift").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the XDG config directory for docsift.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCSIFT_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "docsift").map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::Lance);
        assert_eq!(config.ingest.workers, 4);
        assert_eq!(config.ingest.queue_capacity, 256);
        assert_eq!(config.ingest.min_text_chars, 3);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.query.default_limit, 10);
        assert_eq!(config.query.max_limit, 100);
        assert_eq!(config.extract.tesseract_command, "tesseract");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_sample_parses_to_defaults() {
        let parsed: Config = toml::from_str(Config::sample_toml()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[storage]
backend = "memory"

[ingest]
workers = 8
"#,
        )
        .unwrap();

        assert_eq!(parsed.storage.backend, StorageBackend::Memory);
        assert_eq!(parsed.ingest.workers, 8);
        assert_eq!(parsed.ingest.queue_capacity, 256);
        assert_eq!(parsed.embedding, EmbeddingSettings::default());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: Result<Config, _> = toml::from_str("[storage]\nbackend = \"redis\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_candle_backend_and_model_dir() {
        let parsed: Config = toml::from_str(
            r#"
[storage]
data_dir = "/srv/docsift"

[embedding]
backend = "candle"
model = "thenlper/gte-small"
"#,
        )
        .unwrap();

        assert_eq!(parsed.embedding.backend, EmbedderBackend::Candle);
        assert_eq!(parsed.embedding.model, "thenlper/gte-small");
        assert_eq!(parsed.embedding.dimension, 384);
        assert_eq!(parsed.model_dir(), Some(PathBuf::from("/srv/docsift/models")));
        assert_eq!(Config::default().embedding.backend, EmbedderBackend::Hash);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[query]\ndefault_limit = 5").unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.query.default_limit, 5);
        assert_eq!(config.query.max_limit, 100);
    }

    #[test]
    fn test_load_from_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from(Some(dir.path().join("nope.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_pipeline_settings() {
        let mut config = Config::default();
        config.ingest.capability_timeout_secs = 7;
        config.ingest.store_retry_attempts = 5;
        config.query.max_limit = 20;

        let ingest = config.ingest_config();
        assert_eq!(ingest.capability_timeout, Duration::from_secs(7));
        assert_eq!(ingest.retry.attempts, 5);
        assert_eq!(ingest.retry.backoff, Duration::from_millis(50));
        assert_eq!(config.search_config().max_limit, 20);
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let mut config = Config::default();
        config.storage.data_dir = Some(PathBuf::from("/srv/docsift"));
        assert_eq!(config.data_dir(), Some(PathBuf::from("/srv/docsift")));
    }
}
