//! Sentence-transformer embedder running on Candle.
//!
//! Loads a BERT-style model from the Hugging Face Hub on first use and
//! embeds by mean pooling the last hidden state over the attention mask.
//! The default model, `sentence-transformers/all-MiniLM-L6-v2`, produces
//! 384-dimensional vectors.
//!
//! Only built with the `candle` feature.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use docsift_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use hf_hub::api::tokio::ApiBuilder;
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Longest input, in tokens, before truncation.
const DEFAULT_MAX_TOKENS: usize = 256;

fn inference(e: impl std::fmt::Display) -> EmbedError {
    EmbedError::Inference(e.to_string())
}

/// Model and tokenizer, loaded together.
struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LoadedModel {
    /// Run one batch through the model. Blocking.
    fn encode(
        &self,
        texts: Vec<String>,
        normalize: bool,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let encodings = self.tokenizer.encode_batch(texts, true).map_err(inference)?;
        let batch = encodings.len();
        let width = encodings.first().map_or(0, |e| e.get_ids().len());

        let mut ids = Vec::with_capacity(batch * width);
        let mut mask = Vec::with_capacity(batch * width);
        let mut types = Vec::with_capacity(batch * width);
        let mut token_counts = Vec::with_capacity(batch);
        for encoding in &encodings {
            ids.extend_from_slice(encoding.get_ids());
            mask.extend_from_slice(encoding.get_attention_mask());
            types.extend_from_slice(encoding.get_type_ids());
            let real = encoding.get_attention_mask().iter().filter(|&&m| m == 1);
            token_counts.push(real.count());
        }

        let shape = (batch, width);
        let ids = Tensor::from_vec(ids, shape, &self.device).map_err(inference)?;
        let mask = Tensor::from_vec(mask, shape, &self.device).map_err(inference)?;
        let types = Tensor::from_vec(types, shape, &self.device).map_err(inference)?;

        let hidden = self
            .model
            .forward(&ids, &types, Some(&mask))
            .map_err(inference)?;

        // Mean over real tokens: [batch, width, hidden] -> [batch, hidden]
        let weights = mask
            .to_dtype(DType::F32)
            .and_then(|m| m.unsqueeze(2))
            .map_err(inference)?;
        let summed = hidden
            .broadcast_mul(&weights)
            .and_then(|t| t.sum(1))
            .map_err(inference)?;
        let counts = weights
            .sum(1)
            .and_then(|c| c.clamp(1e-9, f64::MAX))
            .map_err(inference)?;
        let mut pooled = summed.broadcast_div(&counts).map_err(inference)?;

        if normalize {
            let norms = pooled
                .sqr()
                .and_then(|t| t.sum_keepdim(1))
                .and_then(|t| t.sqrt())
                .and_then(|t| t.clamp(1e-12, f64::MAX))
                .map_err(inference)?;
            pooled = pooled.broadcast_div(&norms).map_err(inference)?;
        }

        let rows = pooled.to_vec2::<f32>().map_err(inference)?;
        Ok(rows
            .into_iter()
            .zip(token_counts)
            .map(|(embedding, token_count)| EmbeddingOutput {
                embedding,
                token_count,
            })
            .collect())
    }
}

/// Transformer embedder backed by a Hugging Face model.
///
/// Construction is cheap; the model is downloaded and loaded on the first
/// call to [`init`](Self::init) or to an embedding method.
pub struct CandleEmbedder {
    model_id: String,
    cache_dir: Option<PathBuf>,
    dimension: usize,
    max_tokens: usize,
    device: Device,
    loaded: OnceCell<Arc<LoadedModel>>,
}

impl CandleEmbedder {
    /// Embedder for `model_id` producing vectors of `dimension` values.
    ///
    /// Model files are cached under `cache_dir`, or the Hub's default cache
    /// when `None`.
    pub fn new(
        model_id: impl Into<String>,
        cache_dir: Option<PathBuf>,
        dimension: usize,
    ) -> Self {
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        debug!("CandleEmbedder using device: {:?}", device);

        Self {
            model_id: model_id.into(),
            cache_dir,
            dimension,
            max_tokens: DEFAULT_MAX_TOKENS,
            device,
            loaded: OnceCell::new(),
        }
    }

    /// Truncate inputs to `max_tokens` tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    /// Whether the model is loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Download (if needed) and load the model.
    pub async fn init(&self) -> Result<(), EmbedError> {
        self.model().await.map(|_| ())
    }

    async fn model(&self) -> Result<Arc<LoadedModel>, EmbedError> {
        self.loaded
            .get_or_try_init(|| self.load())
            .await
            .map(Arc::clone)
    }

    async fn load(&self) -> Result<Arc<LoadedModel>, EmbedError> {
        info!("Loading embedding model {}", self.model_id);
        let load_err = |what: &str, e: String| {
            EmbedError::ModelLoad(format!("{what} for {}: {e}", self.model_id))
        };

        let mut builder = ApiBuilder::new();
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder.build().map_err(|e| load_err("hub client", e.to_string()))?;
        let repo = api.repo(Repo::new(self.model_id.clone(), RepoType::Model));

        let tokenizer_path = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| load_err("tokenizer.json", e.to_string()))?;
        let config_path = repo
            .get("config.json")
            .await
            .map_err(|e| load_err("config.json", e.to_string()))?;
        let weights_path = repo
            .get("model.safetensors")
            .await
            .map_err(|e| load_err("model.safetensors", e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| load_err("tokenizer", e.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: self.max_tokens,
                ..Default::default()
            }))
            .map_err(|e| load_err("truncation", e.to_string()))?;

        let config = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| load_err("config", e.to_string()))?;
        let config: Config =
            serde_json::from_str(&config).map_err(|e| load_err("config", e.to_string()))?;

        // SAFETY: the weights file is owned by the Hub cache and is not
        // modified while mapped.
        #[allow(unsafe_code)]
        let weights = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &self.device)
                .map_err(|e| load_err("weights", e.to_string()))?
        };
        let model =
            BertModel::load(weights, &config).map_err(|e| load_err("model", e.to_string()))?;

        info!("Embedding model {} loaded", self.model_id);
        Ok(Arc::new(LoadedModel {
            model,
            tokenizer,
            device: self.device.clone(),
        }))
    }

    async fn encode(
        &self,
        texts: Vec<String>,
        normalize: bool,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let loaded = self.model().await?;
        let outputs = tokio::task::spawn_blocking(move || loaded.encode(texts, normalize))
            .await
            .map_err(|e| EmbedError::Inference(format!("inference task failed: {e}")))??;

        if let Some(output) = outputs.iter().find(|o| o.embedding.len() != self.dimension) {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimension,
                actual: output.embedding.len(),
            });
        }
        Ok(outputs)
    }
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let mut outputs = Vec::with_capacity(texts.len());
        for batch in texts.chunks(config.batch_size.max(1)) {
            let batch = batch.iter().map(|t| (*t).to_string()).collect();
            outputs.extend(self.encode(batch, config.normalize).await?);
        }
        Ok(outputs)
    }

    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let text = match &config.instruction {
            Some(instruction) => format!("{instruction}{query}"),
            None => query.to_string(),
        };
        self.encode(vec![text], config.normalize)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("model returned no embedding".to_string()))
    }
}
