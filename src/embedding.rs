//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete backends:
//! - **[`DisabledProvider`]**: always fails; the vault reports embeddings as unavailable.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API.
//! - **`LocalProvider`**: in-process inference via fastembed (feature `local-embeddings`).
//!
//! Also provides the vector utilities the index is built on:
//! [`cosine_similarity`], [`vec_to_blob`] and [`blob_to_vec`].
//!
//! # Retry Strategy
//!
//! The HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, DEFAULT_OLLAMA_URL};

/// A backend that maps texts to fixed-width vectors.
///
/// Implementations must be deterministic for a given model: the same text
/// always yields the same vector, or retrieval quality silently decays.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded in the index (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a short test text once, without the retry policy of
    /// [`embed`](Self::embed), to tell whether the backend is usable.
    async fn probe(&self) -> Result<Vec<f32>> {
        embed_one(self, PROBE_TEXT).await
    }
}

const PROBE_TEXT: &str = "test";

/// Embed a single text.
pub async fn embed_one<P>(provider: &P, text: &str) -> Result<Vec<f32>>
where
    P: EmbeddingProvider + ?Sized,
{
    first_vector(provider.embed(&[text.to_string()]).await?)
}

/// Embed `texts` in batches of `batch_size`, checking that the backend
/// returned exactly one vector per input.
pub async fn embed_batched(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = provider.embed(batch).await?;
        if embedded.len() != batch.len() {
            bail!(
                "embedding backend returned {} vectors for {} texts",
                embedded.len(),
                batch.len()
            );
        }
        vectors.extend(embedded);
    }
    Ok(vectors)
}

// ============ Disabled Provider ============

/// Used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). The model must already be pulled.
pub struct OllamaProvider {
    model: String,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model_name().to_string(),
            url: url.trim_end_matches('/').to_string(),
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, self.max_retries).await
    }

    async fn probe(&self) -> Result<Vec<f32>> {
        first_vector(self.request(&[PROBE_TEXT.to_string()], 0).await?)
    }
}

impl OllamaProvider {
    async fn request(&self, texts: &[String], max_retries: u32) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = || {
            self.client
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
        };
        let response = send_with_retry(request, max_retries, "Ollama", &self.url).await?;
        parse_ollama_response(&response.json().await?)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
                .map(|values| to_f32(values))
        })
        .collect()
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings`. Requires `OPENAI_API_KEY`; `embedding.url`
/// overrides the base URL for compatible servers.
pub struct OpenAIProvider {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns an error if `embedding.model` is not set or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            base_url: config
                .url
                .as_deref()
                .unwrap_or("https://api.openai.com")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, self.max_retries).await
    }

    async fn probe(&self) -> Result<Vec<f32>> {
        first_vector(self.request(&[PROBE_TEXT.to_string()], 0).await?)
    }
}

impl OpenAIProvider {
    async fn request(&self, texts: &[String], max_retries: u32) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = || {
            self.client
                .post(format!("{}/v1/embeddings", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
        };
        let response = send_with_retry(request, max_retries, "OpenAI", &self.base_url).await?;
        parse_openai_response(&response.json().await?)
    }
}

/// Extracts `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(position as u64);
        indexed.push((index, to_f32(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Local Provider (fastembed) ============

/// Embedding provider running a model in-process via fastembed.
///
/// Models are downloaded on first use and cached; after that no network
/// calls are made.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let fastembed_model = config_to_fastembed_model(&model_name)?;
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            model: Arc::new(std::sync::Mutex::new(model)),
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ),
    }
}

// ============ Shared HTTP plumbing ============

/// Send a request built by `request`, retrying rate limits, server errors
/// and connection failures with exponential backoff. Returns the first
/// successful response.
///
/// `max_retries = 0` makes exactly one attempt.
pub(crate) async fn send_with_retry<F>(
    request: F,
    max_retries: u32,
    backend: &str,
    url: &str,
) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(backend, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match request().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let body_text = response.text().await.unwrap_or_default();
                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", backend, status, body_text));
                    continue;
                }
                bail!("{} API error {}: {}", backend, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!(
                    "{} connection error (is it reachable at {}?): {}",
                    backend,
                    url,
                    e
                ));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", backend)))
}

fn first_vector(vectors: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

fn to_f32(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Create the configured [`EmbeddingProvider`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as little-endian `f32` bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero vector on either side.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingProvider;

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn model_name(&self) -> &str {
            "short"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0]])
        }
    }

    #[tokio::test]
    async fn unreachable_ollama_is_reported_without_backoff() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            url: Some("http://127.0.0.1:9".to_string()),
            max_retries: 5,
            timeout_secs: 2,
            ..EmbeddingConfig::default()
        };
        let provider = OllamaProvider::new(&config).unwrap();

        // With backoff the first retry alone would sleep for a second
        let outcome = tokio::time::timeout(Duration::from_millis(900), provider.probe()).await;
        let err = outcome.expect("probe retried").unwrap_err();
        assert!(err.to_string().contains("Ollama"));
    }

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
        assert_eq!(vec_to_blob(&vec).len(), 20);
    }

    #[test]
    fn cosine_identical_orthogonal_opposite() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn ollama_response_parses() {
        let json = serde_json::json!({ "embeddings": [[0.5, 1.0], [2.0, -1.0]] });
        let parsed = parse_ollama_response(&json).unwrap();
        assert_eq!(parsed, vec![vec![0.5, 1.0], vec![2.0, -1.0]]);
        assert!(parse_ollama_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn openai_response_is_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [2.0] },
                { "index": 0, "embedding": [1.0] }
            ]
        });
        assert_eq!(parse_openai_response(&json).unwrap(), vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn disabled_provider_fails() {
        let err = DisabledProvider.embed(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[tokio::test]
    async fn batching_preserves_order() {
        let texts: Vec<String> = (1..=5).map(|n| "a".repeat(n)).collect();
        let vectors = embed_batched(&CountingProvider, &texts, 2).await.unwrap();
        let lens: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn batching_rejects_short_responses() {
        let texts = vec!["a".to_string(), "b".to_string()];
        assert!(embed_batched(&ShortProvider, &texts, 10).await.is_err());
    }

    #[test]
    fn create_provider_by_name() {
        let mut config = EmbeddingConfig::default();
        config.provider = "disabled".to_string();
        assert_eq!(create_provider(&config).unwrap().model_name(), "disabled");

        config.provider = "ollama".to_string();
        config.model = Some("nomic-embed-text".to_string());
        assert_eq!(create_provider(&config).unwrap().model_name(), "nomic-embed-text");

        config.provider = "bogus".to_string();
        assert!(create_provider(&config).is_err());
    }
}
