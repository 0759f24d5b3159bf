//! TOML configuration.
//!
//! Every section is optional; omitted keys fall back to the defaults
//! below. A missing config file is not an error (the vault runs on
//! defaults), but a malformed file or an out-of-range value is.
//!
//! ```toml
//! [paths]
//! docs = "LocalDocs"
//! index = "vectorstores/documents.sqlite"
//! memory = "memory/conversation_memory.json"
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//!
//! [generation]
//! provider = "ollama"
//! model = "llama3.1"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Model used for both embeddings and generation unless overridden.
pub const DEFAULT_MODEL: &str = "deepseek-r1-distill-8b";
/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_docs")]
    pub docs: PathBuf,
    #[serde(default = "default_index")]
    pub index: PathBuf,
    #[serde(default = "default_memory")]
    pub memory: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            docs: default_docs(),
            index: default_index(),
            memory: default_memory(),
        }
    }
}

fn default_docs() -> PathBuf {
    PathBuf::from("LocalDocs")
}
fn default_index() -> PathBuf {
    PathBuf::from("vectorstores/documents.sqlite")
}
fn default_memory() -> PathBuf {
    PathBuf::from("memory/conversation_memory.json")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScanConfig {
    /// Glob patterns (relative to the docs root) to leave out of scans.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Chunks handed to the generation step as grounding.
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    /// Default number of source attributions returned with an answer.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    /// Recent session messages folded into an `ask`.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            retrieval_k: default_retrieval_k(),
            max_results: default_max_results(),
            preview_chars: default_preview_chars(),
            context_messages: default_context_messages(),
        }
    }
}

fn default_retrieval_k() -> usize {
    5
}
fn default_max_results() -> usize {
    5
}
fn default_preview_chars() -> usize {
    200
}
fn default_context_messages() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout(),
            temperature: default_temperature(),
        }
    }
}

fn default_generation_retries() -> u32 {
    2
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.2
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Load configuration from `path`, falling back to defaults when the
/// file does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate a TOML configuration string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_chars == 0 {
        bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        bail!(
            "chunking.overlap_chars ({}) must be smaller than chunking.chunk_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.chunk_chars
        );
    }

    if config.retrieval.retrieval_k < 1 {
        bail!("retrieval.retrieval_k must be >= 1");
    }
    if config.retrieval.max_results < 1 {
        bail!("retrieval.max_results must be >= 1");
    }

    for pattern in &config.scan.exclude_globs {
        globset::Glob::new(pattern)
            .with_context(|| format!("Invalid scan.exclude_globs pattern: '{}'", pattern))?;
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, openai, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    Ok(())
}
