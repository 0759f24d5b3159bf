//! Text generation backends and grounded prompt construction.
//!
//! A [`GenerationProvider`] turns a finished prompt into answer text. The
//! prompt itself is assembled here as well: [`augment_question`] folds
//! prior conversation turns into the question, and
//! [`build_grounded_prompt`] wraps retrieved chunks around it.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{GenerationConfig, DEFAULT_OLLAMA_URL};
use crate::embedding::send_with_retry;
use crate::models::ScoredChunk;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Produce an answer for a complete prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Cheap liveness check: succeeds only if [`generate`](Self::generate)
    /// can be expected to work.
    async fn probe(&self) -> Result<()>;
}

/// Rewrite `question` so the generator sees the prior turns first.
pub fn augment_question(question: &str, context: &str) -> String {
    format!(
        "Previous conversation context:\n{}\n\nCurrent question: {}\n\nPlease answer the current question using the documents, considering our conversation history.",
        context, question
    )
}

/// Build the "stuff" prompt: every retrieved chunk inlined ahead of the
/// question.
pub fn build_grounded_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let context = if chunks.is_empty() {
        "(No documents in the vault matched this question.)".to_string()
    } else {
        chunks
            .iter()
            .map(|c| c.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
         {}\n\nQuestion: {}\nHelpful Answer:",
        context, question
    )
}

// ============ Disabled Provider ============

pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled")
    }

    async fn probe(&self) -> Result<()> {
        bail!("Generation provider is disabled")
    }
}

// ============ Ollama Provider ============

/// Generates through Ollama's `POST /api/generate` (non-streaming).
pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build Ollama HTTP client")?;
        Ok(Self {
            model: config.model_name().to_string(),
            url: config
                .url
                .as_deref()
                .unwrap_or(DEFAULT_OLLAMA_URL)
                .trim_end_matches('/')
                .to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };
        let request = || {
            self.client
                .post(format!("{}/api/generate", self.url))
                .json(&body)
        };
        let response = send_with_retry(request, self.max_retries, "Ollama", &self.url).await?;
        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .context("failed to parse Ollama response")?;
        Ok(parsed.response.trim().to_string())
    }

    async fn probe(&self) -> Result<()> {
        // Succeeds only when the model is pulled
        let response = self
            .client
            .post(format!("{}/api/show", self.url))
            .json(&serde_json::json!({ "model": self.model }))
            .send()
            .await
            .with_context(|| format!("Ollama not reachable at {}", self.url))?;
        if !response.status().is_success() {
            bail!(
                "Ollama model '{}' not available ({})",
                self.model,
                response.status()
            );
        }
        Ok(())
    }
}

// ============ OpenAI Provider ============

/// Generates through the OpenAI chat completions API.
pub struct OpenAIGenerator {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            model,
            base_url: config
                .url
                .as_deref()
                .unwrap_or("https://api.openai.com")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let request = || {
            self.client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(self.api_key.trim())
                .json(&body)
        };
        let response = send_with_retry(request, self.max_retries, "OpenAI", &self.base_url).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse OpenAI response")?;
        Ok(parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn probe(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/v1/models/{}", self.base_url, self.model))
            .bearer_auth(self.api_key.trim())
            .send()
            .await
            .context("OpenAI not reachable")?;
        if !response.status().is_success() {
            bail!(
                "OpenAI model '{}' not available ({})",
                self.model,
                response.status()
            );
        }
        Ok(())
    }
}

/// Create the configured [`GenerationProvider`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata};

    fn scored(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: "c".to_string(),
                chunk_index: 0,
                text: text.to_string(),
                metadata: ChunkMetadata {
                    source_file: "a.txt".to_string(),
                    file_path: "a.txt".to_string(),
                    relative_path: "a.txt".to_string(),
                    file_type: "txt".to_string(),
                    file_size: 1,
                    file_hash: String::new(),
                    indexed_time: chrono::Utc::now(),
                    extra: serde_json::Map::new(),
                },
            },
            score: 1.0,
        }
    }

    #[test]
    fn augmented_question_puts_context_first() {
        let q = augment_question("And in winter?", "user: what grows in spring?");
        assert!(q.starts_with("Previous conversation context:\nuser: what grows in spring?\n\n"));
        assert!(q.contains("Current question: And in winter?"));
        assert!(q.ends_with("considering our conversation history."));
    }

    #[test]
    fn grounded_prompt_includes_chunks_in_order() {
        let prompt = build_grounded_prompt("Why?", &[scored("first"), scored("second")]);
        let first = prompt.find("first").unwrap();
        let second = prompt.find("second").unwrap();
        assert!(first < second);
        assert!(prompt.contains("first\n\nsecond"));
        assert!(prompt.ends_with("Question: Why?\nHelpful Answer:"));
        assert!(prompt.contains("just say that you don't know"));
    }

    #[test]
    fn grounded_prompt_without_chunks_says_so() {
        let prompt = build_grounded_prompt("Why?", &[]);
        assert!(prompt.contains("No documents in the vault matched"));
    }

    #[tokio::test]
    async fn disabled_generator_fails_probe() {
        assert!(DisabledGenerator.probe().await.is_err());
        assert!(DisabledGenerator.generate("hi").await.is_err());
    }

    #[test]
    fn create_generator_by_name() {
        let mut config = GenerationConfig::default();
        config.provider = "disabled".to_string();
        assert_eq!(create_generator(&config).unwrap().model_name(), "disabled");

        config.provider = "ollama".to_string();
        assert_eq!(
            create_generator(&config).unwrap().model_name(),
            crate::config::DEFAULT_MODEL
        );
    }
}
