//! Core data models used throughout the vault.
//!
//! These types represent the documents, text units, chunks, and result
//! payloads that flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// A file under the documents root that passed the extension allow-list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    /// File name without directories.
    pub name: String,
    pub path: PathBuf,
    /// Path relative to the documents root, `/`-separated on all platforms.
    pub relative_path: String,
    pub size: u64,
    pub size_mb: f64,
    /// Last modification time, ISO 8601.
    pub modified: String,
    /// Lower-cased extension without the leading dot (e.g. `"pdf"`).
    pub file_type: String,
    /// SHA-256 of the file bytes; empty if the file could not be read.
    pub fingerprint: String,
}

/// Result of scanning the documents root.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub total_files: usize,
    pub total_size: u64,
    pub total_size_mb: f64,
    pub files: Vec<DocumentRecord>,
    pub supported_types: Vec<String>,
    pub scan_time: String,
}

/// One piece of extracted text, before chunking (a PDF page, a CSV row,
/// a whole text file).
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    pub text: String,
    /// Adapter-specific metadata such as `{"page": 3}`.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TextUnit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Provenance attached to every chunk of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMetadata {
    pub source_file: String,
    pub file_path: String,
    pub relative_path: String,
    pub file_type: String,
    pub file_size: u64,
    /// Fingerprint of the document the chunk came from.
    pub file_hash: String,
    pub indexed_time: DateTime<Utc>,
    /// Metadata of the text unit the chunk was cut from.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A bounded slice of document text: the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    /// Position of the chunk within its source document, from 0.
    pub chunk_index: i64,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from nearest-neighbour search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// A file that ingestion deliberately left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

impl std::fmt::Display for SkippedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.reason)
    }
}

/// A file whose extraction failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileError {
    pub name: String,
    pub error: String,
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub indexed_files: Vec<String>,
    pub skipped_files: Vec<SkippedFile>,
    pub errors: Vec<FileError>,
    pub chunk_count: usize,
    /// True when the run replaced the index instead of appending to it.
    pub rebuilt: bool,
    pub timestamp: String,
}

impl IngestReport {
    /// A run succeeds iff it produced at least one chunk, regardless of
    /// individual file errors.
    pub fn success(&self) -> bool {
        self.chunk_count > 0
    }
}

/// Attribution for one chunk that grounded an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceAttribution {
    pub file: String,
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: u64,
    pub content_preview: String,
    pub indexed_time: String,
    pub score: f32,
}

/// A grounded answer to a question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    /// Ordered by relevance, best first.
    pub sources: Vec<SourceAttribution>,
    /// The question exactly as asked.
    pub question: String,
    /// The context-augmented prompt actually searched with, when
    /// conversation context was supplied.
    pub effective_question: Option<String>,
    /// False when retrieval found nothing to ground the answer in.
    pub grounded: bool,
    pub timestamp: String,
}

/// Read-only health overview of the vault.
#[derive(Debug, Clone, Serialize)]
pub struct VaultStatus {
    pub model_name: String,
    pub embedding_model: String,
    pub ai_available: bool,
    pub embeddings_available: bool,
    pub generation_available: bool,
    pub index_available: bool,
    pub query_ready: bool,
    pub indexed_chunks: Option<i64>,
    pub docs_folder: String,
    pub index_path: String,
    pub total_files: usize,
    pub total_size_mb: f64,
    pub supported_types: Vec<String>,
    pub last_scan: String,
}
