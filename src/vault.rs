//! The retrieval engine: ingestion, grounded querying and administration.
//!
//! A [`Vault`] owns the configured backends (as probed [`Capability`]
//! states), the extraction adapter, and the open [`VectorIndex`] handle.
//!
//! # Ingestion
//!
//! ```text
//! scan ──► size gate ──► extract ──► chunk ──► embed (batched) ──► append | rebuild
//!             │             │
//!             ▼             ▼
//!       skipped_files     errors
//! ```
//!
//! Per-file problems are collected into the [`IngestReport`]; only
//! failures that stop the run as a whole become a [`VaultError`]. When the
//! run fails, the previous index stays open and queryable.

use anyhow::Context;
use chrono::{Local, Utc};
use std::sync::Arc;

use crate::capability::{probe_embeddings, probe_generation, Capability};
use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{CapabilityKind, VaultError};
use crate::extract::{Extractor, FileExtractor};
use crate::generation::{self, augment_question, build_grounded_prompt, GenerationProvider};
use crate::index::{self, IndexEntry, IndexMeta, VectorIndex};
use crate::models::{
    ChunkMetadata, DocumentRecord, FileError, IngestReport, QueryResult, ScanReport,
    ScoredChunk, SkippedFile, SourceAttribution, VaultStatus,
};
use crate::scan::{scan_documents, supported_types};

pub struct Vault {
    config: Config,
    embeddings: Capability<dyn EmbeddingProvider>,
    generation: Capability<dyn GenerationProvider>,
    extractor: Box<dyn Extractor>,
    chunker: Chunker,
    index: Option<VectorIndex>,
}

impl Vault {
    /// Build the configured backends, probe them, and open the index if
    /// one exists. Backends that fail to construct or probe are recorded
    /// as unavailable rather than failing the whole vault.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let embeddings = match embedding::create_provider(&config.embedding) {
            Ok(provider) => probe_embeddings(provider).await,
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider not configured");
                Capability::unavailable(format!("{:#}", e))
            }
        };
        let generation = match generation::create_generator(&config.generation) {
            Ok(provider) => probe_generation(provider).await,
            Err(e) => {
                tracing::warn!(error = %e, "generation provider not configured");
                Capability::unavailable(format!("{:#}", e))
            }
        };

        Self::assemble(config, embeddings, generation).await
    }

    /// Like [`open`](Self::open) but with caller-supplied backends, which
    /// are still probed before use.
    pub async fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> anyhow::Result<Self> {
        let embeddings = probe_embeddings(embedder).await;
        let generation = probe_generation(generator).await;
        Self::assemble(config, embeddings, generation).await
    }

    /// Replace the default file-type adapters.
    pub fn with_extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    async fn assemble(
        config: Config,
        embeddings: Capability<dyn EmbeddingProvider>,
        generation: Capability<dyn GenerationProvider>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.paths.docs).with_context(|| {
            format!(
                "Failed to create documents folder {}",
                config.paths.docs.display()
            )
        })?;

        let index = match VectorIndex::open(&config.paths.index).await {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "existing index could not be opened");
                None
            }
        };

        Ok(Self {
            chunker: Chunker::new(config.chunking.chunk_chars, config.chunking.overlap_chars),
            config,
            embeddings,
            generation,
            extractor: Box::new(FileExtractor),
            index,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embeddings(&self) -> &Capability<dyn EmbeddingProvider> {
        &self.embeddings
    }

    pub fn generation(&self) -> &Capability<dyn GenerationProvider> {
        &self.generation
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Scan the documents folder. Read-only.
    pub fn scan(&self) -> anyhow::Result<ScanReport> {
        scan_documents(&self.config.paths.docs, &self.config.scan)
    }

    /// Index the documents folder.
    ///
    /// Appends to the existing index unless `force_rebuild` is set or no
    /// index exists yet, in which case a fresh index replaces the old one.
    pub async fn ingest(&mut self, force_rebuild: bool) -> Result<IngestReport, VaultError> {
        let embedder = Arc::clone(self.embeddings.require(CapabilityKind::Embeddings)?);

        let scan = self
            .scan()
            .context("Failed to scan documents folder")
            .map_err(VaultError::Persistence)?;
        tracing::info!(files = scan.total_files, "ingesting documents");

        let indexed_time = Utc::now();
        let mut report = IngestReport {
            timestamp: Local::now().to_rfc3339(),
            ..Default::default()
        };
        let mut chunks = Vec::new();

        for doc in &scan.files {
            if doc.size > self.config.ingest.max_file_bytes {
                tracing::warn!(file = %doc.relative_path, size = doc.size, "skipping oversized file");
                report.skipped_files.push(SkippedFile {
                    name: doc.relative_path.clone(),
                    reason: "too large".to_string(),
                });
                continue;
            }

            let units = match self.extractor.extract(doc) {
                Ok(units) => units,
                Err(e) => {
                    tracing::warn!(file = %doc.relative_path, error = %e, "extraction failed");
                    report.errors.push(FileError {
                        name: doc.relative_path.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let base = chunk_metadata(doc, indexed_time);
            let doc_chunks = self.chunker.chunk_units(units.iter().map(|unit| {
                let mut metadata = base.clone();
                metadata.extra = unit.metadata.clone();
                (unit.text.as_str(), metadata)
            }));

            if doc_chunks.is_empty() {
                tracing::debug!(file = %doc.relative_path, "no text extracted");
                report.skipped_files.push(SkippedFile {
                    name: doc.relative_path.clone(),
                    reason: "no text".to_string(),
                });
                continue;
            }

            tracing::debug!(file = %doc.relative_path, chunks = doc_chunks.len(), "extracted");
            report.indexed_files.push(doc.relative_path.clone());
            chunks.extend(doc_chunks);
        }

        if chunks.is_empty() {
            tracing::warn!(
                skipped = report.skipped_files.len(),
                errors = report.errors.len(),
                "no documents could be processed"
            );
            return Err(VaultError::NoDocuments(Box::new(report)));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors =
            embedding::embed_batched(embedder.as_ref(), &texts, self.config.embedding.batch_size)
                .await
                .map_err(|e| VaultError::unavailable(CapabilityKind::Embeddings, format!("{:#}", e)))?;
        let dims = self.check_vectors(&vectors)?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();
        let model = embedder.model_name();

        let append_to = if force_rebuild {
            None
        } else {
            self.index.as_ref()
        };
        if let Some(existing) = append_to {
            ensure_compatible(existing.meta(), model, Some(dims))?;
            existing
                .append(&entries)
                .await
                .map_err(VaultError::Persistence)?;
        } else {
            self.rebuild(model, dims, &entries).await?;
            report.rebuilt = true;
        }

        report.chunk_count = entries.len();
        tracing::info!(
            files = report.indexed_files.len(),
            chunks = report.chunk_count,
            rebuilt = report.rebuilt,
            "ingestion complete"
        );
        Ok(report)
    }

    /// Uniform, non-zero width that matches `embedding.dims` when set.
    fn check_vectors(&self, vectors: &[Vec<f32>]) -> Result<usize, VaultError> {
        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if dims == 0 {
            return Err(VaultError::unavailable(
                CapabilityKind::Embeddings,
                "backend returned empty vectors",
            ));
        }
        if vectors.iter().any(|v| v.len() != dims) {
            return Err(VaultError::unavailable(
                CapabilityKind::Embeddings,
                "backend returned vectors of differing widths",
            ));
        }
        if let Some(expected) = self.config.embedding.dims {
            if expected != dims {
                return Err(VaultError::unavailable(
                    CapabilityKind::Embeddings,
                    format!("backend returned {} dims, embedding.dims is {}", dims, expected),
                ));
            }
        }
        Ok(dims)
    }

    async fn rebuild(
        &mut self,
        model: &str,
        dims: usize,
        entries: &[IndexEntry],
    ) -> Result<(), VaultError> {
        let path = self.config.paths.index.clone();
        let staged = index::stage(&path, model, dims, entries)
            .await
            .map_err(VaultError::Persistence)?;

        if let Some(old) = self.index.take() {
            old.close().await;
        }

        match staged.commit().await {
            Ok(fresh) => {
                tracing::info!(path = %path.display(), "index rebuilt");
                self.index = Some(fresh);
                Ok(())
            }
            Err(e) => {
                // The rename did not happen, so the previous file is still in place
                self.index = VectorIndex::open(&path).await.ok().flatten();
                Err(VaultError::Persistence(e))
            }
        }
    }

    /// Answer `question` from the indexed documents.
    ///
    /// With `context`, the question is rewritten to carry the prior turns
    /// and that rewritten form is what gets embedded and answered; the
    /// literal question is kept on the result. Up to `max_results`
    /// sources are returned, best first.
    pub async fn query(
        &self,
        question: &str,
        context: Option<&str>,
        max_results: usize,
    ) -> Result<QueryResult, VaultError> {
        let index = self.index.as_ref().ok_or_else(|| {
            VaultError::NotReady("documents are not indexed yet; run ingest first".to_string())
        })?;
        let generator = match &self.generation {
            Capability::Available(generator) => generator,
            Capability::Unavailable { reason } => {
                return Err(VaultError::NotReady(format!(
                    "generation is not available ({})",
                    reason
                )))
            }
        };
        let embedder = self.embeddings.require(CapabilityKind::Embeddings)?;
        ensure_compatible(index.meta(), embedder.model_name(), None)?;

        let effective_question = context
            .filter(|c| !c.trim().is_empty())
            .map(|c| augment_question(question, c));
        let prompt_question = effective_question.as_deref().unwrap_or(question);

        let query_vec = embedding::embed_one(embedder.as_ref(), prompt_question)
            .await
            .map_err(|e| VaultError::unavailable(CapabilityKind::Embeddings, format!("{:#}", e)))?;
        ensure_compatible(index.meta(), embedder.model_name(), Some(query_vec.len()))?;

        let retrieval_k = self.config.retrieval.retrieval_k;
        let hits = index
            .search(&query_vec, retrieval_k.max(max_results))
            .await
            .map_err(VaultError::Persistence)?;
        tracing::debug!(hits = hits.len(), "retrieved chunks");

        let grounding = &hits[..hits.len().min(retrieval_k)];
        let prompt = build_grounded_prompt(prompt_question, grounding);
        let answer = generator
            .generate(&prompt)
            .await
            .map_err(|e| VaultError::unavailable(CapabilityKind::Generation, format!("{:#}", e)))?;

        let sources = hits
            .iter()
            .take(max_results)
            .map(|hit| self.attribution(hit))
            .collect();

        Ok(QueryResult {
            answer,
            sources,
            question: question.to_string(),
            effective_question,
            grounded: !hits.is_empty(),
            timestamp: Local::now().to_rfc3339(),
        })
    }

    fn attribution(&self, hit: &ScoredChunk) -> SourceAttribution {
        let meta = &hit.chunk.metadata;
        SourceAttribution {
            file: meta.source_file.clone(),
            path: meta.relative_path.clone(),
            file_type: meta.file_type.clone(),
            size: meta.file_size,
            content_preview: preview(&hit.chunk.text, self.config.retrieval.preview_chars),
            indexed_time: meta.indexed_time.to_rfc3339(),
            score: hit.score,
        }
    }

    /// Health overview. Never fails; anything that cannot be determined
    /// is reported as unavailable or absent.
    pub async fn status(&self) -> VaultStatus {
        let scan = match self.scan() {
            Ok(scan) => Some(scan),
            Err(e) => {
                tracing::warn!(error = %e, "scan failed during status");
                None
            }
        };
        let indexed_chunks = match &self.index {
            Some(index) => index.len().await.ok(),
            None => None,
        };

        let embeddings_available = self.embeddings.is_available();
        let generation_available = self.generation.is_available();
        let embedding_model = match &self.embeddings {
            Capability::Available(provider) => provider.model_name().to_string(),
            Capability::Unavailable { .. } => self.config.embedding.model_name().to_string(),
        };

        VaultStatus {
            model_name: self.config.generation.model_name().to_string(),
            embedding_model,
            ai_available: embeddings_available && generation_available,
            embeddings_available,
            generation_available,
            index_available: self.index.is_some(),
            query_ready: self.index.is_some() && embeddings_available && generation_available,
            indexed_chunks,
            docs_folder: self.config.paths.docs.display().to_string(),
            index_path: self.config.paths.index.display().to_string(),
            total_files: scan.as_ref().map(|s| s.total_files).unwrap_or(0),
            total_size_mb: scan.as_ref().map(|s| s.total_size_mb).unwrap_or(0.0),
            supported_types: supported_types(),
            last_scan: scan.map(|s| s.scan_time).unwrap_or_default(),
        }
    }

    /// Delete all persisted index data. Succeeds when there is nothing to
    /// delete.
    pub async fn clear_index(&mut self) -> Result<(), VaultError> {
        if let Some(index) = self.index.take() {
            index.close().await;
        }
        let removed =
            VectorIndex::destroy(&self.config.paths.index).map_err(VaultError::Persistence)?;
        tracing::info!(removed, path = %self.config.paths.index.display(), "index cleared");
        Ok(())
    }
}

fn chunk_metadata(doc: &DocumentRecord, indexed_time: chrono::DateTime<Utc>) -> ChunkMetadata {
    ChunkMetadata {
        source_file: doc.name.clone(),
        file_path: doc.path.display().to_string(),
        relative_path: doc.relative_path.clone(),
        file_type: doc.file_type.clone(),
        file_size: doc.size,
        file_hash: doc.fingerprint.clone(),
        indexed_time,
        extra: serde_json::Map::new(),
    }
}

fn ensure_compatible(meta: &IndexMeta, model: &str, dims: Option<usize>) -> Result<(), VaultError> {
    let model_differs = meta.embedding_model != model;
    let dims_differ = dims.is_some_and(|d| d != meta.dims);
    if model_differs || dims_differ {
        return Err(VaultError::IndexMismatch {
            indexed: meta.describe(),
            configured: match dims {
                Some(d) => format!("{} ({} dims)", model, d),
                None => model.to_string(),
            },
        });
    }
    Ok(())
}

/// First `max_chars` characters, with `...` appended when cut.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
