//! Persistent vector index.
//!
//! One SQLite file holds every `(chunk, embedding)` entry plus a metadata
//! row pinning the embedding model and vector width; all entries of one
//! index share that width. Search is an exact brute-force cosine scan,
//! which is ample for a personal document folder.
//!
//! # Lifecycle
//!
//! ```text
//! stage(path, entries) ──► StagedIndex (path.building) ──commit()──► VectorIndex (path)
//!                                                                       │
//!                                                      append(entries) ◄┘
//! ```
//!
//! A rebuild is written beside the live file and renamed over it only
//! once complete, so a failed rebuild never damages the index in use.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ChunkMetadata, ScoredChunk};

/// A chunk together with its embedding vector.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Embedding space an index was built in.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub dims: usize,
    pub created_at: i64,
}

impl IndexMeta {
    pub fn describe(&self) -> String {
        format!("{} ({} dims)", self.embedding_model, self.dims)
    }
}

/// An open index file.
pub struct VectorIndex {
    path: PathBuf,
    pool: SqlitePool,
    meta: IndexMeta,
}

/// A fully written rebuild waiting to replace the live index.
pub struct StagedIndex {
    staging_path: PathBuf,
    final_path: PathBuf,
}

impl VectorIndex {
    /// Open an existing index, or `None` if there is no file at `path`.
    pub async fn open(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let pool = db::connect(path, false).await?;
        let meta = match read_meta(&pool).await {
            Ok(meta) => meta,
            Err(e) => {
                pool.close().await;
                return Err(e.context(format!("{} is not a valid index", path.display())));
            }
        };

        Ok(Some(Self {
            path: path.to_path_buf(),
            pool,
            meta,
        }))
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Number of entries.
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Add entries in one transaction. Existing entries are left alone.
    pub async fn append(&self, entries: &[IndexEntry]) -> Result<()> {
        check_dims(entries, self.meta.dims)?;

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            insert_entry(&mut tx, entry).await?;
        }
        sqlx::query("UPDATE index_meta SET updated_at = ? WHERE id = 1")
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(added = entries.len(), path = %self.path.display(), "appended to index");
        Ok(())
    }

    /// The `k` entries most similar to `query`, best first.
    ///
    /// Ties keep insertion order so results are stable across calls.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.meta.dims {
            bail!(
                "query vector has {} dims, index expects {}",
                query.len(),
                self.meta.dims
            );
        }

        let rows = sqlx::query(
            r#"
            SELECT rowid AS seq, id, chunk_index, text, source_file, file_path, relative_path,
                   file_type, file_size, file_hash, indexed_at, extra_json, embedding
            FROM entries
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, i64, Chunk)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(query, &blob_to_vec(&blob));
            scored.push((score, row.get("seq"), row_to_chunk(row)?));
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, _, chunk)| ScoredChunk { chunk, score })
            .collect())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Remove the index file (and any half-written rebuild). Returns
    /// whether anything was deleted; a missing file is not an error.
    pub fn destroy(path: &Path) -> Result<bool> {
        let mut removed = false;
        for candidate in [path.to_path_buf(), staging_path(path)] {
            match std::fs::remove_file(&candidate) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to delete {}", candidate.display()))
                }
            }
        }
        Ok(removed)
    }
}

/// Write a complete fresh index next to `path`.
pub async fn stage(
    path: &Path,
    embedding_model: &str,
    dims: usize,
    entries: &[IndexEntry],
) -> Result<StagedIndex> {
    check_dims(entries, dims)?;

    let staging = staging_path(path);
    if staging.exists() {
        std::fs::remove_file(&staging)
            .with_context(|| format!("Failed to remove stale {}", staging.display()))?;
    }

    let pool = db::connect(&staging, true).await?;
    let written = write_fresh(&pool, embedding_model, dims, entries).await;
    pool.close().await;

    if let Err(e) = written {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }

    Ok(StagedIndex {
        staging_path: staging,
        final_path: path.to_path_buf(),
    })
}

impl StagedIndex {
    /// Move the staged file over the live path and open it. Any handle on
    /// the old file must be closed first.
    pub async fn commit(self) -> Result<VectorIndex> {
        std::fs::rename(&self.staging_path, &self.final_path).with_context(|| {
            format!(
                "Failed to move {} into place",
                self.staging_path.display()
            )
        })?;

        VectorIndex::open(&self.final_path)
            .await?
            .with_context(|| format!("{} vanished after rebuild", self.final_path.display()))
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".building");
    path.with_file_name(name)
}

async fn write_fresh(
    pool: &SqlitePool,
    embedding_model: &str,
    dims: usize,
    entries: &[IndexEntry],
) -> Result<()> {
    db::migrate(pool).await?;

    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO index_meta (id, embedding_model, dims, created_at, updated_at) VALUES (1, ?, ?, ?, ?)",
    )
    .bind(embedding_model)
    .bind(dims as i64)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for entry in entries {
        insert_entry(&mut tx, entry).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn insert_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &IndexEntry,
) -> Result<()> {
    let chunk = &entry.chunk;
    let meta = &chunk.metadata;
    sqlx::query(
        r#"
        INSERT INTO entries (id, chunk_index, text, source_file, file_path, relative_path,
                             file_type, file_size, file_hash, indexed_at, extra_json, embedding)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&chunk.id)
    .bind(chunk.chunk_index)
    .bind(&chunk.text)
    .bind(&meta.source_file)
    .bind(&meta.file_path)
    .bind(&meta.relative_path)
    .bind(&meta.file_type)
    .bind(meta.file_size as i64)
    .bind(&meta.file_hash)
    .bind(meta.indexed_time.timestamp())
    .bind(serde_json::to_string(&meta.extra)?)
    .bind(vec_to_blob(&entry.embedding))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn read_meta(pool: &SqlitePool) -> Result<IndexMeta> {
    let row = sqlx::query("SELECT embedding_model, dims, created_at FROM index_meta WHERE id = 1")
        .fetch_optional(pool)
        .await?
        .context("index metadata missing")?;

    let dims: i64 = row.get("dims");
    Ok(IndexMeta {
        embedding_model: row.get("embedding_model"),
        dims: dims as usize,
        created_at: row.get("created_at"),
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
    let indexed_at: i64 = row.get("indexed_at");
    let file_size: i64 = row.get("file_size");
    let extra_json: String = row.get("extra_json");

    Ok(Chunk {
        id: row.get("id"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        metadata: ChunkMetadata {
            source_file: row.get("source_file"),
            file_path: row.get("file_path"),
            relative_path: row.get("relative_path"),
            file_type: row.get("file_type"),
            file_size: file_size as u64,
            file_hash: row.get("file_hash"),
            indexed_time: DateTime::<Utc>::from_timestamp(indexed_at, 0).unwrap_or_default(),
            extra: serde_json::from_str(&extra_json).unwrap_or_default(),
        },
    })
}

fn check_dims(entries: &[IndexEntry], dims: usize) -> Result<()> {
    if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dims) {
        bail!(
            "embedding for chunk {} has {} dims, index expects {}",
            bad.chunk.id,
            bad.embedding.len(),
            dims
        );
    }
    Ok(())
}
