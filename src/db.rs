use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open the SQLite file at `path`, creating it (and its parent directory)
/// when `create` is set.
///
/// Rollback-journal mode keeps each index in a single file so a finished
/// rebuild can be swapped in with one rename.
pub async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    if create {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open index at {}", path.display()))?;

    Ok(pool)
}

/// Create the index tables if they do not exist yet.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // Single row describing the embedding space of the whole index
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            embedding_model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            source_file TEXT NOT NULL,
            file_path TEXT NOT NULL,
            relative_path TEXT NOT NULL,
            file_type TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            file_hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL,
            extra_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_file_hash ON entries(file_hash)")
        .execute(pool)
        .await?;

    Ok(())
}
