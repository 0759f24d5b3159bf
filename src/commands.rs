//! `vault` subcommand implementations.
//!
//! Each `run_*` function performs one operation and prints its outcome to
//! stdout, either as a human-readable summary or, with `--json`, as a
//! single JSON object carrying a `success` flag. Failures are returned to
//! the caller after printing so the process exits non-zero.

use anyhow::Result;
use serde::Serialize;

use crate::chat;
use crate::config::Config;
use crate::error::VaultError;
use crate::index::VectorIndex;
use crate::memory::SessionStore;
use crate::models::{IngestReport, QueryResult};
use crate::scan::scan_documents;
use crate::vault::Vault;

#[derive(Serialize)]
struct Success<'a, T: Serialize> {
    success: bool,
    #[serde(flatten)]
    payload: &'a T,
}

#[derive(Serialize)]
struct Failure<'a> {
    success: bool,
    kind: crate::error::ErrorKind,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a IngestReport>,
}

fn print_json<T: Serialize>(payload: &T) -> Result<()> {
    let out = Success {
        success: true,
        payload,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Report a failed vault operation and hand the error back.
fn fail(err: VaultError, json: bool) -> anyhow::Error {
    let report = match &err {
        VaultError::NoDocuments(report) => Some(report.as_ref()),
        _ => None,
    };

    if json {
        let out = Failure {
            success: false,
            kind: err.kind(),
            error: err.to_string(),
            report,
        };
        if let Ok(text) = serde_json::to_string_pretty(&out) {
            println!("{}", text);
        }
    } else if let Some(report) = report {
        print_ingest_problems(report);
    }

    err.into()
}

pub fn run_scan(config: &Config, json: bool) -> Result<()> {
    let scan = scan_documents(&config.paths.docs, &config.scan)?;

    if json {
        return print_json(&scan);
    }

    println!("Documents in {}", config.paths.docs.display());
    println!();
    for file in &scan.files {
        println!(
            "  {:<48} {:>6} {:>10.2} MB",
            file.relative_path, file.file_type, file.size_mb
        );
    }
    println!();
    println!(
        "{} files, {:.4} MB total",
        scan.total_files, scan.total_size_mb
    );
    Ok(())
}

pub async fn run_ingest(config: &Config, rebuild: bool, json: bool) -> Result<()> {
    let mut vault = Vault::open(config.clone()).await?;
    let report = vault.ingest(rebuild).await.map_err(|e| fail(e, json))?;

    if json {
        return print_json(&report);
    }

    println!(
        "{} {} chunks from {} files.",
        if report.rebuilt { "Rebuilt index with" } else { "Indexed" },
        report.chunk_count,
        report.indexed_files.len()
    );
    print_ingest_problems(&report);
    Ok(())
}

fn print_ingest_problems(report: &IngestReport) {
    if !report.skipped_files.is_empty() {
        println!("Skipped:");
        for skipped in &report.skipped_files {
            println!("  {}", skipped);
        }
    }
    if !report.errors.is_empty() {
        println!("Errors:");
        for error in &report.errors {
            println!("  {}", error);
        }
    }
}

pub async fn run_query(
    config: &Config,
    question: &str,
    context: Option<&str>,
    max_results: Option<usize>,
    json: bool,
) -> Result<()> {
    let vault = Vault::open(config.clone()).await?;
    let max_results = max_results.unwrap_or(config.retrieval.max_results);
    let result = vault
        .query(question, context, max_results)
        .await
        .map_err(|e| fail(e, json))?;

    if json {
        return print_json(&result);
    }
    print_answer(&result);
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    max_results: Option<usize>,
    json: bool,
) -> Result<()> {
    let vault = Vault::open(config.clone()).await?;
    let mut memory = SessionStore::open(&config.paths.memory);
    let max_results = max_results.unwrap_or(config.retrieval.max_results);
    let result = chat::ask(&vault, &mut memory, question, max_results)
        .await
        .map_err(|e| fail(e, json))?;

    if json {
        return print_json(&result);
    }
    print_answer(&result);
    Ok(())
}

fn print_answer(result: &QueryResult) {
    println!("{}", result.answer);
    println!();
    if !result.grounded {
        println!("(No matching passages were found in your documents.)");
        return;
    }
    println!("Sources:");
    for (i, source) in result.sources.iter().enumerate() {
        println!(
            "  {}. {} [{}] score {:.3}",
            i + 1,
            source.path,
            source.file_type,
            source.score
        );
        println!("     {}", source.content_preview.replace('\n', " "));
    }
}

pub async fn run_status(config: &Config, json: bool) -> Result<()> {
    let vault = Vault::open(config.clone()).await?;
    let status = vault.status().await;

    if json {
        return print_json(&status);
    }

    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("Memory Vault Status");
    println!("===================");
    println!();
    println!("  Model:        {}", status.model_name);
    println!("  Embeddings:   {} ({})", yes_no(status.embeddings_available), status.embedding_model);
    println!("  Generation:   {}", yes_no(status.generation_available));
    println!("  Index:        {}", yes_no(status.index_available));
    if let Some(chunks) = status.indexed_chunks {
        println!("  Chunks:       {}", chunks);
    }
    println!("  Query ready:  {}", yes_no(status.query_ready));
    println!();
    println!("  Documents:    {}", status.docs_folder);
    println!("  Index file:   {}", status.index_path);
    println!(
        "  Files:        {} ({:.4} MB)",
        status.total_files, status.total_size_mb
    );
    println!("  Last scan:    {}", status.last_scan);
    Ok(())
}

#[derive(Serialize)]
struct IndexCleared {
    index_path: String,
    removed: bool,
}

/// Delete the index file. Needs no AI backend, so none is contacted.
pub fn run_clear_index(config: &Config, json: bool) -> Result<()> {
    let removed = VectorIndex::destroy(&config.paths.index)
        .map_err(|e| fail(VaultError::Persistence(e), json))?;

    if json {
        return print_json(&IndexCleared {
            index_path: config.paths.index.display().to_string(),
            removed,
        });
    }
    if removed {
        println!("Index cleared.");
    } else {
        println!("Index cleared (there was no index).");
    }
    Ok(())
}

#[derive(Serialize)]
struct Matches<T: Serialize> {
    matches: Vec<T>,
}

#[derive(Serialize)]
struct SessionCreated {
    session_id: String,
}

pub fn run_memory_stats(config: &Config, json: bool) -> Result<()> {
    let memory = SessionStore::open(&config.paths.memory);
    let stats = memory.stats();
    if json {
        return print_json(&stats);
    }
    println!("  Memory file:     {}", stats.memory_file);
    println!("  Sessions:        {}", stats.total_sessions);
    println!("  Current session: {}", stats.current_session);
    println!("  Messages:        {}", stats.total_messages);
    println!("  Created:         {}", stats.created);
    println!(
        "  Last updated:    {}",
        stats.last_updated.as_deref().unwrap_or("never")
    );
    Ok(())
}

pub fn run_memory_recent(config: &Config, count: usize, json: bool) -> Result<()> {
    let memory = SessionStore::open(&config.paths.memory);
    let recent = memory.recent_context(count);
    if json {
        return print_json(&Matches {
            matches: recent.to_vec(),
        });
    }
    for message in recent {
        println!("[{}] {}: {}", message.timestamp, message.role, message.content);
    }
    Ok(())
}

pub fn run_memory_search(config: &Config, query: &str, limit: usize, json: bool) -> Result<()> {
    let memory = SessionStore::open(&config.paths.memory);
    let matches = memory.search_conversations(query, limit);
    if json {
        return print_json(&Matches { matches });
    }
    if matches.is_empty() {
        println!("No matches.");
    }
    for m in &matches {
        println!("{} | {}: {}", m.session_id, m.message.role, m.message.content);
    }
    Ok(())
}

pub fn run_memory_sessions(config: &Config, json: bool) -> Result<()> {
    let memory = SessionStore::open(&config.paths.memory);
    if json {
        return print_json(&Matches {
            matches: memory.sessions().to_vec(),
        });
    }
    for session in memory.sessions() {
        let marker = if session.id == memory.current_session() { "*" } else { " " };
        println!(
            "{} {}  {}  {} messages",
            marker,
            session.id,
            session.created,
            session.messages.len()
        );
    }
    Ok(())
}

pub fn run_memory_new_session(config: &Config, json: bool) -> Result<()> {
    let mut memory = SessionStore::open(&config.paths.memory);
    let session_id = memory.start_new_session()?;
    if json {
        return print_json(&SessionCreated { session_id });
    }
    println!("Started {}", session_id);
    Ok(())
}

pub fn run_memory_clear(config: &Config) -> Result<()> {
    let mut memory = SessionStore::open(&config.paths.memory);
    memory.clear_memory()?;
    println!("Memory cleared. Current session: {}", memory.current_session());
    Ok(())
}
