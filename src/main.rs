//! # Memory Vault CLI (`vault`)
//!
//! ## Usage
//!
//! ```bash
//! vault --config ./vault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vault scan` | List the supported files in the documents folder |
//! | `vault ingest [--rebuild]` | Index the documents folder |
//! | `vault query "<question>"` | Answer a question from the documents |
//! | `vault ask "<question>"` | Answer using the current conversation as context |
//! | `vault status` | Show backend, index and folder health |
//! | `vault clear-index` | Delete the index |
//! | `vault memory <action>` | Inspect or reset conversation memory |
//!
//! Logs go to stderr and are controlled by `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use memory_vault::{commands, config};

/// Memory Vault: ask questions of your own documents.
#[derive(Parser)]
#[command(
    name = "vault",
    about = "Memory Vault: a local-first document vault with grounded answers and conversation memory",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./vault.toml")]
    config: PathBuf,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the documents folder without indexing anything.
    Scan,

    /// Index the documents folder.
    ///
    /// Appends to the existing index unless `--rebuild` is given.
    Ingest {
        /// Discard the existing index and build a fresh one.
        #[arg(long)]
        rebuild: bool,
    },

    /// Answer a question from the indexed documents.
    Query {
        question: String,

        /// Prior conversation to take into account.
        #[arg(long)]
        context: Option<String>,

        /// Maximum number of sources to return.
        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Answer a question using the current conversation session.
    Ask {
        question: String,

        /// Maximum number of sources to return.
        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Show vault health.
    Status,

    /// Delete the index.
    ClearIndex,

    /// Manage conversation memory.
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Session and message counts.
    Stats,
    /// Latest messages of the current session.
    Recent {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Search all sessions for a phrase (case-insensitive).
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List all sessions.
    Sessions,
    /// Start a new session and make it current.
    NewSession,
    /// Delete all sessions.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let json = cli.json;

    match cli.command {
        Commands::Scan => commands::run_scan(&cfg, json)?,
        Commands::Ingest { rebuild } => commands::run_ingest(&cfg, rebuild, json).await?,
        Commands::Query {
            question,
            context,
            max_results,
        } => {
            commands::run_query(&cfg, &question, context.as_deref(), max_results, json).await?
        }
        Commands::Ask {
            question,
            max_results,
        } => commands::run_ask(&cfg, &question, max_results, json).await?,
        Commands::Status => commands::run_status(&cfg, json).await?,
        Commands::ClearIndex => commands::run_clear_index(&cfg, json)?,
        Commands::Memory { action } => match action {
            MemoryAction::Stats => commands::run_memory_stats(&cfg, json)?,
            MemoryAction::Recent { count } => commands::run_memory_recent(&cfg, count, json)?,
            MemoryAction::Search { query, limit } => {
                commands::run_memory_search(&cfg, &query, limit, json)?
            }
            MemoryAction::Sessions => commands::run_memory_sessions(&cfg, json)?,
            MemoryAction::NewSession => commands::run_memory_new_session(&cfg, json)?,
            MemoryAction::Clear => commands::run_memory_clear(&cfg)?,
        },
    }

    Ok(())
}
