//! # Memory Vault
//!
//! A local-first document vault: drop files into a folder, index them into
//! a semantic store, and ask questions answered from those documents with
//! the conversation remembered across runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │  LocalDocs  │──▶│ scan → extract →     │──▶│ VectorIndex  │
//! │  (folder)   │   │ chunk → embed        │   │   (SQLite)   │
//! └─────────────┘   └──────────────────────┘   └──────┬───────┘
//!                                                     │ top-k
//!                   ┌──────────────┐   context  ┌─────▼──────┐
//!                   │ SessionStore │──────────▶│ query/ask  │──▶ answer + sources
//!                   │   (JSON)     │◀──────────│ (generate) │
//!                   └──────────────┘   turns    └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vault ingest                  # index everything in ./LocalDocs
//! vault ask "What did the lease say about pets?"
//! vault status
//! vault memory search pizza
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Vault and memory error taxonomy |
//! | [`models`] | Core data types and result payloads |
//! | [`fingerprint`] | Content hashes for change detection |
//! | [`scan`] | Documents-folder scanner |
//! | [`extract`] | Per-file-type text extraction |
//! | [`chunk`] | Overlapping text chunker |
//! | [`capability`] | Probed availability of AI backends |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Generation providers and grounded prompts |
//! | [`db`] | SQLite connection and schema |
//! | [`index`] | Persistent vector index |
//! | [`vault`] | Ingestion, query, status and index administration |
//! | [`memory`] | Durable conversation sessions |
//! | [`chat`] | Context-aware "ask" workflow |
//! | [`commands`] | CLI command implementations |

pub mod capability;
pub mod chat;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod generation;
pub mod index;
pub mod memory;
pub mod models;
pub mod scan;
pub mod vault;
