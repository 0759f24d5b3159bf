//! Error taxonomy for vault operations.
//!
//! Per-file extraction problems never surface here: they are collected
//! into [`IngestReport::errors`](crate::models::IngestReport) so that one
//! bad file cannot abort a batch. Everything that stops an operation as a
//! whole is a [`VaultError`], and every variant maps onto a stable
//! [`ErrorKind`] for structured output.

use serde::Serialize;
use std::fmt;

use crate::models::IngestReport;

/// External capability a vault operation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Embeddings,
    Generation,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Embeddings => write!(f, "embeddings"),
            CapabilityKind::Generation => write!(f, "generation"),
        }
    }
}

/// Category of a [`VaultError`], as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unavailable,
    NotReady,
    NoDocuments,
    IndexMismatch,
    Persistence,
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// An embedding or generation backend is unreachable or not functional.
    #[error("AI {capability} not available - check model connection ({reason})")]
    Unavailable {
        capability: CapabilityKind,
        reason: String,
    },

    /// A query was attempted before an index or generator exists.
    #[error("not ready: {0}")]
    NotReady(String),

    /// Ingestion produced no text at all; the report says why.
    #[error("no documents could be processed")]
    NoDocuments(Box<IngestReport>),

    /// The index was built with a different embedding model or width.
    #[error("index was built with {indexed}, but the configured embeddings produce {configured}; rebuild the index")]
    IndexMismatch { indexed: String, configured: String },

    /// Reading or writing the persisted index failed.
    #[error("index storage error: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Unavailable { .. } => ErrorKind::Unavailable,
            VaultError::NotReady(_) => ErrorKind::NotReady,
            VaultError::NoDocuments(_) => ErrorKind::NoDocuments,
            VaultError::IndexMismatch { .. } => ErrorKind::IndexMismatch,
            VaultError::Persistence(_) => ErrorKind::Persistence,
        }
    }

    pub(crate) fn unavailable(capability: CapabilityKind, reason: impl fmt::Display) -> Self {
        VaultError::Unavailable {
            capability,
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by the conversation [`SessionStore`](crate::memory::SessionStore).
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("current session {0} not found")]
    SessionNotFound(String),

    /// The in-memory state changed but could not be written to disk.
    #[error("could not save memory to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_message_names_capability() {
        let err = VaultError::unavailable(CapabilityKind::Embeddings, "connection refused");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        let msg = err.to_string();
        assert!(msg.contains("embeddings"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NotReady).unwrap();
        assert_eq!(json, "\"not_ready\"");
    }
}
