//! Runtime availability of the external AI backends.
//!
//! Constructing a provider only proves the configuration parsed. Whether
//! the backend actually works is decided by a live probe, and the outcome
//! is kept as an explicit [`Capability`] state that every dependent
//! operation checks first.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{CapabilityKind, VaultError};
use crate::generation::GenerationProvider;

/// A backend that is either usable or known to be unusable, with the reason.
pub enum Capability<T: ?Sized> {
    Available(Arc<T>),
    Unavailable { reason: String },
}

impl<T: ?Sized> Capability<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Capability::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    /// The backend, or the `Unavailable` error for `kind`.
    pub fn require(&self, kind: CapabilityKind) -> Result<&Arc<T>, VaultError> {
        match self {
            Capability::Available(backend) => Ok(backend),
            Capability::Unavailable { reason } => Err(VaultError::unavailable(kind, reason)),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Capability::Available(_) => None,
            Capability::Unavailable { reason } => Some(reason),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Available(_) => write!(f, "Available"),
            Capability::Unavailable { reason } => write!(f, "Unavailable({})", reason),
        }
    }
}

/// Embed a throwaway string and require a non-empty vector back.
pub async fn probe_embeddings(
    provider: Arc<dyn EmbeddingProvider>,
) -> Capability<dyn EmbeddingProvider> {
    match provider.probe().await {
        Ok(vector) if !vector.is_empty() => {
            tracing::info!(model = provider.model_name(), "embeddings available");
            Capability::Available(provider)
        }
        Ok(_) => {
            tracing::warn!(model = provider.model_name(), "embedding probe returned no vector");
            Capability::unavailable("embedding probe returned an empty vector")
        }
        Err(e) => {
            tracing::warn!(model = provider.model_name(), error = %e, "embeddings unavailable");
            Capability::unavailable(format!("{:#}", e))
        }
    }
}

pub async fn probe_generation(
    provider: Arc<dyn GenerationProvider>,
) -> Capability<dyn GenerationProvider> {
    match provider.probe().await {
        Ok(()) => {
            tracing::info!(model = provider.model_name(), "generation available");
            Capability::Available(provider)
        }
        Err(e) => {
            tracing::warn!(model = provider.model_name(), error = %e, "generation unavailable");
            Capability::unavailable(format!("{:#}", e))
        }
    }
}
