//! Remote and on-device model boundaries.
//!
//! Each provider module exposes a struct that implements one or more of
//! [`RemoteChatModel`], [`EnrichmentModel`] and [`LocalInferenceBridge`].

pub mod gemini;
pub mod llama_server;
pub(crate) mod openai_compat;

use std::path::Path;

use async_trait::async_trait;
use wander_core::{Destination, WanderError};

use crate::types::EnrichedFields;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that any model provider may return.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited")]
    RateLimit,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    #[error("Model is not loaded")]
    NotLoaded,

    #[error("Timeout")]
    Timeout,

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Provider error: {0}")]
    Other(String),
}

impl From<ProviderError> for WanderError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ModelUnavailable(_)
            | ProviderError::NotLoaded
            | ProviderError::EmptyResponse => WanderError::InferenceUnavailable(err.to_string()),
            other => WanderError::SourceUnavailable(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Networked large model used for chat answers while online.
#[async_trait]
pub trait RemoteChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Networked model that generates descriptive fields for a destination.
#[async_trait]
pub trait EnrichmentModel: Send + Sync {
    fn name(&self) -> &str;

    async fn enrich(&self, destination: &Destination) -> Result<EnrichedFields, ProviderError>;
}

/// Bridge to a single shared, slow-starting on-device model.
///
/// Callers serialize `generate` calls; implementations need not support
/// overlapping invocations.
#[async_trait]
pub trait LocalInferenceBridge: Send + Sync {
    async fn initialize(&self, model_path: &Path) -> Result<(), ProviderError>;

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError>;

    fn is_loaded(&self) -> bool;
}
