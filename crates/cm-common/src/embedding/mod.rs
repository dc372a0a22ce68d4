pub mod hash_provider;
pub mod http_provider;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use hash_provider::HashEmbeddingProvider;
pub use http_provider::HttpEmbeddingProvider;

/// Embedding failures are always explicit; a provider never hands back a
/// malformed vector. Every variant is fatal to the ranking run that hit it.
#[derive(Debug, Error)]
pub enum EmbeddingFailure {
    #[error("embedding request failed: {0}")]
    Transport(String),
    #[error("embedding endpoint returned status {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("embedding response was malformed: {0}")]
    Malformed(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Maps a text to a fixed-length dense vector.
///
/// Implementations:
/// - HttpEmbeddingProvider: remote embeddings endpoint (network, retried)
/// - HashEmbeddingProvider: feature hashing (deterministic, offline)
///
/// `name()` is recorded for provenance alongside ranking runs.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Implementation name ("http", "hash").
    fn name(&self) -> &'static str;

    /// Fixed output dimension for this deployment.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingFailure>;
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Vector dimension expected from the backend, constant per deployment.
    pub dimension: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8001/v1/embeddings".into(),
            api_key: String::new(),
            model: "text-embedding-3-small".into(),
            dimension: 1536,
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        fn parse_u64(key: &str, default: u64) -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(default)
        }

        fn parse_u32(key: &str, default: u32) -> u32 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(default)
        }

        fn parse_usize(key: &str, default: usize) -> usize {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<usize>().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            endpoint: std::env::var("EMBEDDING_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: std::env::var("EMBEDDING_API_KEY").unwrap_or_default(),
            model: std::env::var("EMBEDDING_MODEL").unwrap_or(defaults.model),
            dimension: parse_usize("EMBEDDING_DIMENSION", defaults.dimension),
            timeout_secs: parse_u64("EMBEDDING_TIMEOUT_SECONDS", defaults.timeout_secs),
            max_retries: parse_u32("EMBEDDING_MAX_RETRIES", defaults.max_retries),
            retry_backoff_ms: parse_u64("EMBEDDING_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
        }
    }
}

/// Embedding provider factory. Falls back to the deterministic hash backend
/// when the HTTP client cannot be built.
pub fn create_provider(name: &str, config: EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match name {
        "http" => match HttpEmbeddingProvider::new(config.clone()) {
            Ok(provider) => Arc::new(provider),
            Err(_) => Arc::new(HashEmbeddingProvider::new(config.dimension)),
        },
        _ => Arc::new(HashEmbeddingProvider::new(config.dimension)),
    }
}

/// Build the configured provider from the environment.
/// `EMBEDDING_PROVIDER` selects the backend (default: "hash").
pub fn provider_from_env() -> Arc<dyn EmbeddingProvider> {
    let name = std::env::var("EMBEDDING_PROVIDER").unwrap_or_else(|_| "hash".into());
    create_provider(&name, EmbeddingConfig::from_env())
}
