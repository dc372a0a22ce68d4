use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::{EmbeddingConfig, EmbeddingFailure, EmbeddingProvider};

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Parse an embeddings endpoint body and validate the vector dimension.
fn parse_embeddings_body(body: &str, expected_dim: usize) -> Result<Vec<f32>, EmbeddingFailure> {
    let parsed: EmbeddingsResponse =
        serde_json::from_str(body).map_err(|e| EmbeddingFailure::Malformed(e.to_string()))?;

    let first = parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingFailure::Malformed("empty data array".into()))?;

    if first.embedding.len() != expected_dim {
        return Err(EmbeddingFailure::DimensionMismatch {
            expected: expected_dim,
            actual: first.embedding.len(),
        });
    }

    Ok(first.embedding)
}

fn is_retryable(failure: &EmbeddingFailure) -> bool {
    match failure {
        EmbeddingFailure::Transport(_) => true,
        EmbeddingFailure::Endpoint { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Embeddings over HTTP against an OpenAI-compatible `/v1/embeddings`
/// endpoint. Calls carry a client-level timeout and are retried with
/// multiplicative backoff for transport errors and 5xx/429 responses.
pub struct HttpEmbeddingProvider {
    client: Client,
    config: EmbeddingConfig,
}

impl HttpEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    async fn request_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingFailure> {
        let payload = EmbeddingsRequest {
            model: &self.config.model,
            input: text,
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingFailure::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EmbeddingFailure::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(EmbeddingFailure::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        parse_embeddings_body(&body, self.config.dimension)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingFailure> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.request_once(text).await {
                Ok(vector) => return Ok(vector),
                Err(failure) => {
                    if attempt > self.config.max_retries || !is_retryable(&failure) {
                        return Err(failure);
                    }

                    let backoff = Duration::from_millis(
                        self.config.retry_backoff_ms.saturating_mul(1 << (attempt - 1).min(8)),
                    );
                    warn!(
                        attempt,
                        error = %failure,
                        backoff_ms = backoff.as_millis() as u64,
                        "embedding request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
