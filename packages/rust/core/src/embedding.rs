//! Embedding capability: the [`Embedder`] trait and an OpenAI-compatible
//! `/embeddings` client.

use std::time::Duration;

use async_trait::async_trait;
use careerscout_shared::{CareerScoutError, EmbeddingConfig, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Turns texts into vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside cached vectors.
    fn model(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// First retry delay; doubled per attempt.
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Async client for OpenAI-compatible embedding endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    backoff: Duration,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(CareerScoutError::config("embedding.model must not be empty"));
        }
        Ok(Self {
            client: careerscout_sources::build_client(config.timeout_secs)?,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_retries: config.max_retries,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Override the initial retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        self.backoff * (1u32 << attempt.min(5))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let mut attempt = 0usize;
        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            let retry_reason = match response {
                Ok(resp) if resp.status().is_success() => {
                    let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                        CareerScoutError::parse(format!("invalid embedding response: {e}"))
                    })?;
                    if parsed.data.len() != texts.len() {
                        return Err(CareerScoutError::parse(format!(
                            "embedding endpoint returned {} vectors for {} inputs",
                            parsed.data.len(),
                            texts.len()
                        )));
                    }
                    parsed.data.sort_by_key(|entry| entry.index);
                    debug!(inputs = texts.len(), attempt, "embeddings computed");
                    return Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    if !should_retry(status) {
                        return Err(CareerScoutError::Network(format!(
                            "embedding request failed ({status}): {body}"
                        )));
                    }
                    format!("HTTP {status}")
                }
                Err(e) => e.to_string(),
            };

            if attempt + 1 >= self.max_retries.max(1) {
                return Err(CareerScoutError::Network(format!(
                    "embedding request failed after {} attempts: {retry_reason}",
                    attempt + 1
                )));
            }
            attempt += 1;
            let delay = self.retry_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, reason = %retry_reason, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
