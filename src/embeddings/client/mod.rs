
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{Embedding, EmbeddingClient, EmbeddingError};
use crate::config::{ConfigError, EmbeddingConfig};

const EMBED_PATH: &str = "/api/embed";
const TAGS_PATH: &str = "/api/tags";

/// Smallest response body accepted, matching ureq's default read limit.
const MIN_RESPONSE_LIMIT: u64 = 10 * 1024 * 1024;
/// Body allowance per requested embedding; covers 4096-dim vectors as JSON text.
const BYTES_PER_EMBEDDING: u64 = 64 * 1024;

/// Blocking client for an Ollama-compatible `/api/embed` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    base_url: Url,
    model: String,
    batch_size: usize,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

impl HttpEmbeddingClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
        let base_url = config.embedding_url()?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size as usize,
            agent: build_agent(config.timeout()),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the provider answers and serves the configured model
    #[inline]
    pub fn health_check(&self) -> Result<(), EmbeddingError> {
        debug!("Performing health check for provider at {}", self.base_url);

        self.validate_model()?;

        info!(
            "Health check passed for provider at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Validate that the configured model is available
    #[inline]
    pub fn validate_model(&self) -> Result<(), EmbeddingError> {
        let models = self.list_models()?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available_models
            );
            Err(EmbeddingError::Provider(format!(
                "Model '{}' is not available. Available models: {:?}",
                self.model, available_models
            )))
        }
    }

    /// List all models the provider serves
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>, EmbeddingError> {
        let url = self.endpoint(TAGS_PATH)?;
        debug!("Fetching available models from {}", url);

        let mut response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(classify_transport)?;

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            return Err(classify_status(
                response.status().as_u16(),
                retry_after(&response),
                error_detail(&body),
            ));
        }

        let models_response: ModelsResponse = serde_json::from_str(&body).map_err(|e| {
            EmbeddingError::Provider(format!("Failed to parse models response: {}", e))
        })?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    fn endpoint(&self, path: &str) -> Result<Url, EmbeddingError> {
        self.base_url
            .join(path)
            .map_err(|e| EmbeddingError::Provider(format!("Failed to build URL for {path}: {e}")))
    }
}

impl EmbeddingClient for HttpEmbeddingClient {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.len() > self.batch_size {
            return Err(EmbeddingError::Provider(format!(
                "Batch of {} texts exceeds the limit of {}",
                texts.len(),
                self.batch_size
            )));
        }

        debug!("Requesting embeddings for {} texts", texts.len());

        let url = self.endpoint(EMBED_PATH)?;
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            EmbeddingError::Provider(format!("Failed to serialize embedding request: {}", e))
        })?;

        let mut response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .map_err(classify_transport)?;

        let body = response
            .body_mut()
            .with_config()
            .limit(response_limit(texts.len()))
            .read_to_string()
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            return Err(classify_status(
                response.status().as_u16(),
                retry_after(&response),
                error_detail(&body),
            ));
        }

        let embed_response: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            EmbeddingError::Provider(format!("Failed to parse embedding response: {}", e))
        })?;

        if embed_response.embeddings.len() != texts.len() {
            return Err(EmbeddingError::Provider(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                embed_response.embeddings.len()
            )));
        }

        debug!(
            "Received {} embeddings with {} dimensions",
            embed_response.embeddings.len(),
            embed_response.embeddings.first().map_or(0, Vec::len)
        );

        Ok(embed_response.embeddings)
    }
}

/// Map a non-success HTTP status to a failure kind.
pub(crate) fn classify_status(
    status: u16,
    retry_after_secs: Option<u64>,
    detail: String,
) -> EmbeddingError {
    match status {
        429 => EmbeddingError::RateLimited { retry_after_secs },
        502..=504 => EmbeddingError::Unavailable(format!("HTTP {status}: {detail}")),
        _ => EmbeddingError::Provider(format!("HTTP {status}: {detail}")),
    }
}

/// Map a transport-level failure to a failure kind.
pub(crate) fn classify_transport(error: ureq::Error) -> EmbeddingError {
    match &error {
        ureq::Error::StatusCode(status) => classify_status(*status, None, String::new()),
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => EmbeddingError::Unavailable(error.to_string()),
        _ => EmbeddingError::Provider(error.to_string()),
    }
}

fn retry_after(response: &ureq::http::Response<ureq::Body>) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Largest response body read for a batch of `texts` embeddings.
pub(crate) fn response_limit(texts: usize) -> u64 {
    (texts as u64)
        .saturating_mul(BYTES_PER_EMBEDDING)
        .max(MIN_RESPONSE_LIMIT)
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map_or_else(|_| body.trim().to_string(), |e| e.error)
}
