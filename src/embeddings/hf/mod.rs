
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::EmbeddingConfig;
use crate::embeddings::Embedder;
use crate::{RagError, Result};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for the Hugging Face Inference API feature-extraction pipeline.
///
/// The default model is a small multilingual sentence transformer, which is
/// why queries benefit from the keyword anchoring done by the query enhancer.
#[derive(Debug, Clone)]
pub struct HfInferenceClient {
    base_url: Url,
    model: String,
    api_key: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct FeatureExtractionRequest {
    inputs: Vec<String>,
    options: InferenceOptions,
}

#[derive(Debug, Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

impl HfInferenceClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .endpoint_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            batch_size: config.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn pipeline_url(&self) -> Result<Url> {
        self.base_url
            .join(&format!("/pipeline/feature-extraction/{}", self.model))
            .map_err(|e| RagError::Config(format!("Failed to build inference URL: {}", e)))
    }

    /// Embed one batch of texts with a single request.
    fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.pipeline_url()?;

        let request = FeatureExtractionRequest {
            inputs: texts.to_vec(),
            options: InferenceOptions {
                wait_for_model: true,
            },
        };

        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Embedding(format!("Failed to serialize request: {}", e)))?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Authorization", &format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let vectors: Vec<Vec<f32>> = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse response: {}", e)))?;

        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("Inference request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            // 429 is the provider rate-limiting us; back off and retry
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Provider error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(RagError::Embedding(format!(
                                    "Provider rejected request: HTTP {}",
                                    status
                                )));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            return Err(RagError::Embedding(format!(
                                "Non-retryable error: {}",
                                error
                            )));
                        }
                    };

                    if should_retry {
                        last_error = Some(RagError::Embedding(format!("Request error: {}", error)));

                        if attempt < self.retry_attempts {
                            let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                            debug!("Waiting {}ms before retry", delay_ms);
                            std::thread::sleep(Duration::from_millis(delay_ms));
                        }
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error
            .unwrap_or_else(|| RagError::Embedding("Request failed after retries".to_string())))
    }
}

impl Embedder for HfInferenceClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::Embedding(
                "Cannot embed empty text".to_string(),
            ));
        }

        debug!("Generating embedding for text (length: {})", text.len());

        let inputs = [text.to_string()];
        let mut vectors = self.request_embeddings(&inputs)?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("Provider returned no embedding".to_string()))
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(blank) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(RagError::Embedding(format!(
                "Cannot embed empty text at position {}",
                blank
            )));
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        // Bounded batches keep individual requests small enough for the
        // provider's limits; failures propagate rather than yielding a
        // partially embedded corpus.
        for chunk in texts.chunks(self.batch_size.max(1) as usize) {
            let batch = self.request_embeddings(chunk)?;
            results.extend(batch);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}
