
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::Embedder;
use crate::config::Config;
use crate::{Result, SearchError};

/// Width of the vectors produced by the default small embedding models
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// Embedded once at start-up to learn the width the model actually produces
const WIDTH_CHECK_TEXT: &str = "dimension check";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    dimension: usize,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
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
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Maps transport failures and 5xx to a retryable error, other statuses to an
/// embedding error.
fn classify(error: ureq::Error) -> SearchError {
    match error {
        ureq::Error::StatusCode(status) if status >= 500 => {
            warn!("Ollama server error (status {})", status);
            SearchError::DependencyUnavailable(format!("Ollama returned HTTP {status}"))
        }
        ureq::Error::StatusCode(status) => {
            warn!("Ollama client error (status {})", status);
            SearchError::Embedding(format!("Ollama rejected the request: HTTP {status}"))
        }
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => {
            warn!("Ollama transport error: {}", error);
            SearchError::DependencyUnavailable(format!("Ollama is unreachable: {error}"))
        }
        other => SearchError::Embedding(format!("Ollama request failed: {other}")),
    }
}

fn model_matches(available: &str, wanted: &str) -> bool {
    available == wanted
        || (!wanted.contains(':') && available.strip_suffix(":latest") == Some(wanted))
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config.ollama_url()?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.ollama.model.clone(),
            dimension: config.ollama.embedding_dimension as usize,
            agent,
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

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SearchError::Config(format!("Failed to build Ollama URL: {e}")))
    }

    fn get(&self, path: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        self.agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(classify)
    }

    /// Test connection to Ollama server, verify model availability and check
    /// that the model's output width matches the configured dimension
    #[inline]
    pub fn check_blocking(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping()?;
        self.validate_model()?;
        self.embed_blocking(WIDTH_CHECK_TEXT)?;

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        debug!("Pinging Ollama server at {}", self.base_url);
        self.get("/api/version")?;
        Ok(())
    }

    /// Validate that the configured model is available
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models()?;

        if models.iter().any(|m| model_matches(&m.name, &self.model)) {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            Err(SearchError::Config(format!(
                "Model '{}' is not available. Available models: {available:?}",
                self.model
            )))
        }
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response_text = self.get("/api/tags")?;
        let models_response: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| SearchError::Embedding(format!("Failed to parse models response: {e}")))?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Embed one text with a blocking HTTP call
    #[inline]
    pub fn embed_blocking(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request_json = serde_json::to_string(&EmbedRequest {
            model: &self.model,
            input: [text],
        })
        .map_err(|e| SearchError::Embedding(format!("Failed to serialize request: {e}")))?;

        let url = self.endpoint("/api/embed")?;
        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(classify)?;

        if let Ok(error) = serde_json::from_str::<ErrorResponse>(&response_text) {
            return Err(SearchError::Embedding(format!(
                "Ollama error: {}",
                error.error
            )));
        }

        let response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            SearchError::Embedding(format!("Failed to parse embedding response: {e}"))
        })?;

        let embedding = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Embedding("Ollama returned no embedding".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(SearchError::SchemaConflict(format!(
                "Model {} produced {} dimensions, expected {}",
                self.model,
                embedding.len(),
                self.dimension
            )));
        }

        Ok(embedding)
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&OllamaClient) -> Result<T> + Send + 'static,
    {
        let client = self.clone();
        tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| SearchError::Other(anyhow::anyhow!("Embedding task failed: {e}")))?
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_string();
        self.run_blocking(move |client| client.embed_blocking(&text))
            .await
    }

    #[inline]
    async fn health_check(&self) -> Result<()> {
        self.run_blocking(OllamaClient::check_blocking).await
    }
}
