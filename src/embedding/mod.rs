//! Embedding providers used when a collection has an embedding function.
//!
//! `local` runs fastembed in process (default `all-minilm-l6-v2`, the model
//! behind seekdb's default embedding function). `openai` and `ollama` call
//! HTTP endpoints through a shared JSON transport that retries 429, 5xx, and
//! connection failures with exponential backoff (1s doubling, capped at
//! 32s) and fails fast on other 4xx responses.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub use seekdb_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;

pub const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
pub const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

/// Embed one query string.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("embedding provider returned no vector for the query"))
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

fn floats(values: &[Value]) -> Vec<f32> {
    values.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect()
}

/// JSON POST transport shared by the HTTP providers.
struct HttpEmbedder {
    label: &'static str,
    endpoint: String,
    bearer: Option<String>,
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpEmbedder {
    fn new(
        label: &'static str,
        base_url: &str,
        path: &str,
        bearer: Option<String>,
        config: &EmbeddingConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            label,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), path),
            bearer,
            client,
            max_retries: config.max_retries,
        })
    }

    async fn post(&self, body: &Value) -> Result<Value> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }

            let mut request = self.client.post(&self.endpoint).json(body);
            if let Some(token) = &self.bearer {
                request = request.bearer_auth(token);
            }
            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!(endpoint = %self.endpoint, attempt, "Embedding request error: {}", err);
                    last_err = Some(anyhow!(
                        "{} embedding request to {} failed: {}",
                        self.label,
                        self.endpoint,
                        err
                    ));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response.json().await?);
            }
            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!(%status, attempt, "{} embedding request failed, retrying", self.label);
                last_err = Some(anyhow!("{} API error {}: {}", self.label, status, text));
                continue;
            }
            bail!("{} API error {}: {}", self.label, status, text);
        }
        Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", self.label)))
    }
}

/// Returns errors; used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

fn required_model_and_dims(config: &EmbeddingConfig, provider: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model is required for the {} provider", provider))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow!("embedding.dims is required for the {} provider", provider))?;
    Ok((model, dims))
}

/// Any OpenAI-compatible `POST {url}/embeddings` endpoint, authenticated
/// with `OPENAI_API_KEY`. Inputs are sent in `embedding.batch_size` chunks.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    batch_size: usize,
    http: HttpEmbedder,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config, "openai")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY must be set for the openai embedding provider"))?;
        let url = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);
        Ok(Self {
            model,
            dims,
            batch_size: config.batch_size.max(1),
            http: HttpEmbedder::new("OpenAI", url, "/embeddings", Some(api_key), config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = json!({
                "model": self.model,
                "input": batch,
                "encoding_format": "float",
                "dimensions": self.dims,
            });
            let response = self.http.post(&body).await?;
            vectors.extend(parse_openai_response(&response)?);
        }
        Ok(vectors)
    }
}

/// `data[].embedding`, reordered by each item's `index`.
fn parse_openai_response(response: &Value) -> Result<Vec<Vec<f32>>> {
    let data = response
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("unexpected embeddings response: no `data` array"))?;

    let mut by_index = data
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let values = item
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("unexpected embeddings response: item without `embedding`"))?;
            let index = item
                .get("index")
                .and_then(Value::as_u64)
                .map_or(position, |i| i as usize);
            Ok((index, floats(values)))
        })
        .collect::<Result<Vec<_>>>()?;
    by_index.sort_by_key(|(index, _)| *index);
    Ok(by_index.into_iter().map(|(_, v)| v).collect())
}

/// A local Ollama server's `POST {url}/api/embed`.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    http: HttpEmbedder,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config, "ollama")?;
        let url = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
        Ok(Self {
            model,
            dims,
            http: HttpEmbedder::new("Ollama", url, "/api/embed", None, config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .http
            .post(&json!({"model": self.model, "input": texts}))
            .await?;
        parse_ollama_response(&response)
    }
}

fn parse_ollama_response(response: &Value) -> Result<Vec<Vec<f32>>> {
    response
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("unexpected Ollama response: no `embeddings` array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .map(|values| floats(values))
                .ok_or_else(|| anyhow!("unexpected Ollama response: embedding is not an array"))
        })
        .collect()
}

/// Model name and dimension for the `local` provider. Unknown dimensions
/// fall back to 384.
fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let name = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
    let known = match name.as_str() {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    };
    let dims = config.dims.unwrap_or(known);
    (name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel as M;
    Ok(match name {
        "all-minilm-l6-v2" => M::AllMiniLML6V2,
        "bge-small-en-v1.5" => M::BGESmallENV15,
        "bge-base-en-v1.5" => M::BGEBaseENV15,
        "bge-large-en-v1.5" => M::BGELargeENV15,
        "nomic-embed-text-v1" => M::NomicEmbedTextV1,
        "nomic-embed-text-v1.5" => M::NomicEmbedTextV15,
        "multilingual-e5-small" => M::MultilingualE5Small,
        "multilingual-e5-base" => M::MultilingualE5Base,
        "multilingual-e5-large" => M::MultilingualE5Large,
        other => bail!(
            "Unknown local embedding model '{}'. Use one of: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, nomic-embed-text-v1, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base, \
             multilingual-e5-large",
            other
        ),
    })
}

/// In-process fastembed model, loaded on first use and kept afterwards.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    name: String,
    dims: usize,
    batch_size: usize,
    loaded: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (name, dims) = resolve_local_model(config);
        fastembed_model(&name)?;
        Ok(Self {
            name,
            dims,
            batch_size: config.batch_size.max(1),
            loaded: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = fastembed_model(&self.name)?;
        let batch_size = self.batch_size;
        let inputs = texts.to_vec();
        let loaded = Arc::clone(&self.loaded);

        // fastembed is synchronous and CPU bound
        tokio::task::spawn_blocking(move || {
            let mut slot = loaded
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            if slot.is_none() {
                tracing::info!("Loading local embedding model");
                let options = fastembed::InitOptions::new(model).with_show_download_progress(true);
                let embedder = fastembed::TextEmbedding::try_new(options)
                    .map_err(|e| anyhow!("failed to load local embedding model: {}", e))?;
                *slot = Some(embedder);
            }
            match slot.as_mut() {
                Some(embedder) => embedder
                    .embed(inputs, Some(batch_size))
                    .map_err(|e| anyhow!("local embedding failed: {}", e)),
                None => bail!("local embedding model unavailable"),
            }
        })
        .await?
    }
}

/// Build the provider selected by `embedding.provider`
/// (`local`, `openai`, `ollama`, or `disabled`).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "disabled" => Arc::new(DisabledProvider),
        "openai" => Arc::new(OpenAIProvider::new(config)?),
        "ollama" => Arc::new(OllamaProvider::new(config)?),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Arc::new(LocalProvider::new(config)?),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding model '{}' requires the local-embeddings-fastembed feature",
            resolve_local_model(config).0
        ),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(provider)
}
