//! OpenAI-compatible chat-completions client used by the catalog generator.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

/// Default retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 256;

/// A system + user prompt pair.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
}

#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_retries: MAX_RETRIES,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Send one chat completion and return the cleaned reply text.
    pub async fn complete(&self, req: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": req.system},
                {"role": "user", "content": req.user},
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = match self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt > self.max_retries {
                        return Err(err).context("chat completion request failed");
                    }
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt > self.max_retries {
                    let body = response.text().await.unwrap_or_default();
                    bail!(
                        "chat completion failed after {} retries: {} {}",
                        self.max_retries,
                        status,
                        body
                    );
                }
                tracing::debug!(%status, attempt, "Retrying chat completion");
                tokio::time::sleep(backoff_delay(attempt)).await;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("chat completion error {}: {}", status, body);
            }

            let value: Value = response
                .json()
                .await
                .context("failed to decode chat completion response")?;
            let content = extract_message_text(&value)
                .ok_or_else(|| anyhow!("missing message content in chat completion response"))?;
            return Ok(clean_reply(&content));
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(5))
}

fn extract_message_text(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

/// Trim the reply and remove one pair of surrounding double quotes.
pub fn clean_reply(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}
