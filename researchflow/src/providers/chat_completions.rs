//! OpenAI-compatible chat completions transport.

use async_trait::async_trait;
use std::time::Duration;

use super::{GenerationRequest, GenerationTransport};
use crate::config::GenerationConfig;
use crate::errors::{ConfigError, GenerationError};

/// Posts requests to `{base_url}/chat/completions` with bearer auth.
#[derive(Debug, Clone)]
pub struct ChatCompletionsTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl ChatCompletionsTransport {
    /// Creates a transport from configuration.
    pub fn new(config: &GenerationConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::missing("GROQ_API_KEY"))?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::invalid("generation.base_url", e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            timeout: config.request_timeout(),
        })
    }

    /// The completions endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Pulls `choices[0].message.content` out of a response body, falling back
/// to the serialized body when that path is absent.
pub(crate) fn completion_text(body: &serde_json::Value) -> String {
    body.pointer("/choices/0/message/content")
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| body.to_string(), str::to_string)
}

#[async_trait]
impl GenerationTransport for ChatCompletionsTransport {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status.as_u16(), body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        Ok(completion_text(&body))
    }
}
