//! Anthropic Messages API client.

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use std::time::Duration;

use crate::agent::types::{LlmTransport, MessagesRequest, MessagesResponse};

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// HTTP client for the Messages endpoint. Retries rate-limit and server
/// errors with linear backoff; other API errors surface immediately.
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl AnthropicClient {
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self, String> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-api-key",
            api_key.parse().map_err(|_| "API key contains invalid header bytes".to_string())?,
        );
        headers.insert(
            "anthropic-version",
            API_VERSION.parse().map_err(|e| format!("{}", e))?,
        );
        headers.insert(
            "content-type",
            "application/json".parse().map_err(|e| format!("{}", e))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: API_BASE.to_string(),
            max_retries: 2,
            retry_delay_ms: 500,
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

#[async_trait]
impl LlmTransport for AnthropicClient {
    async fn messages(&self, request: &MessagesRequest) -> Result<MessagesResponse, String> {
        let url = format!("{}/messages", self.base_url);
        let mut last_err = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                info!("[llm] retry attempt {}/{}", attempt, self.max_retries);
                tokio::time::sleep(Duration::from_millis(self.retry_delay_ms * attempt as u64))
                    .await;
            }

            match self.client.post(&url).json(request).send().await {
                Ok(resp) => {
                    if resp.status().is_success() {
                        return resp
                            .json::<MessagesResponse>()
                            .await
                            .map_err(|e| format!("Failed to parse API response: {}", e));
                    }

                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    last_err = format!("API error {}: {}", status, body);
                    if status.as_u16() == 429 || status.as_u16() == 529 || status.is_server_error()
                    {
                        warn!("[llm] {}", last_err);
                        continue;
                    }
                    return Err(last_err);
                }
                Err(e) => {
                    last_err = format!("Request failed: {}", e);
                    warn!("[llm] {}", last_err);
                }
            }
        }

        Err(last_err)
    }
}
