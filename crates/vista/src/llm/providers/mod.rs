// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use llm_contracts::{LLMError, LLMResult, Provider, ProviderRequest, ProviderResponse};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;

#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse>;

    fn provider_name(&self) -> &'static str;

    async fn health_check(&self) -> LLMResult<()>;
}

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

/// Maps a non-success HTTP status to the error the caller should see.
pub fn status_error(provider: Provider, status: StatusCode, body: &str) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::Authentication(format!(
            "{provider} rejected the credentials ({status}): {body}"
        )),
        429 => LLMError::RateLimit,
        _ => LLMError::Provider(format!("{provider} API error {status}: {body}")),
    }
}

/// HTTP plumbing shared by every provider client.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    client: Client,
    provider: Provider,
    timeout: Duration,
    max_retries: u32,
}

impl Transport {
    pub(crate) fn new(
        provider: Provider,
        timeout_seconds: Option<u32>,
        max_retries: Option<u32>,
    ) -> LLMResult<Self> {
        let timeout = Duration::from_secs(
            timeout_seconds
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
                .into(),
        );
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            LLMError::Configuration(format!("Failed to create HTTP client for {provider}: {e}"))
        })?;
        Ok(Self {
            client,
            provider,
            timeout,
            max_retries: max_retries.unwrap_or(0),
        })
    }

    pub(crate) const fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) async fn post_json<F>(&self, build: F, payload: &Value) -> LLMResult<Value>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            debug!(
                provider = %self.provider,
                attempt = attempt + 1,
                max_attempts = self.max_retries + 1,
                "Sending request"
            );
            let response =
                tokio::time::timeout(self.timeout, build(&self.client).json(payload).send()).await;
            let error = match response {
                Ok(Ok(resp)) => {
                    let status = resp.status();
                    debug!(provider = %self.provider, %status, "Received response");
                    if status.is_success() {
                        return resp.json::<Value>().await.map_err(|e| {
                            LLMError::Serialisation(format!(
                                "Failed to parse {} response: {e}",
                                self.provider
                            ))
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    status_error(self.provider, status, &body)
                }
                Ok(Err(e)) if e.is_timeout() => LLMError::Timeout,
                Ok(Err(e)) => {
                    LLMError::Network(format!("Request to {} failed: {e}", self.provider))
                }
                Err(_) => {
                    warn!(
                        provider = %self.provider,
                        "Request timed out after {} seconds",
                        self.timeout.as_secs()
                    );
                    LLMError::Timeout
                }
            };
            if !error.is_transient() || attempt >= self.max_retries {
                return Err(error);
            }
            let wait_time = Duration::from_secs(2_u64.pow(attempt.min(3)));
            warn!(
                provider = %self.provider,
                error = %error,
                "Retrying in {:?}",
                wait_time
            );
            tokio::time::sleep(wait_time).await;
            attempt += 1;
        }
    }
}

/// Sampling settings present on `request`, under the keys a provider expects.
pub(crate) fn sampling_fields(
    request: &ProviderRequest,
    max_tokens_key: &str,
    stop_key: &str,
) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(max_tokens) = request.max_tokens {
        fields.insert(max_tokens_key.to_string(), max_tokens.into());
    }
    if let Some(temperature) = request.temperature {
        fields.insert("temperature".to_string(), temperature.into());
    }
    if let Some(top_p) = request.top_p {
        fields.insert("top_p".to_string(), top_p.into());
    }
    if let Some(stop) = &request.stop_sequences {
        fields.insert(stop_key.to_string(), json!(stop));
    }
    fields
}

pub(crate) fn chat_messages(request: &ProviderRequest, include_system: bool) -> Value {
    request
        .messages
        .iter()
        .filter(|m| include_system || m.role != "system")
        .map(|m| json!({ "role": m.role, "content": m.content }))
        .collect()
}

/// Provider-specific request fields win over everything else.
pub(crate) fn with_overrides(mut body: Map<String, Value>, request: &ProviderRequest) -> Value {
    body.extend(
        request
            .provider_specific
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    Value::Object(body)
}

pub(crate) fn usage_count(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}
