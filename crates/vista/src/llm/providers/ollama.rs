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

use async_trait::async_trait;
use llm_contracts::{LLMError, LLMResult, Provider, ProviderRequest, ProviderResponse, Usage};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{
    chat_messages, sampling_fields, status_error, usage_count, with_overrides, ApiClient, Transport,
};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    transport: Transport,
    base_url: String,
}

impl OllamaClient {
    pub fn new(
        base_url: Option<String>,
        timeout_seconds: Option<u32>,
        max_retries: Option<u32>,
    ) -> LLMResult<Self> {
        let base_url = base_url.unwrap_or_else(|| Provider::Ollama.default_endpoint().to_string());
        Ok(Self {
            transport: Transport::new(Provider::Ollama, timeout_seconds, max_retries)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Sampling settings go under `options`; streaming is always off.
    fn build_ollama_payload(request: &ProviderRequest) -> Value {
        let options = sampling_fields(request, "num_predict", "stop");
        let mut body = Map::new();
        body.insert("model".to_string(), json!(request.model));
        body.insert("messages".to_string(), chat_messages(request, true));
        body.insert("stream".to_string(), Value::Bool(false));
        if !options.is_empty() {
            body.insert("options".to_string(), Value::Object(options));
        }
        with_overrides(body, request)
    }

    fn parse_ollama_response(response_data: Value, model: String) -> LLMResult<ProviderResponse> {
        let content = response_data["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LLMError::Provider("Failed to extract content from Ollama response".to_string())
            })?;
        let usage = Usage::from_counts(
            usage_count(&response_data, "prompt_eval_count"),
            usage_count(&response_data, "eval_count"),
        );
        let finish_reason = response_data["done"]
            .as_bool()
            .unwrap_or(false)
            .then(|| "stop".to_string());
        Ok(ProviderResponse {
            content: content.to_string(),
            model,
            usage,
            finish_reason,
            raw_response: response_data,
        })
    }
}

#[async_trait]
impl ApiClient for OllamaClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = Self::build_ollama_payload(&request);
        let url = format!("{}/api/chat", self.base_url);
        let response_data = self
            .transport
            .post_json(
                |client| {
                    client
                        .post(&url)
                        .header("content-type", "application/json")
                },
                &payload,
            )
            .await?;
        Self::parse_ollama_response(response_data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        Provider::Ollama.as_str()
    }

    async fn health_check(&self) -> LLMResult<()> {
        let url = format!("{}/api/tags", self.base_url);
        let response = tokio::time::timeout(
            self.transport.timeout(),
            self.transport.client().get(&url).send(),
        )
        .await
        .map_err(|_| LLMError::Timeout)?
        .map_err(|e| LLMError::Network(format!("Ollama is not reachable at {url}: {e}")))?;
        let status = response.status();
        debug!(%status, "Ollama health check");
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(Provider::Ollama, status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_contracts::GenerationConfig;

    #[test]
    fn test_options_are_nested() {
        let request =
            ProviderRequest::from_prompt("hi", &GenerationConfig::default()).for_model("llama3");
        let payload = OllamaClient::build_ollama_payload(&request);
        assert_eq!(payload["stream"], false);
        assert_eq!(payload["options"]["num_predict"], 1000);
        assert!(payload["options"]["temperature"].as_f64().is_some());
    }

    #[test]
    fn test_done_flag_sets_finish_reason() {
        let response = json!({
            "message": {"role": "assistant", "content": "A bar chart."},
            "done": true,
            "prompt_eval_count": 5,
            "eval_count": 3
        });
        let parsed = OllamaClient::parse_ollama_response(response, "llama3".to_string()).unwrap();
        assert_eq!(parsed.content, "A bar chart.");
        assert_eq!(parsed.finish_reason.as_deref(), Some("stop"));
        assert_eq!(parsed.usage.total_tokens, 8);
    }
}
