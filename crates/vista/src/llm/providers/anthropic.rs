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
use llm_contracts::{
    GenerationConfig, LLMError, LLMResult, Provider, ProviderRequest, ProviderResponse, Usage,
};
use serde_json::{json, Value};

use super::{chat_messages, sampling_fields, usage_count, with_overrides, ApiClient, Transport};

const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    transport: Transport,
    api_key: String,
    endpoint: String,
    api_version: String,
}

impl AnthropicClient {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        api_version: Option<String>,
        timeout_seconds: Option<u32>,
        max_retries: Option<u32>,
    ) -> LLMResult<Self> {
        Ok(Self {
            transport: Transport::new(Provider::Anthropic, timeout_seconds, max_retries)?,
            api_key,
            endpoint: endpoint
                .unwrap_or_else(|| Provider::Anthropic.default_endpoint().to_string()),
            api_version: api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        })
    }

    /// System turns move to the top-level `system` field; `max_tokens` is mandatory here.
    fn build_anthropic_payload(request: &ProviderRequest) -> Value {
        let mut body = sampling_fields(request, "max_tokens", "stop_sequences");
        body.entry("max_tokens")
            .or_insert_with(|| DEFAULT_MAX_TOKENS.into());
        body.insert("model".to_string(), json!(request.model));
        body.insert("messages".to_string(), chat_messages(request, false));
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        if !system.is_empty() {
            body.insert("system".to_string(), system.join("\n\n").into());
        }
        with_overrides(body, request)
    }

    fn parse_anthropic_response(
        response_data: Value,
        model: String,
    ) -> LLMResult<ProviderResponse> {
        let content = response_data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|block| block["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                LLMError::Provider("Failed to extract content from Anthropic response".to_string())
            })?;
        let usage = response_data
            .get("usage")
            .map(|usage_data| {
                Usage::from_counts(
                    usage_count(usage_data, "input_tokens"),
                    usage_count(usage_data, "output_tokens"),
                )
            })
            .unwrap_or_default();
        let finish_reason = response_data["stop_reason"].as_str().map(ToString::to_string);
        Ok(ProviderResponse {
            content,
            model,
            usage,
            finish_reason,
            raw_response: response_data,
        })
    }
}

#[async_trait]
impl ApiClient for AnthropicClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = Self::build_anthropic_payload(&request);
        let response_data = self
            .transport
            .post_json(
                |client| {
                    client
                        .post(&self.endpoint)
                        .header("x-api-key", &self.api_key)
                        .header("anthropic-version", &self.api_version)
                        .header("content-type", "application/json")
                },
                &payload,
            )
            .await?;
        Self::parse_anthropic_response(response_data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        Provider::Anthropic.as_str()
    }

    async fn health_check(&self) -> LLMResult<()> {
        let config = GenerationConfig {
            max_tokens: Some(10),
            temperature: Some(0.1),
            ..Default::default()
        };
        self.send_request(
            ProviderRequest::from_prompt("Hi", &config).for_model("claude-3-5-haiku-latest"),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_is_split_out() {
        let request = ProviderRequest::from_prompt("explain", &GenerationConfig::default())
            .with_system("you are an analyst")
            .for_model("claude-3-5-sonnet-latest");
        let payload = AnthropicClient::build_anthropic_payload(&request);
        assert_eq!(payload["system"], "you are an analyst");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["max_tokens"], 1000);
    }

    #[test]
    fn test_text_blocks_are_joined() {
        let response = json!({
            "content": [{"type": "text", "text": "Part one. "}, {"type": "text", "text": "Part two."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 8}
        });
        let parsed =
            AnthropicClient::parse_anthropic_response(response, "claude".to_string()).unwrap();
        assert_eq!(parsed.content, "Part one. Part two.");
        assert_eq!(parsed.usage.total_tokens, 20);
        assert_eq!(parsed.finish_reason.as_deref(), Some("end_turn"));
    }
}
