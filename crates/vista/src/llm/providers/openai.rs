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

/// Chat-completions client for OpenAI and OpenAI-compatible endpoints such as Groq and Azure.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    transport: Transport,
    provider: Provider,
    api_key: String,
    endpoint: String,
    max_tokens_key: &'static str,
}

impl OpenAIClient {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        timeout_seconds: Option<u32>,
        max_retries: Option<u32>,
    ) -> LLMResult<Self> {
        Self::for_provider(
            Provider::OpenAI,
            api_key,
            endpoint,
            timeout_seconds,
            max_retries,
        )
    }

    pub fn groq(
        api_key: String,
        endpoint: Option<String>,
        timeout_seconds: Option<u32>,
        max_retries: Option<u32>,
    ) -> LLMResult<Self> {
        Self::for_provider(
            Provider::Groq,
            api_key,
            endpoint,
            timeout_seconds,
            max_retries,
        )
    }

    /// Azure-hosted deployments take `max_completion_tokens` instead of `max_tokens`.
    pub fn azure(
        api_key: String,
        endpoint: Option<String>,
        timeout_seconds: Option<u32>,
        max_retries: Option<u32>,
    ) -> LLMResult<Self> {
        let mut client = Self::for_provider(
            Provider::Azure,
            api_key,
            endpoint,
            timeout_seconds,
            max_retries,
        )?;
        client.max_tokens_key = "max_completion_tokens";
        Ok(client)
    }

    fn for_provider(
        provider: Provider,
        api_key: String,
        endpoint: Option<String>,
        timeout_seconds: Option<u32>,
        max_retries: Option<u32>,
    ) -> LLMResult<Self> {
        Ok(Self {
            transport: Transport::new(provider, timeout_seconds, max_retries)?,
            provider,
            api_key,
            endpoint: endpoint.unwrap_or_else(|| provider.default_endpoint().to_string()),
            max_tokens_key: "max_tokens",
        })
    }

    fn build_openai_payload(request: &ProviderRequest, max_tokens_key: &str) -> Value {
        let mut body = sampling_fields(request, max_tokens_key, "stop");
        body.insert("model".to_string(), json!(request.model));
        body.insert("messages".to_string(), chat_messages(request, true));
        with_overrides(body, request)
    }

    fn parse_openai_response(
        &self,
        response_data: Value,
        model: String,
    ) -> LLMResult<ProviderResponse> {
        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LLMError::Provider(format!(
                    "Failed to extract content from {} response",
                    self.provider
                ))
            })?;
        let usage = response_data
            .get("usage")
            .map(|usage_data| {
                Usage::from_counts(
                    usage_count(usage_data, "prompt_tokens"),
                    usage_count(usage_data, "completion_tokens"),
                )
            })
            .unwrap_or_default();
        let finish_reason = response_data["choices"][0]["finish_reason"]
            .as_str()
            .map(ToString::to_string);
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
impl ApiClient for OpenAIClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = Self::build_openai_payload(&request, self.max_tokens_key);
        let response_data = self
            .transport
            .post_json(
                |client| {
                    client
                        .post(&self.endpoint)
                        .bearer_auth(&self.api_key)
                        .header("Content-Type", "application/json")
                },
                &payload,
            )
            .await?;
        self.parse_openai_response(response_data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        self.provider.as_str()
    }

    async fn health_check(&self) -> LLMResult<()> {
        let model = match self.provider {
            Provider::Groq => "llama-3.1-8b-instant",
            Provider::Azure => "gpt-4o",
            _ => "gpt-4o-mini",
        };
        let config = GenerationConfig {
            max_tokens: Some(10),
            temperature: Some(0.1),
            ..Default::default()
        };
        self.send_request(ProviderRequest::from_prompt("Hi", &config).for_model(model))
            .await?;
        Ok(())
    }
}
