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
use serde_json::{json, Map, Value};

use super::{usage_count, with_overrides, ApiClient, Transport};

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    transport: Transport,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        timeout_seconds: Option<u32>,
        max_retries: Option<u32>,
    ) -> LLMResult<Self> {
        let base_url = endpoint
            .unwrap_or_else(|| Provider::Gemini.default_endpoint().to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            transport: Transport::new(Provider::Gemini, timeout_seconds, max_retries)?,
            api_key,
            base_url,
        })
    }

    fn url_for(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    /// Assistant turns are sent with the `model` role; system turns become `systemInstruction`.
    fn build_gemini_payload(request: &ProviderRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut generation = Map::new();
        if let Some(max_tokens) = request.max_tokens {
            generation.insert("maxOutputTokens".to_string(), max_tokens.into());
        }
        if let Some(temperature) = request.temperature {
            generation.insert("temperature".to_string(), temperature.into());
        }
        if let Some(top_p) = request.top_p {
            generation.insert("topP".to_string(), top_p.into());
        }
        if let Some(stop) = &request.stop_sequences {
            generation.insert("stopSequences".to_string(), json!(stop));
        }

        let mut body = Map::new();
        body.insert("contents".to_string(), Value::Array(contents));
        if !generation.is_empty() {
            body.insert("generationConfig".to_string(), Value::Object(generation));
        }
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        if !system.is_empty() {
            body.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": system.join("\n\n") }] }),
            );
        }
        with_overrides(body, request)
    }

    fn parse_gemini_response(response_data: Value, model: String) -> LLMResult<ProviderResponse> {
        let candidate = &response_data["candidates"][0];
        let content = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                LLMError::Provider("Failed to extract content from Gemini response".to_string())
            })?;
        let usage = response_data
            .get("usageMetadata")
            .map(|usage_data| {
                Usage::from_counts(
                    usage_count(usage_data, "promptTokenCount"),
                    usage_count(usage_data, "candidatesTokenCount"),
                )
            })
            .unwrap_or_default();
        let finish_reason = candidate["finishReason"].as_str().map(ToString::to_string);
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
impl ApiClient for GeminiClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = Self::build_gemini_payload(&request);
        let url = self.url_for(&request.model);
        let response_data = self
            .transport
            .post_json(
                |client| {
                    client
                        .post(&url)
                        .header("x-goog-api-key", &self.api_key)
                        .header("Content-Type", "application/json")
                },
                &payload,
            )
            .await?;
        Self::parse_gemini_response(response_data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        Provider::Gemini.as_str()
    }

    async fn health_check(&self) -> LLMResult<()> {
        let config = GenerationConfig {
            max_tokens: Some(10),
            temperature: Some(0.1),
            ..Default::default()
        };
        self.send_request(ProviderRequest::from_prompt("Hi", &config).for_model("gemini-1.5-flash"))
            .await?;
        Ok(())
    }
}
