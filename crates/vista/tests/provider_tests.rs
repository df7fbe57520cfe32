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

use llm_contracts::{GenerationConfig, LLMError, ProviderRequest};
use serde_json::json;
use vista::llm::{AnthropicClient, ApiClient, GeminiClient, OllamaClient, OpenAIClient};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(model: &str) -> ProviderRequest {
    ProviderRequest::from_prompt("Describe the chart", &GenerationConfig::default())
        .with_system("You explain charts.")
        .for_model(model)
}

fn openai(server: &MockServer) -> OpenAIClient {
    OpenAIClient::new(
        "test-key".to_string(),
        Some(format!("{}/v1/chat/completions", server.uri())),
        Some(5),
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_openai_returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {"role": "assistant", "content": "Sales peak in March."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = openai(&server).send_request(request("gpt-4o")).await.unwrap();
    assert_eq!(response.content, "Sales peak in March.");
    assert_eq!(response.model, "gpt-4o");
}

#[tokio::test]
async fn test_openai_unauthorised_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = openai(&server).send_request(request("gpt-4o")).await.unwrap_err();
    assert!(matches!(err, LLMError::Authentication(_)));
    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_openai_rate_limit_is_not_retried_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let err = openai(&server).send_request(request("gpt-4o")).await.unwrap_err();
    assert!(matches!(err, LLMError::RateLimit));
    assert!(err.is_transient());
}

fn retrying_openai(server: &MockServer, max_retries: u32) -> OpenAIClient {
    OpenAIClient::new(
        "test-key".to_string(),
        Some(format!("{}/v1/chat/completions", server.uri())),
        Some(5),
        Some(max_retries),
    )
    .unwrap()
}

#[tokio::test]
async fn test_rate_limit_then_success_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Second attempt landed."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = retrying_openai(&server, 1)
        .send_request(request("gpt-4o"))
        .await
        .unwrap();
    assert_eq!(response.content, "Second attempt landed.");
}

#[tokio::test]
async fn test_retries_stop_after_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let err = retrying_openai(&server, 1)
        .send_request(request("gpt-4o"))
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::RateLimit));
}

#[tokio::test]
async fn test_auth_failure_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = retrying_openai(&server, 2)
        .send_request(request("gpt-4o"))
        .await
        .unwrap_err();
    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_groq_shares_openai_wire_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Grouped bars fit best."}}]
        })))
        .mount(&server)
        .await;

    let client = OpenAIClient::groq(
        "groq-key".to_string(),
        Some(format!("{}/openai/v1/chat/completions", server.uri())),
        Some(5),
        None,
    )
    .unwrap();
    let response = client
        .send_request(request("llama-3.3-70b-versatile"))
        .await
        .unwrap();
    assert_eq!(response.content, "Grouped bars fit best.");
}

#[tokio::test]
async fn test_azure_sends_completion_token_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inference/chat/completions"))
        .and(header("authorization", "Bearer azure-key"))
        .and(body_string_contains("max_completion_tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "A histogram suits one column."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAIClient::azure(
        "azure-key".to_string(),
        Some(format!("{}/inference/chat/completions", server.uri())),
        Some(5),
        None,
    )
    .unwrap();
    let response = client.send_request(request("gpt-4o")).await.unwrap();
    assert_eq!(response.content, "A histogram suits one column.");
}

#[tokio::test]
async fn test_gemini_posts_to_model_path_with_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "gemini-key"))
        .and(body_string_contains("systemInstruction"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Prices cluster "}, {"text": "near 300."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 20, "candidatesTokenCount": 6}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(
        "gemini-key".to_string(),
        Some(format!("{}/v1beta", server.uri())),
        Some(5),
        None,
    )
    .unwrap();
    let response = client
        .send_request(request("gemini-1.5-flash"))
        .await
        .unwrap();
    assert_eq!(response.content, "Prices cluster near 300.");
    assert_eq!(response.usage.total_tokens, 26);
}

#[tokio::test]
async fn test_gemini_forbidden_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
        .mount(&server)
        .await;

    let client =
        GeminiClient::new("bad".to_string(), Some(server.uri()), Some(5), Some(2)).unwrap();
    let err = client
        .send_request(request("gemini-1.5-pro"))
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::Authentication(_)));
}

#[tokio::test]
async fn test_anthropic_sends_key_header_and_joins_text_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "anthropic-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "claude-3-5-sonnet-latest",
            "content": [
                {"type": "text", "text": "The distribution "},
                {"type": "text", "text": "is right skewed."}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 6}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnthropicClient::new(
        "anthropic-key".to_string(),
        Some(format!("{}/v1/messages", server.uri())),
        None,
        Some(5),
        None,
    )
    .unwrap();
    let response = client
        .send_request(request("claude-3-5-sonnet-latest"))
        .await
        .unwrap();
    assert_eq!(response.content, "The distribution is right skewed.");
}

#[tokio::test]
async fn test_anthropic_empty_content_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
        .mount(&server)
        .await;

    let client = AnthropicClient::new(
        "anthropic-key".to_string(),
        Some(server.uri()),
        None,
        Some(5),
        None,
    )
    .unwrap();
    let err = client
        .send_request(request("claude-3-5-sonnet-latest"))
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::Provider(_)));
}

#[tokio::test]
async fn test_ollama_posts_to_chat_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "Two clusters are visible."},
            "done": true,
            "prompt_eval_count": 30,
            "eval_count": 8
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(Some(format!("{}/", server.uri())), Some(5), None).unwrap();
    let response = client.send_request(request("llama3")).await.unwrap();
    assert_eq!(response.content, "Two clusters are visible.");
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_server_error_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = openai(&server).send_request(request("gpt-4o")).await.unwrap_err();
    assert!(matches!(err, LLMError::Provider(msg) if msg.contains("boom")));
}
