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
use llm_contracts::{LLMResult, ProviderRequest, ProviderResponse};
use polars::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vista::llm::{ApiClient, OpenAIClient};
use vista::{
    Assistant, AssistantConfig, ChartKind, Dataset, ModelPool, ModelRoute, Provider, RankingMode,
    StrategyName, StyleOverrides, SuggestionRef, ValidationError, VariableOverrides, VistaError,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct CannedClient {
    reply: String,
    calls: AtomicUsize,
}

impl CannedClient {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiClient for CannedClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderResponse::text(self.reply.clone(), request.model))
    }

    fn provider_name(&self) -> &'static str {
        "canned"
    }

    async fn health_check(&self) -> LLMResult<()> {
        Ok(())
    }
}

fn study_data() -> Dataset {
    Dataset::new(
        df! {
            "hours" => [1.0, 2.0, 2.5, 3.0, 4.0, 4.5, 5.0, 6.0, 7.0, 8.0, 8.5, 9.0],
            "grade" => [48.0, 52.0, 55.0, 58.0, 61.0, 66.0, 70.0, 72.0, 79.0, 83.0, 85.0, 91.0],
            "group" => ["a", "b", "c", "a", "b", "c", "a", "b", "c", "a", "b", "c"],
        }
        .unwrap(),
    )
    .unwrap()
}

fn canned_pool(client: Arc<CannedClient>) -> ModelPool {
    ModelPool::new(StrategyName::RoundRobin)
        .with_entry(ModelRoute::new(Provider::OpenAI, "gpt-4o"), client)
}

#[tokio::test]
async fn test_heuristic_recommend_plot_explain() {
    let client = CannedClient::new("Grades climb steadily with study hours.");
    let assistant = Assistant::new(AssistantConfig::default())
        .unwrap()
        .with_pool(canned_pool(client.clone()));
    let data = study_data();

    let suggestions = assistant.recommend(&data, 4).await.unwrap();
    assert!(!suggestions.is_empty() && suggestions.len() <= 4);
    assert_eq!(client.calls(), 0);
    for pair in suggestions.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let figure = assistant
        .plot(
            &data,
            SuggestionRef::Index {
                index: 0,
                suggestions: &suggestions,
            },
            &VariableOverrides::default(),
            &StyleOverrides::default(),
        )
        .unwrap();
    assert_eq!(figure.kind(), suggestions[0].chart_type);
    assert!(figure.svg().contains("<svg"));

    let explanation = assistant
        .explain(Some(&figure), None, Some(2))
        .await
        .unwrap();
    assert_eq!(explanation.text, "Grades climb steadily with study hours.");
    assert_eq!(explanation.iterations, 1);
    assert_eq!(client.calls(), 3);
    assert!(explanation.models_used.iter().all(|m| m == "openai:gpt-4o"));
}

#[tokio::test]
async fn test_ensemble_pipeline_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("insightful visualizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content":
                "Plot Type: scatter\nVariables: hours, grade\nRationale: Study time against results.\n---\n\
                 Plot Type: box\nVariables: group, grade\nRationale: Grade spread per group.\n---"
            }}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Chart type:"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Higher hours go with higher grades."}}]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let client = OpenAIClient::new(
        "test-key".to_string(),
        Some(format!("{}/v1/chat/completions", server.uri())),
        Some(5),
        None,
    )
    .unwrap();
    let pool = ModelPool::new(StrategyName::RoundRobin)
        .with_entry(ModelRoute::new(Provider::OpenAI, "gpt-4o"), Arc::new(client));
    let mut config = AssistantConfig::default();
    config.recommender.mode = RankingMode::Ensemble;
    config.recommender.cache_enabled = false;
    let assistant = Assistant::new(config).unwrap().with_pool(pool);
    let data = study_data();

    let suggestions = assistant.recommend(&data, 2).await.unwrap();
    assert_eq!(suggestions.len(), 2);
    assert_eq!(suggestions[0].chart_type, ChartKind::Box);
    assert_eq!(suggestions[0].variables, vec!["grade", "group"]);
    assert_eq!(suggestions[1].chart_type, ChartKind::Scatter);
    for suggestion in &suggestions {
        assert!((suggestion.score - 1.0).abs() < f64::EPSILON);
        assert_eq!(suggestion.source_models, vec!["openai:gpt-4o".to_string()]);
    }

    let figure = assistant
        .plot(
            &data,
            (&suggestions[1]).into(),
            &VariableOverrides::default(),
            &StyleOverrides::default(),
        )
        .unwrap();
    let explanation = assistant
        .explain(Some(&figure), Some("What relationship is shown?"), None)
        .await
        .unwrap();
    assert_eq!(explanation.text, "Higher hours go with higher grades.");
    assert_eq!(explanation.prompt, "What relationship is shown?");
}

#[tokio::test]
async fn test_out_of_range_index_is_validation_error() {
    let assistant = Assistant::new(AssistantConfig::default()).unwrap();
    let data = study_data();
    let suggestions = assistant.recommend(&data, 2).await.unwrap();
    let err = assistant
        .plot(
            &data,
            SuggestionRef::Index {
                index: 10,
                suggestions: &suggestions,
            },
            &VariableOverrides::default(),
            &StyleOverrides::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        VistaError::Validation(ValidationError::SuggestionIndexOutOfRange { index: 10, .. })
    ));
}

#[tokio::test]
async fn test_missing_figure_makes_no_model_call() {
    let client = CannedClient::new("unused");
    let assistant = Assistant::new(AssistantConfig::default())
        .unwrap()
        .with_pool(canned_pool(client.clone()));
    let err = assistant.explain(None, None, None).await.unwrap_err();
    assert!(matches!(err, VistaError::Validation(ValidationError::MissingFigure)));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_variable_override_rebinds_suggestion() {
    let assistant = Assistant::new(AssistantConfig::default()).unwrap();
    let data = study_data();
    let suggestion = vista::Suggestion::new(ChartKind::Hist, vec!["hours".into()], 0.9);
    let figure = assistant
        .plot(
            &data,
            (&suggestion).into(),
            &VariableOverrides::x("grade"),
            &StyleOverrides {
                title: Some("Grade distribution".into()),
                ..StyleOverrides::default()
            },
        )
        .unwrap();
    assert_eq!(figure.variables(), ["grade".to_string()]);
    assert_eq!(figure.title(), "Grade distribution");
}

#[tokio::test]
async fn test_ensemble_without_credentials_is_auth_error() {
    if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        return;
    }
    let mut config = AssistantConfig::default();
    config.recommender.mode = RankingMode::Ensemble;
    config.recommender.cache_enabled = false;
    config.llm.models = vec![ModelRoute::new(Provider::Anthropic, "claude-3-5-sonnet-latest")];
    let assistant = Assistant::new(config).unwrap();
    let err = assistant.recommend(&study_data(), 3).await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn test_repeated_ensemble_request_is_served_from_cache() {
    let client = CannedClient::new(
        "Plot Type: scatter\nVariables: hours, grade\nRationale: r\n---\n\
         Plot Type: hist\nVariables: grade\nRationale: h\n---",
    );
    let mut config = AssistantConfig::default();
    config.recommender.mode = RankingMode::Ensemble;
    assert!(config.recommender.cache_enabled);
    let assistant = Assistant::new(config)
        .unwrap()
        .with_pool(canned_pool(client.clone()));
    let data = study_data();

    let first = assistant.recommend(&data, 2).await.unwrap();
    assert_eq!(client.calls(), 1);
    let again = assistant.recommend(&data, 2).await.unwrap();
    assert_eq!(client.calls(), 1);
    assert_eq!(first, again);

    let fewer = assistant.recommend(&data, 1).await.unwrap();
    assert_eq!(client.calls(), 2);
    assert_eq!(fewer.len(), 1);

    let other_data = Dataset::new(
        df! { "hours" => [1.0, 2.0, 3.0], "grade" => [50.0, 60.0, 75.0] }.unwrap(),
    )
    .unwrap();
    assistant.recommend(&other_data, 2).await.unwrap();
    assert_eq!(client.calls(), 3);
}
