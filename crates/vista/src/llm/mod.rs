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

pub mod credentials;
pub mod providers;

pub use credentials::{clear_session_keys, session_credentials, set_session_api_key, Credentials};
pub use providers::{AnthropicClient, ApiClient, GeminiClient, OllamaClient, OpenAIClient};

use crate::config::LlmSettings;
use futures::future::join_all;
use llm_contracts::{
    LLMError, LLMResult, ModelCatalog, ModelRoute, Provider, ProviderRequest, ProviderResponse,
    StrategyName,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct PoolEntry {
    pub route: ModelRoute,
    pub client: Arc<dyn ApiClient>,
}

impl std::fmt::Debug for PoolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEntry")
            .field("route", &self.route)
            .field("client", &self.client.provider_name())
            .finish()
    }
}

/// A response tagged with the model that produced it.
#[derive(Debug, Clone)]
pub struct PoolResponse {
    pub route: ModelRoute,
    pub response: ProviderResponse,
}

/// Ordered set of models plus the rule for picking one per iteration.
#[derive(Debug, Clone)]
pub struct ModelPool {
    entries: Vec<PoolEntry>,
    strategy: StrategyName,
    catalog: ModelCatalog,
}

impl ModelPool {
    pub fn new(strategy: StrategyName) -> Self {
        Self {
            entries: Vec::new(),
            strategy,
            catalog: ModelCatalog::builtin(),
        }
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn with_entry(mut self, route: ModelRoute, client: Arc<dyn ApiClient>) -> Self {
        self.push(route, client);
        self
    }

    pub fn push(&mut self, route: ModelRoute, client: Arc<dyn ApiClient>) {
        self.entries.push(PoolEntry { route, client });
    }

    /// Builds a client for every configured model whose provider has a key.
    pub fn from_settings(settings: &LlmSettings, credentials: &Credentials) -> LLMResult<Self> {
        let mut pool = Self::new(settings.strategy);
        for route in &settings.models {
            if !credentials.is_usable(route.provider) {
                debug!(model = %route, "Skipping model without credentials");
                continue;
            }
            let provider_config = settings.provider_config(route.provider);
            let client: Arc<dyn ApiClient> = match route.provider {
                Provider::OpenAI => Arc::new(OpenAIClient::new(
                    credentials.require(route.provider)?.to_string(),
                    provider_config.endpoint,
                    provider_config.timeout_seconds,
                    provider_config.max_retries,
                )?),
                Provider::Groq => Arc::new(OpenAIClient::groq(
                    credentials.require(route.provider)?.to_string(),
                    provider_config.endpoint,
                    provider_config.timeout_seconds,
                    provider_config.max_retries,
                )?),
                Provider::Anthropic => Arc::new(AnthropicClient::new(
                    credentials.require(route.provider)?.to_string(),
                    provider_config.endpoint,
                    None,
                    provider_config.timeout_seconds,
                    provider_config.max_retries,
                )?),
                Provider::Azure => Arc::new(OpenAIClient::azure(
                    credentials.require(route.provider)?.to_string(),
                    provider_config.endpoint,
                    provider_config.timeout_seconds,
                    provider_config.max_retries,
                )?),
                Provider::Gemini => Arc::new(GeminiClient::new(
                    credentials.require(route.provider)?.to_string(),
                    provider_config.endpoint,
                    provider_config.timeout_seconds,
                    provider_config.max_retries,
                )?),
                Provider::Ollama => Arc::new(OllamaClient::new(
                    provider_config.endpoint,
                    provider_config.timeout_seconds,
                    provider_config.max_retries,
                )?),
            };
            pool.push(route.clone(), client);
        }
        if pool.is_empty() {
            let wanted: Vec<String> = settings
                .models
                .iter()
                .filter_map(|route| route.provider.env_key())
                .map(ToString::to_string)
                .collect();
            return Err(LLMError::Authentication(format!(
                "No API key configured for any selected model. Set one of {} or call set_api_key",
                if wanted.is_empty() {
                    "the provider keys".to_string()
                } else {
                    wanted.join(", ")
                }
            )));
        }
        info!(
            models = ?pool.routes().iter().map(ModelRoute::label).collect::<Vec<_>>(),
            strategy = pool.strategy.as_str(),
            "Model pool ready"
        );
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn strategy(&self) -> StrategyName {
        self.strategy
    }

    pub fn routes(&self) -> Vec<ModelRoute> {
        self.entries.iter().map(|e| e.route.clone()).collect()
    }

    /// Entries in the order the strategy ranks them.
    fn ranked(&self) -> Vec<&PoolEntry> {
        let mut ranked: Vec<&PoolEntry> = self.entries.iter().collect();
        match self.strategy {
            StrategyName::CostOptimized => ranked.sort_by(|a, b| {
                self.catalog
                    .cost_of(&a.route.model)
                    .total_cmp(&self.catalog.cost_of(&b.route.model))
            }),
            StrategyName::Performance => ranked.sort_by(|a, b| {
                self.catalog
                    .performance_of(&b.route.model)
                    .total_cmp(&self.catalog.performance_of(&a.route.model))
            }),
            StrategyName::RoundRobin | StrategyName::Fallback => {}
        }
        ranked
    }

    fn position_for(&self, iteration: usize) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        Some(match self.strategy {
            StrategyName::RoundRobin => iteration % self.entries.len(),
            _ => iteration.min(self.entries.len() - 1),
        })
    }

    pub fn select(&self, iteration: usize) -> Option<&ModelRoute> {
        let position = self.position_for(iteration)?;
        self.ranked().get(position).map(|entry| &entry.route)
    }

    pub async fn query(
        &self,
        iteration: usize,
        request: ProviderRequest,
    ) -> LLMResult<PoolResponse> {
        let ranked = self.ranked();
        let position = self
            .position_for(iteration)
            .ok_or_else(|| LLMError::Configuration("Model pool is empty".to_string()))?;
        let candidates: Vec<&PoolEntry> = if self.strategy == StrategyName::Fallback {
            ranked.into_iter().skip(position).collect()
        } else {
            ranked.into_iter().skip(position).take(1).collect()
        };
        let mut last_error = None;
        for entry in candidates {
            match Self::send(entry, request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(model = %entry.route, error = %e, "Model query failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| LLMError::Internal("No model available to query".to_string())))
    }

    pub async fn query_route(
        &self,
        route: &ModelRoute,
        request: ProviderRequest,
    ) -> LLMResult<PoolResponse> {
        let entry = self
            .entries
            .iter()
            .find(|e| &e.route == route)
            .ok_or_else(|| LLMError::ModelNotFound(route.label()))?;
        Self::send(entry, request).await
    }

    /// Queries every model concurrently; the first failure fails the whole call.
    /// Under the fallback strategy models are tried in order until one answers.
    pub async fn query_all(&self, request: ProviderRequest) -> LLMResult<Vec<PoolResponse>> {
        if self.entries.is_empty() {
            return Err(LLMError::Configuration("Model pool is empty".to_string()));
        }
        if self.strategy == StrategyName::Fallback {
            return self.query(0, request).await.map(|response| vec![response]);
        }
        let results = join_all(
            self.entries
                .iter()
                .map(|entry| Self::send(entry, request.clone())),
        )
        .await;
        results.into_iter().collect()
    }

    async fn send(entry: &PoolEntry, request: ProviderRequest) -> LLMResult<PoolResponse> {
        debug!(model = %entry.route, "Querying model");
        let response = entry
            .client
            .send_request(request.for_model(entry.route.model.clone()))
            .await?;
        Ok(PoolResponse {
            route: entry.route.clone(),
            response,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedClient;
    use super::*;
    use llm_contracts::GenerationConfig;

    fn route(provider: Provider, model: &str) -> ModelRoute {
        ModelRoute::new(provider, model)
    }

    fn pool(strategy: StrategyName) -> ModelPool {
        ModelPool::new(strategy)
            .with_entry(
                route(Provider::OpenAI, "gpt-4o"),
                Arc::new(ScriptedClient::always("openai")),
            )
            .with_entry(
                route(Provider::Groq, "llama-3.1-8b-instant"),
                Arc::new(ScriptedClient::always("groq")),
            )
            .with_entry(
                route(Provider::Anthropic, "claude-3-5-sonnet-latest"),
                Arc::new(ScriptedClient::always("anthropic")),
            )
    }

    fn request() -> ProviderRequest {
        ProviderRequest::from_prompt("hello", &GenerationConfig::default())
    }

    #[test]
    fn test_round_robin_cycles() {
        let pool = pool(StrategyName::RoundRobin);
        assert_eq!(pool.select(0).unwrap().model, "gpt-4o");
        assert_eq!(pool.select(1).unwrap().model, "llama-3.1-8b-instant");
        assert_eq!(pool.select(3).unwrap().model, "gpt-4o");
    }

    #[test]
    fn test_cost_optimized_starts_cheap_and_escalates() {
        let pool = pool(StrategyName::CostOptimized);
        assert_eq!(pool.select(0).unwrap().model, "llama-3.1-8b-instant");
        assert_eq!(pool.select(1).unwrap().model, "claude-3-5-sonnet-latest");
        assert_eq!(pool.select(9).unwrap().model, "gpt-4o");
    }

    #[test]
    fn test_performance_prefers_best_model() {
        let pool = pool(StrategyName::Performance);
        assert_eq!(pool.select(0).unwrap().model, "gpt-4o");
        assert_eq!(pool.select(1).unwrap().model, "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_missing_keys_are_an_auth_error() {
        let settings = LlmSettings::default();
        let err = ModelPool::from_settings(&settings, &Credentials::new()).unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_pool_only_keeps_models_with_keys() {
        let settings = LlmSettings::default();
        let credentials = Credentials::new()
            .with_api_key(Provider::Anthropic, "sk-ant")
            .unwrap();
        let pool = ModelPool::from_settings(&settings, &credentials).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.routes()[0].provider, Provider::Anthropic);
    }

    #[tokio::test]
    async fn test_query_sets_model_name() {
        let client = Arc::new(ScriptedClient::always("ok"));
        let pool = ModelPool::new(StrategyName::RoundRobin)
            .with_entry(route(Provider::OpenAI, "gpt-4o-mini"), client.clone());
        let answer = pool.query(5, request()).await.unwrap();
        assert_eq!(answer.response.content, "ok");
        assert_eq!(client.requests.lock().unwrap()[0].model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_fallback_moves_to_next_model() {
        let failing = Arc::new(ScriptedClient::new(vec![Err(LLMError::Timeout)]));
        let healthy = Arc::new(ScriptedClient::always("recovered"));
        let pool = ModelPool::new(StrategyName::Fallback)
            .with_entry(route(Provider::OpenAI, "gpt-4o"), failing.clone())
            .with_entry(route(Provider::Groq, "llama-3.3-70b-versatile"), healthy);
        let answer = pool.query(0, request()).await.unwrap();
        assert_eq!(answer.response.content, "recovered");
        assert_eq!(answer.route.provider, Provider::Groq);
        assert_eq!(failing.request_count(), 1);
    }

    #[tokio::test]
    async fn test_round_robin_does_not_fail_over() {
        let failing = Arc::new(ScriptedClient::new(vec![Err(LLMError::RateLimit)]));
        let pool = ModelPool::new(StrategyName::RoundRobin)
            .with_entry(route(Provider::OpenAI, "gpt-4o"), failing)
            .with_entry(
                route(Provider::Groq, "llama-3.3-70b-versatile"),
                Arc::new(ScriptedClient::always("unused")),
            );
        let err = pool.query(0, request()).await.unwrap_err();
        assert!(matches!(err, LLMError::RateLimit));
    }

    #[tokio::test]
    async fn test_query_all_fails_when_any_model_fails() {
        let pool = ModelPool::new(StrategyName::RoundRobin)
            .with_entry(
                route(Provider::OpenAI, "gpt-4o"),
                Arc::new(ScriptedClient::always("fine")),
            )
            .with_entry(
                route(Provider::Groq, "llama-3.3-70b-versatile"),
                Arc::new(ScriptedClient::new(vec![Err(LLMError::Network(
                    "reset".to_string(),
                ))])),
            );
        let err = pool.query_all(request()).await.unwrap_err();
        assert!(matches!(err, LLMError::Network(_)));
        let ok = self::pool(StrategyName::RoundRobin)
            .query_all(request())
            .await
            .unwrap();
        assert_eq!(ok.len(), 3);
    }
}
