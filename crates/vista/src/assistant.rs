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

use crate::catalog::{ChartCatalog, ChartKind};
use crate::config::AssistantConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::explainer::{Explainer, Explanation};
use crate::figure::Figure;
use crate::llm::{session_credentials, set_session_api_key, Credentials, ModelPool};
use crate::plotgen::{
    PlotGenerator, PlotRegistry, PlotRenderer, PlotRequirements, StyleOverrides, SuggestionRef,
    VariableOverrides,
};
use crate::recommender::{RankingMode, Recommender, Suggestion};
use llm_contracts::Provider;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Recommend, plot and explain behind one handle.
///
/// Credentials are resolved when a model is needed, so keys set after
/// construction still apply. An injected pool replaces credential lookup.
pub struct Assistant {
    config: AssistantConfig,
    credentials: Credentials,
    pool: Option<ModelPool>,
    catalog: Arc<ChartCatalog>,
    recommender: Recommender,
    plotgen: PlotGenerator,
    explainer: Explainer,
}

impl Assistant {
    pub fn new(config: AssistantConfig) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(ChartCatalog::builtin()?);
        let registry = PlotRegistry::builtin();
        let recommender = Recommender::new(
            config.recommender.clone(),
            config.profiling.clone(),
            catalog.clone(),
        )
        .with_registry(registry.clone())
        .with_generation(config.llm.generation.clone());
        let plotgen = PlotGenerator::new(config.plot.clone(), registry);
        let explainer = Explainer::new(config.explainer.clone(), config.llm.generation.clone());
        Ok(Self {
            config,
            credentials: Credentials::new(),
            pool: None,
            catalog,
            recommender,
            plotgen,
            explainer,
        })
    }

    /// Defaults layered with `VISTA__*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(AssistantConfig::load(None)?)
    }

    /// Route every model call through `pool` instead of building one from credentials.
    #[must_use]
    pub fn with_pool(mut self, pool: ModelPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn set_api_key(&mut self, provider: Provider, key: impl Into<String>) -> Result<()> {
        Ok(self.credentials.set_api_key(provider, key)?)
    }

    /// Replace the renderer used for `kind`.
    pub fn register_renderer(
        &mut self,
        kind: ChartKind,
        requirements: PlotRequirements,
        renderer: Arc<dyn PlotRenderer>,
    ) {
        self.plotgen
            .registry_mut()
            .register(kind, requirements, renderer);
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ChartCatalog {
        &self.catalog
    }

    /// Environment and session keys, overlaid with keys set on this assistant.
    fn model_pool(&self) -> Result<ModelPool> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        let mut credentials = session_credentials();
        credentials.merge(&self.credentials);
        Ok(ModelPool::from_settings(&self.config.llm, &credentials)?)
    }

    pub async fn recommend(&self, dataset: &Dataset, count: usize) -> Result<Vec<Suggestion>> {
        info!(rows = dataset.height(), columns = dataset.width(), count, "Recommending charts");
        match self.config.recommender.mode {
            RankingMode::Heuristic => self.recommender.recommend(dataset, count, None).await,
            RankingMode::Ensemble => {
                let pool = self.model_pool()?;
                self.recommender.recommend(dataset, count, Some(&pool)).await
            }
        }
    }

    pub fn plot(
        &self,
        dataset: &Dataset,
        selection: SuggestionRef<'_>,
        variables: &VariableOverrides,
        style: &StyleOverrides,
    ) -> Result<Figure> {
        self.plotgen.plot(dataset, selection, variables, style)
    }

    /// Inputs are validated before credentials are resolved.
    pub async fn explain(
        &self,
        figure: Option<&Figure>,
        prompt: Option<&str>,
        max_iterations: Option<usize>,
    ) -> Result<Explanation> {
        self.explainer.validate(figure, prompt)?;
        let pool = self.model_pool()?;
        self.explainer
            .explain(figure, prompt, max_iterations, &pool)
            .await
    }

    /// Must not be called from inside a tokio runtime.
    pub fn recommend_blocking(&self, dataset: &Dataset, count: usize) -> Result<Vec<Suggestion>> {
        runtime()?.block_on(self.recommend(dataset, count))
    }

    /// Must not be called from inside a tokio runtime.
    pub fn explain_blocking(
        &self,
        figure: Option<&Figure>,
        prompt: Option<&str>,
        max_iterations: Option<usize>,
    ) -> Result<Explanation> {
        runtime()?.block_on(self.explain(figure, prompt, max_iterations))
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

static SHARED: Mutex<Option<Arc<Assistant>>> = Mutex::new(None);

/// The instance behind the free functions, built from the environment on first use
/// and kept so its recommendation cache outlives each call.
fn shared() -> Result<Arc<Assistant>> {
    let mut slot = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(assistant) = slot.as_ref() {
        return Ok(assistant.clone());
    }
    let assistant = Arc::new(Assistant::from_env()?);
    *slot = Some(assistant.clone());
    Ok(assistant)
}

/// Replace the instance used by [`recommender`], [`plotgen`] and [`explainer`].
pub fn set_shared_assistant(assistant: Assistant) {
    *SHARED.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(assistant));
}

/// Drop the shared instance; the next free-function call rebuilds it from the environment.
pub fn reset_shared_assistant() {
    *SHARED.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Ranked chart suggestions for `dataset`; `count` defaults to the configured count.
pub fn recommender(dataset: &Dataset, count: Option<usize>) -> Result<Vec<Suggestion>> {
    let assistant = shared()?;
    let count = count.unwrap_or(assistant.config.recommender.default_count);
    assistant.recommend_blocking(dataset, count)
}

/// Render the selected suggestion, optionally rebinding its first two variables.
pub fn plotgen(
    dataset: &Dataset,
    selection: SuggestionRef<'_>,
    x: Option<&str>,
    y: Option<&str>,
) -> Result<Figure> {
    let overrides = VariableOverrides {
        x: x.map(str::to_string),
        y: y.map(str::to_string),
        z: None,
    };
    shared()?.plot(dataset, selection, &overrides, &StyleOverrides::default())
}

pub fn explainer(
    figure: Option<&Figure>,
    prompt: Option<&str>,
    max_iterations: Option<usize>,
) -> Result<Explanation> {
    shared()?.explain_blocking(figure, prompt, max_iterations)
}

/// Session-wide key used by [`recommender`], [`plotgen`] and [`explainer`].
/// Keys are resolved on every model call, so the shared instance and its cache are kept.
pub fn set_api_key(provider: Provider, key: impl Into<String>) -> Result<()> {
    Ok(set_session_api_key(provider, key)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ValidationError, VistaError};
    use crate::llm::testing::ScriptedClient;
    use llm_contracts::{ModelRoute, StrategyName};
    use polars::prelude::*;

    fn dataset() -> Dataset {
        Dataset::new(
            df! {
                "hours" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
                "grade" => [52.0, 55.0, 61.0, 64.0, 70.0, 74.0, 81.0, 88.0],
                "group" => ["a", "b", "a", "b", "a", "b", "a", "b"],
            }
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_explain_without_figure_fails_before_credentials() {
        let assistant = Assistant::new(AssistantConfig::default()).unwrap();
        let err = assistant.explain_blocking(None, None, None).unwrap_err();
        assert!(matches!(err, VistaError::Validation(ValidationError::MissingFigure)));
    }

    #[test]
    fn test_blocking_round_trip_with_injected_pool() {
        let client = Arc::new(ScriptedClient::always("The grade rises with hours."));
        let pool = ModelPool::new(StrategyName::RoundRobin)
            .with_entry(ModelRoute::new(Provider::OpenAI, "gpt-4o"), client);
        let assistant = Assistant::new(AssistantConfig::default())
            .unwrap()
            .with_pool(pool);
        let ds = dataset();
        let suggestions = assistant.recommend_blocking(&ds, 3).unwrap();
        assert!(!suggestions.is_empty());
        let figure = assistant
            .plot(
                &ds,
                SuggestionRef::Index {
                    index: 0,
                    suggestions: &suggestions,
                },
                &VariableOverrides::default(),
                &StyleOverrides::default(),
            )
            .unwrap();
        let explanation = assistant
            .explain_blocking(Some(&figure), None, Some(1))
            .unwrap();
        assert_eq!(explanation.text, "The grade rises with hours.");
        assert_eq!(explanation.iterations, 1);
    }

    #[test]
    fn test_free_functions_share_one_cache() {
        let reply = "Plot Type: scatter\nVariables: hours, grade\nRationale: r\n---\n\
                     Plot Type: box\nVariables: grade, group\nRationale: s\n---";
        let client = Arc::new(ScriptedClient::always(reply));
        let pool = ModelPool::new(StrategyName::RoundRobin)
            .with_entry(ModelRoute::new(Provider::OpenAI, "gpt-4o"), client.clone());
        let mut config = AssistantConfig::default();
        config.recommender.mode = RankingMode::Ensemble;
        set_shared_assistant(Assistant::new(config).unwrap().with_pool(pool));

        let ds = dataset();
        let first = recommender(&ds, Some(2)).unwrap();
        assert_eq!(client.request_count(), 1);
        let second = recommender(&ds, Some(2)).unwrap();
        assert_eq!(client.request_count(), 1);
        assert_eq!(first, second);

        let figure = plotgen(&ds, SuggestionRef::Index { index: 0, suggestions: &first }, None, None)
            .unwrap();
        assert_eq!(figure.kind(), first[0].chart_type);
        reset_shared_assistant();
    }

    #[test]
    fn test_blank_key_is_rejected() {
        let mut assistant = Assistant::new(AssistantConfig::default()).unwrap();
        let err = assistant.set_api_key(Provider::OpenAI, "  ").unwrap_err();
        assert!(err.is_auth());
    }
}
