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

pub mod prompts;

use crate::config::ExplainerSettings;
use crate::error::{Result, ValidationError};
use crate::figure::Figure;
use crate::llm::ModelPool;
use chrono::{DateTime, Utc};
use llm_contracts::{GenerationConfig, ProviderRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub text: String,
    pub prompt: String,
    /// Refinement rounds performed after the initial explanation.
    pub iterations: usize,
    /// `provider:model` per call, in call order.
    pub models_used: Vec<String>,
    pub created_at: DateTime<Utc>,
}

fn normalise(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Default)]
pub struct Explainer {
    settings: ExplainerSettings,
    generation: GenerationConfig,
}

impl Explainer {
    pub fn new(settings: ExplainerSettings, generation: GenerationConfig) -> Self {
        Self {
            settings,
            generation,
        }
    }

    /// What the model sees of the figure.
    pub fn chart_context(&self, figure: &Figure) -> String {
        let mut context = figure.describe();
        if self.settings.include_svg_markup {
            context.push_str("SVG markup:\n");
            context.push_str(figure.svg());
        }
        context
    }

    /// Checks inputs before any model is contacted.
    pub fn validate<'a>(
        &'a self,
        figure: Option<&'a Figure>,
        prompt: Option<&'a str>,
    ) -> Result<(&'a Figure, &'a str)> {
        let figure = figure.ok_or(ValidationError::MissingFigure)?;
        let prompt = prompt.unwrap_or(&self.settings.default_prompt);
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt.into());
        }
        Ok((figure, prompt))
    }

    async fn ask(
        &self,
        pool: &ModelPool,
        iteration: usize,
        prompt: String,
        models_used: &mut Vec<String>,
    ) -> Result<String> {
        let request = ProviderRequest::from_prompt(prompt, &self.generation).with_system(prompts::SYSTEM);
        let reply = pool.query(iteration, request).await?;
        models_used.push(reply.route.label());
        Ok(reply.response.content.trim().to_string())
    }

    pub async fn explain(
        &self,
        figure: Option<&Figure>,
        prompt: Option<&str>,
        max_iterations: Option<usize>,
        pool: &ModelPool,
    ) -> Result<Explanation> {
        let (figure, request) = self.validate(figure, prompt)?;
        let max_iterations = max_iterations.unwrap_or(self.settings.max_iterations);
        let chart = self.chart_context(figure);
        let mut models_used = Vec::new();

        info!(figure = %figure.id(), max_iterations, "Explaining figure");
        let mut current = self
            .ask(pool, 0, prompts::initial(request, &chart), &mut models_used)
            .await?;
        let mut iterations = 0;
        for round in 1..=max_iterations {
            let critique = self
                .ask(pool, round, prompts::critique(request, &chart, &current), &mut models_used)
                .await?;
            let refined = self
                .ask(
                    pool,
                    round,
                    prompts::refinement(request, &chart, &current, &critique),
                    &mut models_used,
                )
                .await?;
            iterations = round;
            if normalise(&refined) == normalise(&current) {
                debug!(round, "Refinement unchanged, stopping early");
                break;
            }
            current = refined;
            debug!(round, "Refinement round complete");
        }
        info!(iterations, "Explanation ready");
        Ok(Explanation {
            text: current,
            prompt: request.to_string(),
            iterations,
            models_used,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChartKind;
    use crate::dataset::Dataset;
    use crate::error::VistaError;
    use crate::llm::testing::ScriptedClient;
    use crate::plotgen::{PlotGenerator, StyleOverrides, VariableOverrides};
    use crate::recommender::Suggestion;
    use llm_contracts::{LLMError, ModelRoute, Provider, StrategyName};
    use polars::prelude::*;
    use std::sync::Arc;

    fn figure() -> Figure {
        let ds = Dataset::new(df! { "score" => [1.0, 2.0, 2.5, 3.0, 8.0] }.unwrap()).unwrap();
        let s = Suggestion::new(ChartKind::Hist, vec!["score".into()], 1.0);
        PlotGenerator::default()
            .plot(&ds, (&s).into(), &VariableOverrides::default(), &StyleOverrides::default())
            .unwrap()
    }

    fn pool(client: Arc<ScriptedClient>) -> ModelPool {
        ModelPool::new(StrategyName::RoundRobin)
            .with_entry(ModelRoute::new(Provider::OpenAI, "gpt-4o"), client)
    }

    fn replies(texts: &[&str]) -> Arc<ScriptedClient> {
        Arc::new(ScriptedClient::new(texts.iter().map(|t| Ok(t.to_string())).collect()))
    }

    #[tokio::test]
    async fn test_missing_figure_never_calls_model() {
        let client = replies(&["unused"]);
        let err = Explainer::default()
            .explain(None, None, None, &pool(client.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, VistaError::Validation(ValidationError::MissingFigure)));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_prompt_is_rejected() {
        let client = replies(&["unused"]);
        let fig = figure();
        let err = Explainer::default()
            .explain(Some(&fig), Some("   "), None, &pool(client.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, VistaError::Validation(ValidationError::EmptyPrompt)));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_runs_critique_and_refinement_rounds() {
        let client = replies(&["draft", "critique one", "better", "critique two", "best"]);
        let fig = figure();
        let explanation = Explainer::default()
            .explain(Some(&fig), None, Some(2), &pool(client.clone()))
            .await
            .unwrap();
        assert_eq!(explanation.text, "best");
        assert_eq!(explanation.iterations, 2);
        assert_eq!(explanation.prompt, crate::config::DEFAULT_PROMPT);
        assert_eq!(explanation.models_used.len(), 5);
        let requests = client.requests.lock().unwrap();
        assert!(requests[0].prompt().unwrap().contains("Chart type: histogram"));
        assert!(requests[2].prompt().unwrap().contains("Critique:\ncritique one"));
    }

    #[tokio::test]
    async fn test_unchanged_refinement_stops_early() {
        let client = replies(&["same  text", "fine as is", "same text"]);
        let fig = figure();
        let explanation = Explainer::default()
            .explain(Some(&fig), None, Some(5), &pool(client.clone()))
            .await
            .unwrap();
        assert_eq!(explanation.iterations, 1);
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn test_zero_iterations_returns_initial_explanation() {
        let client = replies(&["only draft"]);
        let fig = figure();
        let explanation = Explainer::default()
            .explain(Some(&fig), Some("What stands out?"), Some(0), &pool(client))
            .await
            .unwrap();
        assert_eq!(explanation.text, "only draft");
        assert_eq!(explanation.iterations, 0);
    }

    #[tokio::test]
    async fn test_auth_failure_is_surfaced() {
        let client = Arc::new(ScriptedClient::new(vec![Err(LLMError::Authentication(
            "bad key".into(),
        ))]));
        let fig = figure();
        let err = Explainer::default()
            .explain(Some(&fig), None, None, &pool(client))
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }
}
