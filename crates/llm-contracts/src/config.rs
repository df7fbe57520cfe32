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

use crate::types::Provider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A concrete model on a concrete provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRoute {
    pub provider: Provider,
    pub model: String,
}

impl ModelRoute {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// `provider:model`, the key used for ensemble weights and source attribution.
    pub fn label(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}

impl fmt::Display for ModelRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub provider: Provider,
    /// Approximate cost multiplier per request.
    pub cost_per_request: f64,
    /// Relative quality on a 0-10 scale.
    pub performance_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelCatalog {
    pub models: Vec<ModelDefinition>,
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        let entries: [(&str, Provider, f64, f64); 18] = [
            ("gpt-4o", Provider::OpenAI, 0.03, 10.0),
            ("gpt-4o-mini", Provider::OpenAI, 0.01, 8.5),
            ("gpt-4-turbo", Provider::OpenAI, 0.025, 9.5),
            ("gpt-3.5-turbo", Provider::OpenAI, 0.008, 7.5),
            ("claude-3-opus", Provider::Anthropic, 0.05, 9.8),
            ("claude-3-sonnet", Provider::Anthropic, 0.02, 9.0),
            ("claude-3-5-sonnet-latest", Provider::Anthropic, 0.02, 9.4),
            ("claude-3-haiku", Provider::Anthropic, 0.009, 7.0),
            ("claude-3-5-haiku-latest", Provider::Anthropic, 0.01, 7.6),
            ("llama-3.3-70b-versatile", Provider::Groq, 0.02, 8.8),
            ("llama-3.1-8b-instant", Provider::Groq, 0.005, 6.5),
            ("llama3", Provider::Ollama, 0.001, 6.8),
            ("mistral", Provider::Ollama, 0.002, 6.0),
            ("gemma2", Provider::Ollama, 0.001, 6.2),
            ("gemini-1.5-pro", Provider::Gemini, 0.02, 9.3),
            ("gemini-1.5-flash", Provider::Gemini, 0.006, 7.8),
            ("azure-gpt-4o", Provider::Azure, 0.031, 9.8),
            ("azure-gpt-4o-mini", Provider::Azure, 0.011, 8.3),
        ];
        Self {
            models: entries
                .into_iter()
                .map(|(name, provider, cost, performance)| ModelDefinition {
                    name: name.to_string(),
                    provider,
                    cost_per_request: cost,
                    performance_score: performance,
                })
                .collect(),
        }
    }

    pub fn find(&self, model: &str) -> Option<&ModelDefinition> {
        self.models.iter().find(|m| m.name == model)
    }

    /// Unknown models sort last when optimising for cost.
    pub fn cost_of(&self, model: &str) -> f64 {
        self.find(model).map_or(f64::INFINITY, |m| m.cost_per_request)
    }

    pub fn performance_of(&self, model: &str) -> f64 {
        self.find(model).map_or(0.0, |m| m.performance_score)
    }

    pub fn cost_map(&self) -> HashMap<String, f64> {
        self.models
            .iter()
            .map(|m| (m.name.clone(), m.cost_per_request))
            .collect()
    }
}

/// Ensemble weight inferred from the model family.
pub fn default_ensemble_weight(route: &ModelRoute) -> f64 {
    let model = route.model.to_lowercase();
    if route.provider == Provider::Azure {
        if model.contains("gpt-4") {
            1.8
        } else {
            1.1
        }
    } else if model.starts_with("gpt-4") {
        2.0
    } else if model.contains("claude") {
        1.8
    } else if model.contains("gemini") {
        1.6
    } else if model.contains("llama") || route.provider == Provider::Groq {
        1.2
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_models_are_most_expensive() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.cost_of("gpt-4o-mini") < catalog.cost_of("gpt-4o"));
        assert!(catalog.cost_of("mystery-model").is_infinite());
        assert!(catalog.performance_of("mystery-model").abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_weights_follow_model_family() {
        let gpt = ModelRoute::new(Provider::OpenAI, "gpt-4o");
        let claude = ModelRoute::new(Provider::Anthropic, "claude-3-5-sonnet-latest");
        let llama = ModelRoute::new(Provider::Groq, "llama-3.3-70b-versatile");
        let local = ModelRoute::new(Provider::Ollama, "mistral");

        assert!((default_ensemble_weight(&gpt) - 2.0).abs() < f64::EPSILON);
        assert!((default_ensemble_weight(&claude) - 1.8).abs() < f64::EPSILON);
        assert!((default_ensemble_weight(&llama) - 1.2).abs() < f64::EPSILON);
        assert!((default_ensemble_weight(&local) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hosted_openai_models_weigh_less_than_direct() {
        let hosted = ModelRoute::new(Provider::Azure, "gpt-4o");
        let hosted_small = ModelRoute::new(Provider::Azure, "o1-mini");
        let gemini = ModelRoute::new(Provider::Gemini, "gemini-1.5-flash");

        assert!((default_ensemble_weight(&hosted) - 1.8).abs() < f64::EPSILON);
        assert!((default_ensemble_weight(&hosted_small) - 1.1).abs() < f64::EPSILON);
        assert!((default_ensemble_weight(&gemini) - 1.6).abs() < f64::EPSILON);

        let catalog = ModelCatalog::builtin();
        assert!(catalog.cost_of("gemini-1.5-flash") < catalog.cost_of("gemini-1.5-pro"));
        assert!(catalog.performance_of("azure-gpt-4o") > 9.0);
    }

    #[test]
    fn test_route_label() {
        let route = ModelRoute::new(Provider::Groq, "llama-3.1-8b-instant");
        assert_eq!(route.label(), "groq:llama-3.1-8b-instant");
    }
}
