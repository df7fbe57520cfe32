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

//! Layered settings: built-in defaults, an optional YAML file, then
//! `VISTA__`-prefixed environment variables (`VISTA__LLM__STRATEGY=performance`).

use crate::data_profiler::ProfilingConfig;
use crate::error::{ConfigError, Result};
use crate::recommender::RankingMode;
use ::config::{Config, Environment, File, FileFormat};
use llm_contracts::{GenerationConfig, ModelRoute, Provider, ProviderConfig, StrategyName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const ENV_PREFIX: &str = "VISTA";
pub const DEFAULT_PROMPT: &str = "Explain this data visualization";
pub const PLOT_SIZE_RANGE: std::ops::RangeInclusive<u32> = 100..=4000;
pub const MAX_BINS: usize = 10_000;
pub const MAX_HEXBIN_GRIDSIZE: usize = 500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub recommender: RecommenderSettings,
    pub plot: PlotSettings,
    pub explainer: ExplainerSettings,
    pub llm: LlmSettings,
    pub profiling: ProfilingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderSettings {
    pub default_count: usize,
    pub mode: RankingMode,
    pub min_quality_score: f64,
    pub max_suggestions_per_chart: usize,
    /// Per-model ensemble weights keyed by `provider:model`; unset models use the family default.
    pub model_weights: HashMap<String, f64>,
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
    pub cache_capacity: u64,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            default_count: 5,
            mode: RankingMode::Heuristic,
            min_quality_score: 0.3,
            max_suggestions_per_chart: 10,
            model_weights: HashMap::new(),
            cache_enabled: true,
            cache_ttl_seconds: 3600,
            cache_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSettings {
    pub width: u32,
    pub height: u32,
    pub bins: usize,
    pub hexbin_gridsize: usize,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            bins: 10,
            hexbin_gridsize: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerSettings {
    pub default_prompt: String,
    pub max_iterations: usize,
    /// Append the SVG markup to the figure description sent to the model.
    pub include_svg_markup: bool,
}

impl Default for ExplainerSettings {
    fn default() -> Self {
        Self {
            default_prompt: DEFAULT_PROMPT.to_string(),
            max_iterations: 2,
            include_svg_markup: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub models: Vec<ModelRoute>,
    pub strategy: StrategyName,
    pub timeout_seconds: u32,
    pub max_retries: u32,
    pub generation: GenerationConfig,
    /// Per-provider endpoint, timeout and retry overrides.
    pub providers: HashMap<Provider, ProviderConfig>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            models: vec![
                ModelRoute::new(Provider::OpenAI, "gpt-4o"),
                ModelRoute::new(Provider::Anthropic, "claude-3-5-sonnet-latest"),
                ModelRoute::new(Provider::Groq, "llama-3.3-70b-versatile"),
            ],
            strategy: StrategyName::RoundRobin,
            timeout_seconds: 30,
            max_retries: 0,
            generation: GenerationConfig::default(),
            providers: HashMap::new(),
        }
    }
}

impl LlmSettings {
    pub fn provider_config(&self, provider: Provider) -> ProviderConfig {
        let overrides = self.providers.get(&provider);
        ProviderConfig {
            endpoint: overrides.and_then(|c| c.endpoint.clone()),
            timeout_seconds: Some(
                overrides
                    .and_then(|c| c.timeout_seconds)
                    .unwrap_or(self.timeout_seconds),
            ),
            max_retries: Some(
                overrides
                    .and_then(|c| c.max_retries)
                    .unwrap_or(self.max_retries),
            ),
        }
    }
}

impl AssistantConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| -> Result<()> {
            Err(ConfigError::ValidationFailed {
                reason: reason.to_string(),
            }
            .into())
        };
        let rec = &self.recommender;
        if rec.default_count == 0 {
            return fail("recommender.default_count must be greater than 0");
        }
        if !(0.0..=1.0).contains(&rec.min_quality_score) {
            return fail("recommender.min_quality_score must be between 0.0 and 1.0");
        }
        if rec.max_suggestions_per_chart == 0 || rec.max_suggestions_per_chart > 100 {
            return fail("recommender.max_suggestions_per_chart must be between 1 and 100");
        }
        if rec.model_weights.values().any(|w| !w.is_finite() || *w < 0.0) {
            return fail("recommender.model_weights must be finite and non-negative");
        }
        if rec.cache_enabled && (rec.cache_ttl_seconds == 0 || rec.cache_capacity == 0) {
            return fail("recommender cache needs a positive ttl and capacity");
        }
        if !PLOT_SIZE_RANGE.contains(&self.plot.width) || !PLOT_SIZE_RANGE.contains(&self.plot.height) {
            return fail("plot.width and plot.height must be between 100 and 4000 pixels");
        }
        if !(1..=MAX_BINS).contains(&self.plot.bins) {
            return fail("plot.bins must be between 1 and 10000");
        }
        if !(1..=MAX_HEXBIN_GRIDSIZE).contains(&self.plot.hexbin_gridsize) {
            return fail("plot.hexbin_gridsize must be between 1 and 500");
        }
        if self.explainer.default_prompt.trim().is_empty() {
            return fail("explainer.default_prompt must not be empty");
        }
        if self.explainer.max_iterations > 10 {
            return fail("explainer.max_iterations must not exceed 10");
        }
        if self.llm.models.is_empty() {
            return fail("llm.models must list at least one provider:model pair");
        }
        if self.llm.timeout_seconds == 0 {
            return fail("llm.timeout_seconds must be greater than 0");
        }
        if let Some(t) = self.llm.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return fail("llm.generation.temperature must be between 0.0 and 2.0");
            }
        }
        if self.profiling.type_confidence_threshold <= 0.0
            || self.profiling.type_confidence_threshold > 1.0
        {
            return fail("profiling.type_confidence_threshold must be in (0.0, 1.0]");
        }
        Ok(())
    }
}
