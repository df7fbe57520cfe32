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

pub mod describe;
pub mod ensemble;
pub mod matcher;
pub mod parser;
pub mod prompt;

pub use ensemble::EnsembleScorer;
pub use matcher::{Candidate, ChartMatcher, ChartScore, MatchingConfig};
pub use parser::ParsedSuggestion;

use crate::cache::RecommendationCache;
use crate::catalog::{ChartCatalog, ChartKind};
use crate::config::RecommenderSettings;
use crate::data_profiler::{DataProfiler, DatasetSummary, DimensionProfile, ProfilingConfig};
use crate::dataset::Dataset;
use crate::error::{DataError, Result, ValidationError};
use crate::llm::ModelPool;
use crate::plotgen::PlotRegistry;
use llm_contracts::{GenerationConfig, LLMError, ModelRoute, ProviderRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingMode {
    /// Profile-driven scoring, no network.
    #[default]
    Heuristic,
    /// Weighted vote across every pooled model.
    Ensemble,
}

/// A recommended chart with its columns bound in plotting order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub chart_type: ChartKind,
    pub variables: Vec<String>,
    pub score: f64,
    pub rationale: String,
    /// `provider:model` labels that proposed this pairing; empty for heuristic ranking.
    pub source_models: Vec<String>,
}

impl Suggestion {
    pub fn new(chart_type: ChartKind, variables: Vec<String>, score: f64) -> Self {
        Self {
            chart_type,
            variables,
            score,
            rationale: String::new(),
            source_models: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn agreement(&self) -> usize {
        self.source_models.len()
    }
}

pub(crate) fn dedupe_key(kind: ChartKind, variables: &[String]) -> (ChartKind, Vec<String>) {
    let mut sorted = variables.to_vec();
    sorted.sort();
    (kind, sorted)
}

/// Score then agreement descending; chart name and variables break ties.
pub(crate) fn rank(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.agreement().cmp(&a.agreement()))
            .then_with(|| a.chart_type.as_str().cmp(b.chart_type.as_str()))
            .then_with(|| a.variables.cmp(&b.variables))
    });
}

fn merge_unique(target: &mut Vec<Suggestion>, extra: Vec<Suggestion>) {
    let mut seen: HashSet<_> = target
        .iter()
        .map(|s| dedupe_key(s.chart_type, &s.variables))
        .collect();
    target.extend(
        extra
            .into_iter()
            .filter(|s| seen.insert(dedupe_key(s.chart_type, &s.variables))),
    );
}

pub struct Recommender {
    settings: RecommenderSettings,
    profiling: ProfilingConfig,
    catalog: Arc<ChartCatalog>,
    registry: PlotRegistry,
    generation: GenerationConfig,
    cache: Option<RecommendationCache>,
}

impl Recommender {
    pub fn new(
        settings: RecommenderSettings,
        profiling: ProfilingConfig,
        catalog: Arc<ChartCatalog>,
    ) -> Self {
        let cache = settings.cache_enabled.then(|| {
            RecommendationCache::new(
                settings.cache_capacity,
                Duration::from_secs(settings.cache_ttl_seconds),
            )
        });
        Self {
            settings,
            profiling,
            catalog,
            registry: PlotRegistry::builtin(),
            generation: GenerationConfig::default(),
            cache,
        }
    }

    /// Share a cache between recommenders, or pass `None` to disable caching.
    #[must_use]
    pub fn with_cache(mut self, cache: Option<RecommendationCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Plot requirements used to reject model suggestions that cannot be drawn.
    #[must_use]
    pub fn with_registry(mut self, registry: PlotRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn settings(&self) -> &RecommenderSettings {
        &self.settings
    }

    /// Dispatches on the configured ranking mode, consulting the cache first.
    pub async fn recommend(
        &self,
        dataset: &Dataset,
        count: usize,
        pool: Option<&ModelPool>,
    ) -> Result<Vec<Suggestion>> {
        if count == 0 {
            return Err(ValidationError::InvalidSuggestionCount.into());
        }
        let mode = self.settings.mode;
        let models: Vec<ModelRoute> = match (mode, pool) {
            (RankingMode::Ensemble, Some(pool)) => pool.routes(),
            (RankingMode::Ensemble, None) => {
                return Err(LLMError::Configuration(
                    "Ensemble ranking needs a model pool".to_string(),
                )
                .into())
            }
            (RankingMode::Heuristic, _) => Vec::new(),
        };
        let key = match &self.cache {
            Some(_) => Some(RecommendationCache::key(
                &dataset.fingerprint()?,
                count,
                mode,
                &models,
            )),
            None => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key).await {
                info!(count = hit.len(), "Serving cached recommendations");
                return Ok(hit.as_ref().clone());
            }
        }
        let suggestions = match (mode, pool) {
            (RankingMode::Ensemble, Some(pool)) => self.ensemble(dataset, count, pool).await?,
            _ => self.heuristic(dataset, count)?,
        };
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, suggestions.clone()).await;
        }
        Ok(suggestions)
    }

    fn profile(&self, dataset: &Dataset) -> Result<Vec<DimensionProfile>> {
        let profiles =
            DataProfiler::with_config(self.profiling.clone()).profile_dataframe(dataset.frame())?;
        debug!(summary = %DatasetSummary::from_profiles(&profiles), "Profiled dataset");
        Ok(profiles)
    }

    pub fn heuristic(&self, dataset: &Dataset, count: usize) -> Result<Vec<Suggestion>> {
        if count == 0 {
            return Err(ValidationError::InvalidSuggestionCount.into());
        }
        let profiles = self.profile(dataset)?;
        let has_temporal = profiles.iter().any(|p| p.data_type.is_temporal());
        // Only columns whose stored dtype agrees with the profile can be plotted as numbers.
        let bindable: Vec<&DimensionProfile> = profiles
            .iter()
            .filter(|p| p.is_usable() && (!p.data_type.is_numeric() || dataset.is_numeric(&p.name)))
            .collect();
        if bindable.is_empty() {
            return Err(DataError::NoUsableColumns {
                reason: "no numeric or categorical column has any values".to_string(),
            }
            .into());
        }
        let config = MatchingConfig {
            min_quality_score: self.settings.min_quality_score,
            max_suggestions_per_chart: self.settings.max_suggestions_per_chart,
        };
        let matcher = ChartMatcher::new(&bindable, has_temporal, &self.catalog, &config);
        let candidates = matcher.find_candidates();
        debug!(candidates = candidates.len(), "Heuristic candidates scored");

        let mut seen = HashSet::new();
        let mut suggestions: Vec<Suggestion> = candidates
            .into_iter()
            .filter(|c| seen.insert(dedupe_key(c.kind, &c.variables)))
            .filter(|c| {
                self.registry
                    .requirements(c.kind)
                    .and_then(|r| r.check(c.kind, &c.variables, dataset))
                    .is_ok()
            })
            .map(|c| {
                let rationale = matcher::describe_candidate(c.kind, &c.variables);
                Suggestion::new(c.kind, c.variables, c.score).with_rationale(rationale)
            })
            .collect();
        rank(&mut suggestions);
        suggestions.truncate(count);
        info!(count = suggestions.len(), "Heuristic recommendations ready");
        Ok(suggestions)
    }

    /// Asks every pooled model, combines the replies by weighted vote and
    /// tops up a short list with one follow-up to the heaviest responder.
    pub async fn ensemble(
        &self,
        dataset: &Dataset,
        count: usize,
        pool: &ModelPool,
    ) -> Result<Vec<Suggestion>> {
        if count == 0 {
            return Err(ValidationError::InvalidSuggestionCount.into());
        }
        let profiles = self.profile(dataset)?;
        if !profiles.iter().any(DimensionProfile::is_usable) {
            return Err(DataError::NoUsableColumns {
                reason: "no numeric or categorical column has any values".to_string(),
            }
            .into());
        }
        let description = describe::describe_dataset(dataset, &profiles)?;
        let request =
            ProviderRequest::from_prompt(prompt::recommendation_prompt(&description, count), &self.generation);
        let replies = pool.query_all(request).await?;
        info!(models = replies.len(), "Collected model recommendations");

        let scorer = EnsembleScorer::new(&pool.routes(), &self.settings.model_weights);
        let parsed: Vec<(ModelRoute, Vec<ParsedSuggestion>)> = replies
            .into_iter()
            .map(|reply| {
                let suggestions = parser::parse_response(&reply.response.content, dataset, &self.registry);
                debug!(model = %reply.route, parsed = suggestions.len(), "Parsed model reply");
                (reply.route, suggestions)
            })
            .collect();
        let mut suggestions = scorer.combine(&parsed);

        if suggestions.len() < count {
            let participants: Vec<ModelRoute> = parsed.iter().map(|(r, _)| r.clone()).collect();
            if let Some(best) = scorer.best(&participants) {
                let needed = count - suggestions.len();
                debug!(model = %best, needed, "Requesting supplementary recommendations");
                let request = ProviderRequest::from_prompt(
                    prompt::supplement_prompt(&description, &suggestions, needed),
                    &self.generation,
                );
                let reply = pool.query_route(best, request).await?;
                let extra = parser::parse_response(&reply.response.content, dataset, &self.registry);
                merge_unique(&mut suggestions, scorer.supplement(best, &participants, &extra));
                rank(&mut suggestions);
            }
        }
        suggestions.truncate(count);
        info!(count = suggestions.len(), "Ensemble recommendations ready");
        Ok(suggestions)
    }
}
