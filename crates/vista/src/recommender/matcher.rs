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

use crate::catalog::{ArgSpec, ChartCatalog, ChartKind, ChartNode, DataType};
use crate::data_profiler::DimensionProfile;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
mod weights {
    pub const COMPLETENESS_BONUS: f64 = 0.05;
    pub const BONUS_VALUE_NUMERIC: f64 = 0.1;
    pub const BONUS_GROUP_CATEGORICAL: f64 = 0.15;
    pub const PENALTY_GROUP_CARDINALITY: f64 = 0.3;
    pub const PENALTY_CATEGORY_CARDINALITY: f64 = 0.2;
    pub const PENALTY_PIE_WEDGES: f64 = 0.3;
    pub const SEMANTIC_BONUS_NUMERIC_SCATTER: f64 = 0.2;
    pub const SEMANTIC_BONUS_COMPLEMENTARY_MEASURES: f64 = 0.2;
    pub const HIGH_CARDINALITY_THRESHOLD: usize = 20;
    pub const PIE_MAX_CATEGORIES: usize = 8;
    pub const GROUP_MAX_CATEGORIES: usize = 10;
    pub const HEXBIN_MIN_ROWS: usize = 1000;
}
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartScore {
    pub technical_feasibility: f64,
    pub semantic_appropriateness: f64,
    pub visual_effectiveness: f64,
    pub data_utilisation: f64,
    pub complexity_match: f64,
    pub overall_score: f64,
}
impl ChartScore {
    fn calculate_overall(&mut self, weights: &ScoringWeights) {
        self.overall_score = self.technical_feasibility * weights.technical_weight
            + self.semantic_appropriateness * weights.semantic_weight
            + self.visual_effectiveness * weights.visual_weight
            + self.data_utilisation * weights.utilisation_weight
            + self.complexity_match * weights.complexity_weight;
    }
}
#[derive(Debug, Clone)]
struct ScoringWeights {
    technical_weight: f64,
    semantic_weight: f64,
    visual_weight: f64,
    utilisation_weight: f64,
    complexity_weight: f64,
}
impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            technical_weight: 0.3,
            semantic_weight: 0.25,
            visual_weight: 0.25,
            utilisation_weight: 0.1,
            complexity_weight: 0.1,
        }
    }
}
#[derive(Debug, Clone, Default)]
struct DatasetCharacteristics {
    dimensionality: usize,
    row_count: usize,
    complexity_score: f64,
    has_temporal: bool,
    numeric_count: usize,
    categorical_count: usize,
}
impl DatasetCharacteristics {
    fn from_profiles(profiles: &[&DimensionProfile], has_temporal: bool) -> Self {
        if profiles.is_empty() {
            return Self::default();
        }
        let cardinalities: Vec<f64> = profiles
            .iter()
            .filter_map(|p| p.cardinality)
            .map(|c| c as f64)
            .collect();
        let avg_cardinality = if cardinalities.is_empty() {
            0.0
        } else {
            cardinalities.iter().sum::<f64>() / cardinalities.len() as f64
        };
        let numeric_count = profiles.iter().filter(|p| p.data_type.is_numeric()).count();
        let categorical_count = profiles
            .iter()
            .filter(|p| p.data_type.is_categorical())
            .count();
        let kinds = usize::from(numeric_count > 0)
            + usize::from(categorical_count > 0)
            + usize::from(has_temporal);
        let dim_factor = (profiles.len() as f64 / 10.0).min(1.0);
        let card_factor = (avg_cardinality / 100.0).min(1.0);
        let type_diversity = kinds as f64 / 3.0;
        Self {
            dimensionality: profiles.len(),
            row_count: profiles.iter().map(|p| p.total_count).max().unwrap_or(0),
            complexity_score: (dim_factor * 0.4 + card_factor * 0.4 + type_diversity * 0.2)
                .min(1.0),
            has_temporal,
            numeric_count,
            categorical_count,
        }
    }
}
/// A chart with concrete columns bound to its arguments, in argument order.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: ChartKind,
    pub variables: Vec<String>,
    pub roles: Vec<String>,
    pub chart_score: ChartScore,
    pub binding_score: f64,
    pub complete: bool,
    pub score: f64,
}
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub min_quality_score: f64,
    pub max_suggestions_per_chart: usize,
}
impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_quality_score: 0.3,
            max_suggestions_per_chart: 10,
        }
    }
}
/// Scores every catalog chart against the profiled columns and binds columns to arguments.
pub struct ChartMatcher<'a> {
    catalog: &'a ChartCatalog,
    config: &'a MatchingConfig,
    characteristics: DatasetCharacteristics,
    weights: ScoringWeights,
    by_type: HashMap<DataType, Vec<&'a DimensionProfile>>,
    by_name: HashMap<&'a str, &'a DimensionProfile>,
}
impl<'a> ChartMatcher<'a> {
    /// `profiles` should already be restricted to bindable columns.
    pub fn new(
        profiles: &[&'a DimensionProfile],
        has_temporal: bool,
        catalog: &'a ChartCatalog,
        config: &'a MatchingConfig,
    ) -> Self {
        let characteristics = DatasetCharacteristics::from_profiles(profiles, has_temporal);
        let weights = Self::adaptive_weights(&characteristics);
        let mut sorted: Vec<&'a DimensionProfile> = profiles.to_vec();
        sorted.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
        let mut by_type: HashMap<DataType, Vec<&'a DimensionProfile>> = HashMap::new();
        let mut by_name = HashMap::new();
        for p in sorted {
            by_type.entry(p.data_type).or_default().push(p);
            by_name.insert(p.name.as_str(), p);
        }
        Self {
            catalog,
            config,
            characteristics,
            weights,
            by_type,
            by_name,
        }
    }
    fn adaptive_weights(characteristics: &DatasetCharacteristics) -> ScoringWeights {
        let mut weights = ScoringWeights::default();
        if characteristics.complexity_score > 0.7 {
            weights.technical_weight = 0.4;
            weights.semantic_weight = 0.3;
            weights.visual_weight = 0.2;
        } else if characteristics.complexity_score < 0.3 {
            weights.visual_weight = 0.4;
        }
        if characteristics.dimensionality > 10 {
            weights.utilisation_weight = 0.05;
        }
        weights
    }
    fn available_types(&self) -> Vec<DataType> {
        self.by_type.keys().cloned().collect()
    }
    pub fn find_candidates(&self) -> Vec<Candidate> {
        if self.by_name.is_empty() {
            return Vec::new();
        }
        let available = self.available_types();
        self.catalog
            .compatible_charts(&available)
            .into_par_iter()
            .flat_map_iter(|chart| {
                let chart_score = self.detailed_scores(chart);
                self.bindings(chart)
                    .into_iter()
                    .map(move |binding| self.candidate(chart, chart_score, binding))
            })
            .filter(|c| c.score >= self.config.min_quality_score)
            .collect()
    }
    fn candidate(
        &self,
        chart: &ChartNode,
        chart_score: ChartScore,
        binding: Vec<(String, &'a DimensionProfile)>,
    ) -> Candidate {
        let binding_score = self.mapping_quality(chart.kind, &binding);
        let complete = binding.len() == chart.args.len();
        let mut score = 0.5 * chart_score.overall_score + 0.5 * binding_score;
        if complete {
            score += weights::COMPLETENESS_BONUS;
        }
        let score = if score.is_finite() {
            (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
        } else {
            0.0
        };
        let (roles, variables) = binding
            .into_iter()
            .map(|(role, profile)| (role, profile.name.clone()))
            .unzip();
        Candidate {
            kind: chart.kind,
            variables,
            roles,
            chart_score,
            binding_score,
            complete,
            score,
        }
    }
    fn compatible(&self, spec: &ArgSpec) -> Vec<&'a DimensionProfile> {
        let mut compatible: Vec<&'a DimensionProfile> = spec
            .data_type
            .accepted_types()
            .into_iter()
            .flat_map(|dt| self.by_type.get(dt).into_iter().flatten().copied())
            .collect();
        compatible.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
        compatible
    }
    /// Required-argument combinations in quality order, each also offered with
    /// its best optional binding. Column sets are never repeated.
    fn bindings(&self, chart: &ChartNode) -> Vec<Vec<(String, &'a DimensionProfile)>> {
        let required: Vec<(&String, Vec<&'a DimensionProfile>)> = chart
            .required_args()
            .into_iter()
            .map(|(name, spec)| (name, self.compatible(spec)))
            .collect();
        let mut partials: Vec<Vec<(String, &'a DimensionProfile)>> = vec![Vec::new()];
        for (name, options) in &required {
            let mut next = Vec::new();
            for partial in &partials {
                for profile in options {
                    if partial.iter().any(|(_, p)| p.name == profile.name) {
                        continue;
                    }
                    let mut extended = partial.clone();
                    extended.push(((*name).clone(), *profile));
                    next.push(extended);
                }
            }
            partials = next;
        }
        let limit = self.config.max_suggestions_per_chart;
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut bindings = Vec::new();
        for partial in partials {
            if !Self::remember(&mut seen, &partial) {
                continue;
            }
            let with_optional = self.bind_optional(chart, &partial);
            bindings.push(self.in_arg_order(chart, partial));
            if let Some(full) = with_optional {
                if Self::remember(&mut seen, &full) {
                    bindings.push(self.in_arg_order(chart, full));
                }
            }
            if bindings.len() >= limit {
                break;
            }
        }
        bindings.truncate(limit);
        bindings
    }
    fn remember(seen: &mut HashSet<Vec<String>>, binding: &[(String, &DimensionProfile)]) -> bool {
        let mut key: Vec<String> = binding.iter().map(|(_, p)| p.name.clone()).collect();
        key.sort();
        seen.insert(key)
    }
    fn bind_optional(
        &self,
        chart: &ChartNode,
        partial: &[(String, &'a DimensionProfile)],
    ) -> Option<Vec<(String, &'a DimensionProfile)>> {
        let mut full = partial.to_vec();
        for (name, spec) in chart.optional_args() {
            let best = self
                .compatible(spec)
                .into_iter()
                .filter(|p| full.iter().all(|(_, used)| used.name != p.name))
                .max_by(|a, b| {
                    self.role_quality(chart.kind, name, a)
                        .total_cmp(&self.role_quality(chart.kind, name, b))
                })?;
            full.push((name.clone(), best));
        }
        (full.len() > partial.len()).then_some(full)
    }
    fn in_arg_order(
        &self,
        chart: &ChartNode,
        mut binding: Vec<(String, &'a DimensionProfile)>,
    ) -> Vec<(String, &'a DimensionProfile)> {
        binding.sort_by_key(|(role, _)| chart.args.get_index_of(role.as_str()).unwrap_or(usize::MAX));
        binding
    }
    fn role_quality(&self, kind: ChartKind, role: &str, profile: &DimensionProfile) -> f64 {
        let mut quality = profile.quality_score;
        quality += match (role, &profile.data_type) {
            ("value" | "y", DataType::Numeric) => weights::BONUS_VALUE_NUMERIC,
            ("group", DataType::Categorical)
                if profile
                    .cardinality
                    .is_some_and(|c| c <= weights::GROUP_MAX_CATEGORIES) =>
            {
                weights::BONUS_GROUP_CATEGORICAL
            }
            _ => 0.0,
        };
        if let (DataType::Categorical, Some(card)) = (&profile.data_type, profile.cardinality) {
            quality -= match role {
                "category" if kind == ChartKind::Pie && card > weights::PIE_MAX_CATEGORIES => {
                    weights::PENALTY_PIE_WEDGES
                }
                "category" if card > weights::HIGH_CARDINALITY_THRESHOLD => {
                    weights::PENALTY_CATEGORY_CARDINALITY
                }
                "group" if card > weights::GROUP_MAX_CATEGORIES => {
                    weights::PENALTY_GROUP_CARDINALITY
                }
                _ => 0.0,
            };
        }
        quality.max(0.0)
    }
    fn mapping_quality(&self, kind: ChartKind, binding: &[(String, &DimensionProfile)]) -> f64 {
        if binding.is_empty() {
            return 0.0;
        }
        let total: f64 = binding
            .iter()
            .map(|(role, profile)| self.role_quality(kind, role, profile))
            .sum();
        (total / binding.len() as f64).clamp(0.0, 1.0)
    }
    pub fn detailed_scores(&self, chart: &ChartNode) -> ChartScore {
        let mut score = ChartScore {
            technical_feasibility: self.technical_feasibility(chart),
            semantic_appropriateness: self.semantic_score(chart),
            visual_effectiveness: self.visual_effectiveness(chart),
            data_utilisation: self.data_utilisation(chart),
            complexity_match: 1.0
                - (self.characteristics.complexity_score - chart.complexity_score()).abs(),
            overall_score: 0.0,
        };
        score.calculate_overall(&self.weights);
        score
    }
    fn technical_feasibility(&self, chart: &ChartNode) -> f64 {
        let required = chart.required_args();
        if required.is_empty() {
            return 1.0;
        }
        let total: f64 = required
            .iter()
            .map(|(_, spec)| {
                let compatible = self.compatible(spec);
                if compatible.is_empty() {
                    return 0.0;
                }
                let best = compatible.iter().map(|p| p.quality_score).fold(0.0, f64::max);
                (0.6 + best * 0.3 + (compatible.len() as f64 / 5.0).min(0.1)).min(1.0)
            })
            .sum();
        (total / required.len() as f64).min(1.0)
    }
    fn semantic_score(&self, chart: &ChartNode) -> f64 {
        let c = &self.characteristics;
        let kind_bonus = match chart.kind {
            ChartKind::Scatter => self.scatter_bonus(),
            ChartKind::Hexbin => {
                let base = self.scatter_bonus() - 0.1;
                if c.row_count >= weights::HEXBIN_MIN_ROWS {
                    base + 0.3
                } else {
                    base - 0.1
                }
            }
            ChartKind::Hist => self.histogram_bonus(),
            ChartKind::Kde => self.histogram_bonus() - 0.05,
            ChartKind::Ecdf => self.histogram_bonus() - 0.1,
            ChartKind::Bar => self.bar_bonus(),
            ChartKind::Barh => self.bar_bonus() - 0.05 + self.long_labels_bonus(),
            ChartKind::Box => self.box_bonus(),
            ChartKind::Violin => {
                self.box_bonus() - 0.05 + if c.row_count >= 50 { 0.1 } else { 0.0 }
            }
            ChartKind::Pie => {
                let mut score = if c.categorical_count >= 1 { 0.3 } else { 0.0 };
                if self.has_categorical_above(weights::PIE_MAX_CATEGORIES) {
                    score -= 0.4;
                }
                score
            }
        };
        let tag_score =
            chart.calculate_semantic_score(c.has_temporal, c.numeric_count, c.categorical_count);
        ((0.5 + kind_bonus).clamp(0.0, 1.0) * 0.6 + tag_score * 0.4).clamp(0.0, 1.0)
    }
    fn scatter_bonus(&self) -> f64 {
        let c = &self.characteristics;
        let mut score = 0.1;
        if c.numeric_count >= 2 {
            score += weights::SEMANTIC_BONUS_NUMERIC_SCATTER;
        }
        if self.has_complementary_measures() {
            score += weights::SEMANTIC_BONUS_COMPLEMENTARY_MEASURES;
        }
        score
    }
    fn histogram_bonus(&self) -> f64 {
        let c = &self.characteristics;
        let mut score = 0.2;
        if c.numeric_count >= 1 {
            score += 0.3;
        }
        if c.dimensionality > 5 {
            score -= 0.1;
        }
        score
    }
    fn bar_bonus(&self) -> f64 {
        let c = &self.characteristics;
        let mut score = 0.2;
        if c.categorical_count >= 1 && c.numeric_count >= 1 {
            score += 0.3;
        }
        if self.has_ranking_potential() {
            score += 0.2;
        }
        score
    }
    fn box_bonus(&self) -> f64 {
        let c = &self.characteristics;
        let mut score = 0.1;
        if c.categorical_count >= 1 && c.numeric_count >= 1 {
            score += 0.4;
        }
        if self.has_potential_outliers() {
            score += 0.2;
        }
        score
    }
    fn long_labels_bonus(&self) -> f64 {
        if self.has_categorical_above(weights::PIE_MAX_CATEGORIES) {
            0.1
        } else {
            0.0
        }
    }
    fn visual_effectiveness(&self, chart: &ChartNode) -> f64 {
        let mut score = 0.7;
        score -= self
            .by_type
            .get(&DataType::Categorical)
            .into_iter()
            .flatten()
            .filter_map(|p| p.cardinality)
            .map(|cardinality| match chart.kind {
                ChartKind::Pie if cardinality > weights::PIE_MAX_CATEGORIES => 0.4,
                ChartKind::Bar if cardinality > weights::HIGH_CARDINALITY_THRESHOLD => 0.3,
                ChartKind::Barh if cardinality > 40 => 0.2,
                ChartKind::Box | ChartKind::Violin
                    if cardinality > weights::HIGH_CARDINALITY_THRESHOLD =>
                {
                    0.2
                }
                _ if cardinality > 100 => 0.1,
                _ => 0.0,
            })
            .fold(0.0, f64::max);
        let required_dims = chart.required_args().len();
        let available_dims = self.characteristics.dimensionality;
        if required_dims > available_dims {
            score -= 0.3;
        } else if required_dims == available_dims {
            score += 0.1;
        }
        score += match chart.kind {
            ChartKind::Scatter | ChartKind::Box | ChartKind::Violin => 0.1,
            ChartKind::Hist => 0.15,
            ChartKind::Kde | ChartKind::Ecdf => 0.05,
            _ => 0.0,
        };
        score.clamp(0.0, 1.0)
    }
    fn data_utilisation(&self, chart: &ChartNode) -> f64 {
        if self.characteristics.dimensionality == 0 {
            return 0.0;
        }
        let ratio = chart.required_args().len() as f64 / self.characteristics.dimensionality as f64;
        match ratio {
            r if r <= 0.3 => 0.5,
            r if r <= 0.7 => 1.0,
            r if r <= 1.0 => 0.8,
            _ => 0.3,
        }
    }
    fn names(&self) -> impl Iterator<Item = String> + '_ {
        self.by_name.keys().map(|name| name.to_lowercase())
    }
    fn has_ranking_potential(&self) -> bool {
        self.names()
            .any(|n| n.contains("rank") || n.contains("score") || n.contains("rating"))
    }
    fn has_potential_outliers(&self) -> bool {
        self.by_name.values().any(|p| {
            p.numeric_stats
                .as_ref()
                .is_some_and(|s| s.outlier_count > 0)
        })
    }
    fn has_categorical_above(&self, limit: usize) -> bool {
        self.by_type
            .get(&DataType::Categorical)
            .into_iter()
            .flatten()
            .any(|p| p.cardinality.is_some_and(|c| c > limit))
    }
    fn has_complementary_measures(&self) -> bool {
        const PAIRS: [(&str, &str); 11] = [
            ("revenue", "cost"),
            ("income", "expense"),
            ("profit", "loss"),
            ("sales", "returns"),
            ("actual", "budget"),
            ("actual", "forecast"),
            ("price", "quantity"),
            ("width", "height"),
            ("latitude", "longitude"),
            ("start", "end"),
            ("before", "after"),
        ];
        let names: Vec<String> = self
            .by_type
            .get(&DataType::Numeric)
            .into_iter()
            .flatten()
            .map(|p| p.name.to_lowercase())
            .collect();
        names.iter().enumerate().any(|(i, n1)| {
            names[i + 1..].iter().any(|n2| {
                PAIRS.iter().any(|(w1, w2)| {
                    (n1.contains(w1) && n2.contains(w2)) || (n1.contains(w2) && n2.contains(w1))
                })
            })
        })
    }
}
/// One-sentence reason shown next to a heuristic suggestion.
pub fn describe_candidate(kind: ChartKind, variables: &[String]) -> String {
    let first = variables.first().map_or("", String::as_str);
    let second = variables.get(1).map_or("", String::as_str);
    match (kind, variables.len()) {
        (ChartKind::Scatter, _) => format!("Shows how {second} varies with {first}."),
        (ChartKind::Hexbin, _) => {
            format!("Shows where {first} and {second} observations concentrate.")
        }
        (ChartKind::Bar | ChartKind::Barh, 1) => {
            format!("Compares how often each {first} value occurs.")
        }
        (ChartKind::Bar | ChartKind::Barh, _) => {
            format!("Compares the average {first} across {second} groups.")
        }
        (ChartKind::Hist, _) => format!("Shows the distribution of {first} in fixed-width bins."),
        (ChartKind::Kde, _) => format!("Shows the smoothed density of {first}."),
        (ChartKind::Ecdf, _) => format!("Shows the share of {first} values at or below each level."),
        (ChartKind::Box, 1) => format!("Summarises the spread and outliers of {first}."),
        (ChartKind::Box, _) => format!("Compares the spread of {first} across {second} groups."),
        (ChartKind::Violin, 1) => format!("Shows the shape of the {first} distribution."),
        (ChartKind::Violin, _) => {
            format!("Compares the shape of {first} across {second} groups.")
        }
        (ChartKind::Pie, _) => format!("Shows each {first} category's share of the total."),
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_profiler::{DataProfiler, NumericStats};
    use polars::prelude::*;

    fn profiles(df: &DataFrame) -> Vec<DimensionProfile> {
        DataProfiler::new().profile_dataframe(df).unwrap()
    }

    fn sales() -> DataFrame {
        df! {
            "revenue" => [120.0, 95.5, 143.2, 88.0, 101.3, 130.9, 99.9, 150.1],
            "cost" => [80.0, 70.2, 90.1, 65.0, 75.5, 85.0, 72.3, 99.0],
            "region" => ["north", "south", "east", "west", "north", "south", "east", "west"],
        }
        .unwrap()
    }

    fn candidates(df: &DataFrame, config: &MatchingConfig) -> Vec<Candidate> {
        let profiles = profiles(df);
        let refs: Vec<&DimensionProfile> = profiles.iter().collect();
        let catalog = ChartCatalog::builtin().unwrap();
        ChartMatcher::new(&refs, false, &catalog, config).find_candidates()
    }

    #[test]
    fn test_bindings_follow_argument_order() {
        let found = candidates(&sales(), &MatchingConfig::default());
        let grouped_bar = found
            .iter()
            .find(|c| c.kind == ChartKind::Bar && c.variables.len() == 2)
            .unwrap();
        assert_eq!(grouped_bar.roles, vec!["value", "category"]);
        assert_eq!(grouped_bar.variables[1], "region");
        assert!(grouped_bar.complete);
        let pie = found.iter().find(|c| c.kind == ChartKind::Pie).unwrap();
        assert_eq!(pie.variables, vec!["region"]);
    }

    #[test]
    fn test_scatter_pairs_are_not_repeated() {
        let found = candidates(&sales(), &MatchingConfig::default());
        let scatter: Vec<_> = found
            .iter()
            .filter(|c| c.kind == ChartKind::Scatter)
            .collect();
        assert_eq!(scatter.len(), 1);
        let mut vars = scatter[0].variables.clone();
        vars.sort();
        assert_eq!(vars, vec!["cost", "revenue"]);
    }

    #[test]
    fn test_scores_are_rounded_and_bounded() {
        for candidate in candidates(&sales(), &MatchingConfig::default()) {
            assert!((0.0..=1.0).contains(&candidate.score));
            let scaled = candidate.score * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_per_chart_cap() {
        let df = df! {
            "a" => [1.0, 2.0, 3.0, 4.5],
            "b" => [2.0, 1.0, 4.0, 3.5],
            "c" => [9.0, 7.0, 8.0, 6.5],
            "d" => [0.1, 0.4, 0.2, 0.3],
        }
        .unwrap();
        let config = MatchingConfig {
            min_quality_score: 0.0,
            max_suggestions_per_chart: 2,
        };
        let found = candidates(&df, &config);
        assert_eq!(
            found.iter().filter(|c| c.kind == ChartKind::Scatter).count(),
            2
        );
    }

    #[test]
    fn test_crowded_pie_is_penalised() {
        let categories: Vec<String> = (0..30).map(|i| format!("c{}", i % 15)).collect();
        let values: Vec<f64> = (0..30).map(f64::from).collect();
        let df = df! { "kind" => categories, "amount" => values }.unwrap();
        let config = MatchingConfig {
            min_quality_score: 0.0,
            ..Default::default()
        };
        let found = candidates(&df, &config);
        let pie = found.iter().find(|c| c.kind == ChartKind::Pie).unwrap();
        let hist = found.iter().find(|c| c.kind == ChartKind::Hist).unwrap();
        assert!(pie.score < hist.score);
    }

    #[test]
    fn test_outliers_raise_box_semantics() {
        let mut with_outliers: Vec<DimensionProfile> = profiles(&sales());
        let catalog = ChartCatalog::builtin().unwrap();
        let config = MatchingConfig::default();
        let baseline = {
            let refs: Vec<&DimensionProfile> = with_outliers.iter().collect();
            let matcher = ChartMatcher::new(&refs, false, &catalog, &config);
            matcher
                .detailed_scores(catalog.get(ChartKind::Box).unwrap())
                .semantic_appropriateness
        };
        for p in &mut with_outliers {
            if p.data_type.is_numeric() {
                p.numeric_stats = Some(NumericStats {
                    outlier_count: 3,
                    ..p.numeric_stats.clone().unwrap_or_default()
                });
            }
        }
        let refs: Vec<&DimensionProfile> = with_outliers.iter().collect();
        let matcher = ChartMatcher::new(&refs, false, &catalog, &config);
        let boosted = matcher
            .detailed_scores(catalog.get(ChartKind::Box).unwrap())
            .semantic_appropriateness;
        assert!(boosted >= baseline);
    }

    #[test]
    fn test_rationale_mentions_columns() {
        let text = describe_candidate(
            ChartKind::Bar,
            &["revenue".to_string(), "region".to_string()],
        );
        assert!(text.contains("revenue") && text.contains("region"));
    }
}
