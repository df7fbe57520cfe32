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

use super::parser::ParsedSuggestion;
use super::{dedupe_key, rank, Suggestion};
use crate::catalog::ChartKind;
use indexmap::IndexMap;
use llm_contracts::{default_ensemble_weight, ModelRoute};
use std::collections::{HashMap, HashSet};

struct Tally {
    variables: Vec<String>,
    raw: f64,
    rationale: String,
    rationale_weight: f64,
    sources: Vec<String>,
}

/// Weighted vote across model replies.
#[derive(Debug, Clone)]
pub struct EnsembleScorer {
    weights: Vec<(ModelRoute, f64)>,
}

impl EnsembleScorer {
    /// Overrides are looked up by `provider:model` label first, then bare model name.
    pub fn new(routes: &[ModelRoute], overrides: &HashMap<String, f64>) -> Self {
        let weights = routes
            .iter()
            .map(|route| {
                let weight = overrides
                    .get(&route.label())
                    .or_else(|| overrides.get(&route.model))
                    .copied()
                    .unwrap_or_else(|| default_ensemble_weight(route));
                (route.clone(), weight)
            })
            .collect();
        Self { weights }
    }

    pub fn weight(&self, route: &ModelRoute) -> f64 {
        self.weights
            .iter()
            .find(|(r, _)| r == route)
            .map_or(0.0, |(_, w)| *w)
    }

    /// The highest weighted route among `candidates`; earlier entries win ties.
    pub fn best<'a>(&self, candidates: &'a [ModelRoute]) -> Option<&'a ModelRoute> {
        candidates.iter().fold(None, |best, route| match best {
            Some(b) if self.weight(b) >= self.weight(route) => Some(b),
            _ => Some(route),
        })
    }

    pub fn combine(&self, replies: &[(ModelRoute, Vec<ParsedSuggestion>)]) -> Vec<Suggestion> {
        let total: f64 = replies
            .iter()
            .map(|(route, _)| self.weight(route))
            .filter(|w| *w > 0.0)
            .sum();
        if total <= 0.0 {
            return Vec::new();
        }
        let mut tallies: IndexMap<(ChartKind, Vec<String>), Tally> = IndexMap::new();
        for (route, parsed) in replies {
            let weight = self.weight(route);
            if weight <= 0.0 {
                continue;
            }
            let label = route.label();
            let mut seen = HashSet::new();
            for suggestion in parsed {
                let key = dedupe_key(suggestion.chart_type, &suggestion.variables);
                if !seen.insert(key.clone()) {
                    continue;
                }
                let tally = tallies.entry(key).or_insert_with(|| Tally {
                    variables: suggestion.variables.clone(),
                    raw: 0.0,
                    rationale: String::new(),
                    rationale_weight: f64::NEG_INFINITY,
                    sources: Vec::new(),
                });
                tally.raw += weight;
                tally.sources.push(label.clone());
                if !suggestion.rationale.is_empty() && weight > tally.rationale_weight {
                    tally.rationale.clone_from(&suggestion.rationale);
                    tally.rationale_weight = weight;
                }
            }
        }
        let mut suggestions: Vec<Suggestion> = tallies
            .into_iter()
            .map(|((kind, _), tally)| Suggestion {
                chart_type: kind,
                variables: tally.variables,
                score: ((tally.raw / total) * 100.0).round() / 100.0,
                rationale: tally.rationale,
                source_models: tally.sources,
            })
            .collect();
        rank(&mut suggestions);
        suggestions
    }

    /// Suggestions from a follow-up reply count as one vote from `route`,
    /// normalised against the weight of every model that took part.
    pub fn supplement(
        &self,
        route: &ModelRoute,
        participants: &[ModelRoute],
        parsed: &[ParsedSuggestion],
    ) -> Vec<Suggestion> {
        let total: f64 = participants
            .iter()
            .map(|r| self.weight(r))
            .filter(|w| *w > 0.0)
            .sum();
        let weight = self.weight(route);
        let score = if total > 0.0 && weight > 0.0 {
            ((weight / total) * 100.0).round() / 100.0
        } else {
            0.0
        };
        let mut seen = HashSet::new();
        parsed
            .iter()
            .filter(|s| seen.insert(dedupe_key(s.chart_type, &s.variables)))
            .map(|s| Suggestion {
                chart_type: s.chart_type,
                variables: s.variables.clone(),
                score,
                rationale: s.rationale.clone(),
                source_models: vec![route.label()],
            })
            .collect()
    }
}
