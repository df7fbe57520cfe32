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

use crate::catalog::ChartKind;
use crate::dataset::Dataset;
use crate::plotgen::PlotRegistry;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// One block of a model reply that survived parsing and validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSuggestion {
    pub chart_type: ChartKind,
    pub variables: Vec<String>,
    pub rationale: String,
}

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:[-*]|\d+[.)])?\s*\**\s*(plot\s*type|variables|rationale)\s*\**\s*:\s*\**\s*(.*?)\s*$")
        .expect("field pattern compiles")
});

/// `Plot Type: x`, `1. **Plot Type:** x` and similar, keyed without spaces.
fn field(line: &str) -> Option<(String, &str)> {
    let caps = FIELD_RE.captures(line)?;
    let key: String = caps
        .get(1)?
        .as_str()
        .split_whitespace()
        .collect::<String>()
        .to_ascii_lowercase();
    Some((key, caps.get(2)?.as_str()))
}

fn clean_name(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '*' | '[' | ']'))
        .trim()
}

/// Temporal columns first, then numeric, then everything else; stable within each group.
pub fn order_variables(variables: &mut [String], dataset: &Dataset) {
    variables.sort_by_key(|name| {
        if dataset.is_temporal(name) {
            0
        } else if dataset.is_numeric(name) {
            1
        } else {
            2
        }
    });
}

/// Splits a reply on `---`, keeps blocks with a supported plot type and at
/// least one known column, and drops bindings the plot requirements reject.
pub fn parse_response(text: &str, dataset: &Dataset, registry: &PlotRegistry) -> Vec<ParsedSuggestion> {
    let mut parsed = Vec::new();
    for block in text.split("---") {
        let mut plot_type = None;
        let mut variables: Vec<String> = Vec::new();
        let mut rationale = String::new();
        for (key, value) in block.lines().filter_map(field) {
            match key.as_str() {
                "plottype" => plot_type = Some(clean_name(value).to_string()),
                "variables" => {
                    for name in value.split(',').map(clean_name) {
                        if dataset.has_column(name) && !variables.iter().any(|v| v == name) {
                            variables.push(name.to_string());
                        }
                    }
                }
                _ => rationale = value.to_string(),
            }
        }
        let Some(plot_type) = plot_type else { continue };
        if variables.is_empty() {
            continue;
        }
        let kind: ChartKind = match plot_type.parse() {
            Ok(kind) => kind,
            Err(e) => {
                debug!(error = %e, "Dropping unsupported plot type");
                continue;
            }
        };
        let Ok(requirements) = registry.requirements(kind) else {
            continue;
        };
        order_variables(&mut variables, dataset);
        variables.truncate(requirements.max_variables);
        if let Err(e) = requirements.check(kind, &variables, dataset) {
            debug!(chart = %kind, error = %e, "Dropping invalid suggestion");
            continue;
        }
        parsed.push(ParsedSuggestion {
            chart_type: kind,
            variables,
            rationale,
        });
    }
    parsed
}
