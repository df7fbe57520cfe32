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

use super::Suggestion;

/// Models are always asked for at least this many ideas.
pub const MIN_REQUESTED: usize = 5;

const PLOT_TYPE_RULES: &str = "\
Supported plot types and their variable requirements:
- scatter: 2 numerical variables (x, y), optionally a 3rd variable for colour and a 4th numerical variable for point size. Correct: `Variables: height, weight` or `Variables: height, weight, team`. Incorrect: `Variables: team, weight`
- hexbin: exactly 2 numerical variables, preferred for large datasets. Correct: `Variables: longitude, latitude`
- hist: exactly 1 numerical variable. Correct: `Variables: age`. Incorrect: `Variables: age, income`
- kde: exactly 1 numerical variable. Correct: `Variables: income`
- ecdf: exactly 1 numerical variable. Correct: `Variables: response_time`
- box: 1 numerical variable, optionally followed by 1 categorical grouping variable. Correct: `Variables: salary, department`. Incorrect: `Variables: department, salary`
- violin: 1 numerical variable, optionally followed by 1 categorical grouping variable. Correct: `Variables: score, class`
- bar: 1 categorical variable (counts), or 1 numerical then 1 categorical variable (means). Correct: `Variables: revenue, region`. Incorrect: `Variables: region, revenue`
- barh: same as bar, drawn horizontally. Correct: `Variables: country`
- pie: exactly 1 categorical variable with few categories. Correct: `Variables: segment`. Incorrect: `Variables: segment, revenue`";

const FORMAT_RULES: &str = "\
Respond with one block per visualization, in exactly this format:

Plot Type: <one of the supported plot types>
Variables: <comma-separated column names, NUMERICAL VARIABLES FIRST>
Rationale: <1-2 sentences on what the plot reveals>
---

Use column names exactly as listed. Do not add any other text.";

pub fn recommendation_prompt(description: &str, count: usize) -> String {
    let count = count.max(MIN_REQUESTED);
    format!(
        "You are a data visualization expert analyzing this dataset:\n\n{description}\n\n\
         Recommend {count} insightful visualizations that reveal distributions, relationships \
         and comparisons in this data.\n\n{PLOT_TYPE_RULES}\n\n{FORMAT_RULES}"
    )
}

pub fn supplement_prompt(description: &str, existing: &[Suggestion], needed: usize) -> String {
    let listed: Vec<String> = existing
        .iter()
        .map(|s| format!("- {}: {}", s.chart_type, s.variables.join(", ")))
        .collect();
    format!(
        "You already recommended these visualizations:\n{}\n\n\
         Please recommend {needed} ADDITIONAL different visualizations for:\n{description}\n\n\
         Use the same format but ensure they're distinct from the above.\n\n{PLOT_TYPE_RULES}\n\n{FORMAT_RULES}",
        listed.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChartKind;

    #[test]
    fn test_prompt_asks_for_at_least_five() {
        let prompt = recommendation_prompt("DataFrame Shape: (3, 2)", 2);
        assert!(prompt.contains("Recommend 5 insightful visualizations"));
        assert!(prompt.contains("Plot Type: <"));
        assert!(prompt.contains("DataFrame Shape: (3, 2)"));
        assert!(recommendation_prompt("x", 8).contains("Recommend 8 "));
    }

    #[test]
    fn test_supplement_lists_existing() {
        let existing = vec![Suggestion::new(
            ChartKind::Scatter,
            vec!["a".into(), "b".into()],
            0.9,
        )];
        let prompt = supplement_prompt("desc", &existing, 2);
        assert!(prompt.starts_with("You already recommended these visualizations:\n- scatter: a, b"));
        assert!(prompt.contains("Please recommend 2 ADDITIONAL different visualizations"));
    }
}
