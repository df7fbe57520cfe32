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

use crate::catalog::DataType;
use crate::data_profiler::DimensionProfile;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::plotgen::aggregate::pearson;
use std::fmt::Write as _;

const SAMPLE_SIZE: usize = 3;
const MAX_GROUPING_CARDINALITY: usize = 20;

/// Plain-text dataset digest used as the body of recommendation prompts.
pub fn describe_dataset(dataset: &Dataset, profiles: &[DimensionProfile]) -> Result<String> {
    let mut out = String::new();
    let names = dataset.column_names();
    let _ = writeln!(out, "DataFrame Shape: ({}, {})", dataset.height(), dataset.width());
    let _ = writeln!(out, "Columns ({}): {}", names.len(), names.join(", "));
    let _ = writeln!(out, "\nColumn Details:");
    for profile in profiles {
        let unique = profile.cardinality.unwrap_or(0);
        let samples: Vec<&str> = profile
            .sample_values
            .iter()
            .take(SAMPLE_SIZE)
            .map(String::as_str)
            .collect();
        let _ = writeln!(
            out,
            "- {}: {} ({unique} unique values), sample: [{}]",
            profile.name,
            profile.data_type.as_str(),
            samples.join(", ")
        );
        match (&profile.numeric_stats, &profile.temporal_stats) {
            (Some(stats), _) => {
                let _ = writeln!(
                    out,
                    "  Stats: min={}, max={}, mean={}, missing={}",
                    fmt_opt(stats.min),
                    fmt_opt(stats.max),
                    stats.mean.map_or_else(|| "n/a".to_string(), |m| format!("{m:.2}")),
                    profile.null_count
                );
            }
            (None, Some(temporal)) => {
                let _ = writeln!(
                    out,
                    "  Range: {} to {}, missing={}",
                    temporal.min_date.as_deref().unwrap_or("n/a"),
                    temporal.max_date.as_deref().unwrap_or("n/a"),
                    profile.null_count
                );
            }
            (None, None) => {}
        }
    }

    let numeric: Vec<&str> = profiles
        .iter()
        .filter(|p| p.data_type.is_numeric() && dataset.is_numeric(&p.name))
        .map(|p| p.name.as_str())
        .collect();
    if numeric.len() >= 2 {
        let columns = numeric
            .iter()
            .map(|name| dataset.numeric_column(name))
            .collect::<Result<Vec<_>>>()?;
        let _ = writeln!(out, "\nNumerical Variable Correlations (Pearson):");
        let _ = writeln!(out, "  {}", numeric.join(", "));
        for (i, name) in numeric.iter().enumerate() {
            let row: Vec<String> = columns
                .iter()
                .map(|other| {
                    pearson(&columns[i], other).map_or_else(|| "nan".to_string(), |r| format!("{r:.2}"))
                })
                .collect();
            let _ = writeln!(out, "  {name}: {}", row.join(", "));
        }
    }

    let groupers: Vec<&str> = profiles
        .iter()
        .filter(|p| {
            p.data_type == DataType::Categorical
                && p.cardinality.is_some_and(|c| c > 1 && c <= MAX_GROUPING_CARDINALITY)
        })
        .map(|p| p.name.as_str())
        .collect();
    if !groupers.is_empty() && !numeric.is_empty() {
        let _ = writeln!(out, "\nPotential Groupings (categorical vs numerical):");
        let _ = writeln!(out, "  - Could group by: [{}]", groupers.join(", "));
        let _ = writeln!(out, "  - To analyze: [{}]", numeric.join(", "));
    }
    Ok(out)
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{v:.0}"),
        Some(v) => format!("{v:.2}"),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_profiler::DataProfiler;
    use polars::prelude::*;

    #[test]
    fn test_description_sections() {
        let df = df! {
            "height" => [150.0, 160.0, 170.0, 180.0, 190.0, 175.0],
            "weight" => [50.0, 60.0, 70.0, 80.0, 90.0, 72.0],
            "team" => ["red", "blue", "red", "blue", "red", "blue"],
        }
        .unwrap();
        let profiles = DataProfiler::new().profile_dataframe(&df).unwrap();
        let ds = Dataset::new(df).unwrap();
        let text = describe_dataset(&ds, &profiles).unwrap();
        assert!(text.starts_with("DataFrame Shape: (6, 3)"));
        assert!(text.contains("Columns (3): height, weight, team"));
        assert!(text.contains("- height: numerical (6 unique values)"));
        assert!(text.contains("Stats: min=150, max=190, mean=170.83, missing=0"));
        assert!(text.contains("Numerical Variable Correlations (Pearson):"));
        assert!(text.contains("  height: 1.00, "));
        assert!(text.contains("  - Could group by: [team]"));
    }
}
