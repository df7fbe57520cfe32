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
use crate::dataset::{is_numeric_dtype, is_temporal_dtype};
use crate::error::DataError;
use crate::plotgen::aggregate;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use polars::prelude::{DataFrame, DataType as DType, Series};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Distinct values kept per column for prompts.
    pub max_sample_values: usize,
    /// Share of values that must parse before a string column is reclassified.
    pub type_confidence_threshold: f64,
    pub max_categorical_cardinality: usize,
    pub categorical_ratio_threshold: f64,
    /// All-distinct string columns longer than this are treated as identifiers.
    pub identifier_min_rows: usize,
    pub high_null_ratio: f64,
    pub temporal_formats: Vec<String>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            max_sample_values: 10,
            type_confidence_threshold: 0.8,
            max_categorical_cardinality: 50,
            categorical_ratio_threshold: 0.05,
            identifier_min_rows: 20,
            high_null_ratio: 0.3,
            temporal_formats: [
                "%Y-%m-%d",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%d %H:%M:%S%.f",
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%dT%H:%M:%SZ",
                "%m/%d/%Y",
                "%d/%m/%Y",
                "%Y%m%d",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

/// What the recommender knows about one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionProfile {
    pub name: String,
    pub data_type: DataType,
    /// Distinct non-null values.
    pub cardinality: Option<usize>,
    pub total_count: usize,
    pub null_count: usize,
    pub null_percentage: f64,
    pub sample_values: Vec<String>,
    pub numeric_stats: Option<NumericStats>,
    pub temporal_stats: Option<TemporalStats>,
    pub quality_score: f64,
    pub type_confidence: f64,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumericStats {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q25: Option<f64>,
    pub q75: Option<f64>,
    /// Median absolute deviation.
    pub mad: Option<f64>,
    /// Points outside the 1.5 IQR fences.
    pub outlier_count: usize,
}

impl NumericStats {
    fn from_values(values: &[f64]) -> Self {
        let Some(quartiles) = aggregate::box_stats(values) else {
            return Self::default();
        };
        let (min, max) = aggregate::min_max(values).unzip();
        let deviations =
            aggregate::sorted_copy(&values.iter().map(|v| (v - quartiles.median).abs()).collect::<Vec<_>>());
        Self {
            mean: Some(values.iter().sum::<f64>() / values.len() as f64),
            median: Some(quartiles.median),
            std: aggregate::sample_std(values),
            min,
            max,
            q25: Some(quartiles.q1),
            q75: Some(quartiles.q3),
            mad: aggregate::quantile_sorted(&deviations, 0.5),
            outlier_count: quartiles.outliers.len(),
        }
    }

    fn is_constant(&self) -> bool {
        matches!((self.min, self.max), (Some(lo), Some(hi)) if hi - lo < 1e-9)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalStats {
    /// RFC 3339.
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    pub date_range_days: Option<i64>,
    /// `daily`, `weekly`, `monthly` and so on, from the most common gap.
    pub inferred_frequency: Option<String>,
    pub has_time_component: bool,
    pub unique_count: usize,
}

impl TemporalStats {
    fn from_instants(instants: &BTreeSet<DateTime<Utc>>, has_time_component: bool) -> Self {
        let (first, last) = match (instants.first(), instants.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Self::default(),
        };
        Self {
            min_date: Some(first.to_rfc3339()),
            max_date: Some(last.to_rfc3339()),
            date_range_days: Some(last.signed_duration_since(first).num_days()),
            inferred_frequency: frequency(instants),
            has_time_component,
            unique_count: instants.len(),
        }
    }
}

fn frequency(instants: &BTreeSet<DateTime<Utc>>) -> Option<String> {
    let (typical, _) = instants
        .iter()
        .tuple_windows()
        .map(|(a, b)| b.signed_duration_since(*a).num_seconds())
        .counts()
        .into_iter()
        .max_by_key(|&(gap, seen)| (seen, gap))?;
    let label = match typical {
        g if g >= 365 * 86_400 => "yearly",
        g if g >= 28 * 86_400 => "monthly",
        g if g >= 7 * 86_400 => "weekly",
        g if g >= 86_400 => "daily",
        g if g >= 3_600 => "hourly",
        g if g >= 60 => "minutely",
        _ => "irregular",
    };
    Some(label.to_string())
}

/// Column-type counts and an overall readiness figure for charting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_dimensions: usize,
    pub numeric_count: usize,
    pub categorical_count: usize,
    pub temporal_count: usize,
    pub text_count: usize,
    pub avg_quality_score: f64,
    pub total_issues: usize,
    pub chart_readiness_score: f64,
}

impl DatasetSummary {
    pub fn from_profiles(profiles: &[DimensionProfile]) -> Self {
        let count = |kind: DataType| profiles.iter().filter(|p| p.data_type == kind).count();
        let total = profiles.len();
        let avg_quality_score = if total == 0 {
            0.0
        } else {
            profiles.iter().map(|p| p.quality_score).sum::<f64>() / total as f64
        };
        let variety = [DataType::Numeric, DataType::Categorical, DataType::Temporal]
            .into_iter()
            .filter(|kind| count(*kind) > 0)
            .count() as f64
            / 3.0;
        let width_fit = match total {
            0 => 0.0,
            1 => 0.3,
            2..=8 => 1.0,
            9..=15 => 0.8,
            _ => 0.6,
        };
        Self {
            total_dimensions: total,
            numeric_count: count(DataType::Numeric),
            categorical_count: count(DataType::Categorical),
            temporal_count: count(DataType::Temporal),
            text_count: count(DataType::Text),
            avg_quality_score,
            total_issues: profiles.iter().map(|p| p.issues.len()).sum(),
            chart_readiness_score: (0.5 * avg_quality_score + 0.3 * variety + 0.2 * width_fit)
                .min(1.0),
        }
    }

    pub const fn usable_count(&self) -> usize {
        self.numeric_count + self.categorical_count
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} columns ({} numeric, {} categorical, {} temporal, {} text), readiness {:.2}",
            self.total_dimensions,
            self.numeric_count,
            self.categorical_count,
            self.temporal_count,
            self.text_count,
            self.chart_readiness_score
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataProfiler {
    config: ProfilingConfig,
}

impl DataProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_config(config: ProfilingConfig) -> Self {
        Self { config }
    }

    /// One profile per column, in frame order. Columns are profiled in parallel.
    pub fn profile_dataframe(&self, df: &DataFrame) -> Result<Vec<DimensionProfile>, DataError> {
        df.get_columns()
            .par_iter()
            .map(|column| self.profile_series(column.as_materialized_series(), df.height()))
            .collect()
    }

    fn profile_series(&self, series: &Series, total_count: usize) -> Result<DimensionProfile, DataError> {
        let null_count = series.null_count();
        let present = series.drop_nulls();
        let cardinality = present.n_unique()?;
        let strings = present.cast(&DType::String)?;
        let texts: Vec<&str> = strings.str()?.into_iter().flatten().collect();
        let (data_type, type_confidence) = self.classify(&present, &texts, cardinality)?;

        let numeric_stats = match data_type {
            DataType::Numeric => {
                let floats = present.cast(&DType::Float64)?;
                let values: Vec<f64> = floats.f64()?.into_iter().flatten().filter(|v| v.is_finite()).collect();
                Some(NumericStats::from_values(&values))
            }
            _ => None,
        };
        let temporal_stats = match data_type {
            DataType::Temporal => Some(self.temporal_stats(&texts)),
            _ => None,
        };
        let sample_values = present
            .unique_stable()?
            .head(Some(self.config.max_sample_values))
            .cast(&DType::String)?
            .str()?
            .into_iter()
            .flatten()
            .map(String::from)
            .collect();

        let mut profile = DimensionProfile {
            name: series.name().to_string(),
            data_type,
            cardinality: Some(cardinality),
            total_count,
            null_count,
            null_percentage: if total_count == 0 {
                0.0
            } else {
                null_count as f64 / total_count as f64
            },
            sample_values,
            numeric_stats,
            temporal_stats,
            quality_score: 0.0,
            type_confidence,
            issues: Vec::new(),
        };
        profile.issues = self.issues(&profile);
        profile.quality_score = self.quality(&profile);
        Ok(profile)
    }

    /// Native dtypes win; string columns are tried as numbers, then dates.
    fn classify(&self, present: &Series, texts: &[&str], cardinality: usize) -> Result<(DataType, f64), DataError> {
        if present.is_empty() {
            return Ok((DataType::Text, 0.0));
        }
        let dtype = present.dtype();
        if is_numeric_dtype(dtype) {
            return Ok((DataType::Numeric, 1.0));
        }
        if is_temporal_dtype(dtype) {
            return Ok((DataType::Temporal, 1.0));
        }
        if matches!(dtype, DType::Boolean) {
            return Ok((DataType::Categorical, 1.0));
        }
        let threshold = self.config.type_confidence_threshold;
        let parsed = present.cast(&DType::Float64)?;
        let numeric_share = (parsed.len() - parsed.null_count()) as f64 / present.len() as f64;
        if numeric_share >= threshold {
            return Ok(if cardinality == 1 {
                (DataType::Categorical, 0.9)
            } else {
                (DataType::Numeric, numeric_share)
            });
        }
        let temporal_share = self
            .config
            .temporal_formats
            .iter()
            .map(|format| {
                texts.iter().filter(|v| parse_instant(v, format).is_some()).count() as f64
                    / texts.len().max(1) as f64
            })
            .fold(0.0, f64::max);
        if temporal_share >= threshold {
            return Ok((DataType::Temporal, temporal_share));
        }
        let rows = present.len();
        if cardinality == rows && rows > self.config.identifier_min_rows {
            return Ok((DataType::Text, 0.9));
        }
        let ratio = cardinality as f64 / rows as f64;
        Ok(
            if cardinality <= self.config.max_categorical_cardinality
                || ratio < self.config.categorical_ratio_threshold
            {
                (DataType::Categorical, 0.8)
            } else {
                (DataType::Text, 0.7)
            },
        )
    }

    fn temporal_stats(&self, texts: &[&str]) -> TemporalStats {
        let mut instants = BTreeSet::new();
        let mut has_time = false;
        for text in texts {
            if let Some((instant, timed)) = self
                .config
                .temporal_formats
                .iter()
                .find_map(|format| parse_instant(text, format).map(|dt| (dt, format.contains("%H"))))
            {
                has_time |= timed;
                instants.insert(instant);
            }
        }
        TemporalStats::from_instants(&instants, has_time)
    }

    fn issues(&self, profile: &DimensionProfile) -> Vec<String> {
        let mut issues = Vec::new();
        if profile.null_percentage > self.config.high_null_ratio {
            issues.push(format!("{:.1}% missing", profile.null_percentage * 100.0));
        }
        let many_rows = profile.total_count > 1;
        let cardinality = profile.cardinality.unwrap_or(0);
        match profile.data_type {
            DataType::Numeric => {
                if let Some(stats) = &profile.numeric_stats {
                    if many_rows && stats.is_constant() {
                        issues.push("constant values".to_string());
                    }
                    if stats.outlier_count > profile.total_count / 10 {
                        issues.push(format!("{} outliers", stats.outlier_count));
                    }
                }
                if profile.total_count > 100 && cardinality < 10 {
                    issues.push(format!("only {cardinality} distinct values, may be categorical"));
                }
            }
            DataType::Categorical if cardinality > self.config.max_categorical_cardinality => {
                issues.push(format!("{cardinality} categories"));
            }
            DataType::Categorical | DataType::Temporal if many_rows && cardinality == 1 => {
                issues.push("single distinct value".to_string());
            }
            DataType::Text => issues.push("free text or identifier".to_string()),
            DataType::Categorical | DataType::Temporal => {}
        }
        issues
    }

    /// 1.0 for a complete, confidently typed, well-behaved column.
    fn quality(&self, profile: &DimensionProfile) -> f64 {
        let present = profile.total_count.saturating_sub(profile.null_count).max(1) as f64;
        let outlier_share = profile
            .numeric_stats
            .as_ref()
            .filter(|stats| !stats.is_constant())
            .map_or(0.0, |stats| stats.outlier_count as f64 / present);
        let crowded = profile.data_type == DataType::Categorical
            && profile.cardinality.unwrap_or(0) > self.config.max_categorical_cardinality;
        let score = 1.0
            - 0.3 * profile.null_percentage
            - 0.2 * (1.0 - profile.type_confidence)
            - 0.15 * outlier_share.min(1.0)
            - if crowded { 0.1 } else { 0.0 }
            - 0.05 * profile.issues.len() as f64;
        score.clamp(0.0, 1.0)
    }
}

fn parse_instant(value: &str, format: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, format)
        .map(|dt| dt.and_utc())
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

impl DimensionProfile {
    /// Numeric or categorical with at least one observed value.
    pub fn is_usable(&self) -> bool {
        matches!(self.data_type, DataType::Numeric | DataType::Categorical)
            && self.null_count < self.total_count
    }
}

impl fmt::Display for DimensionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, quality {:.2})", self.name, self.data_type.as_str(), self.quality_score)
    }
}
