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

use crate::error::{ConfigError, ValidationError, VistaError};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
const BUILTIN_CATALOG: &str = include_str!("../config/charts.yml");
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum DataType {
    Numeric,
    Categorical,
    Temporal,
    Text,
}
impl DataType {
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric)
    }
    pub const fn is_categorical(&self) -> bool {
        matches!(self, Self::Categorical)
    }
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Temporal)
    }
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numerical",
            Self::Categorical => "categorical",
            Self::Temporal => "datetime",
            Self::Text => "text",
        }
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Scatter,
    Bar,
    Barh,
    Hist,
    Box,
    Violin,
    Pie,
    Hexbin,
    Kde,
    Ecdf,
}
impl ChartKind {
    pub const ALL: [Self; 10] = [
        Self::Scatter,
        Self::Bar,
        Self::Barh,
        Self::Hist,
        Self::Box,
        Self::Violin,
        Self::Pie,
        Self::Hexbin,
        Self::Kde,
        Self::Ecdf,
    ];
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scatter => "scatter",
            Self::Bar => "bar",
            Self::Barh => "barh",
            Self::Hist => "hist",
            Self::Box => "box",
            Self::Violin => "violin",
            Self::Pie => "pie",
            Self::Hexbin => "hexbin",
            Self::Kde => "kde",
            Self::Ecdf => "ecdf",
        }
    }
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Scatter => "scatter plot",
            Self::Bar => "bar chart",
            Self::Barh => "horizontal bar chart",
            Self::Hist => "histogram",
            Self::Box => "box plot",
            Self::Violin => "violin plot",
            Self::Pie => "pie chart",
            Self::Hexbin => "hexbin plot",
            Self::Kde => "density plot",
            Self::Ecdf => "ECDF plot",
        }
    }
    fn from_normalised(name: &str) -> Option<Self> {
        let kind = match name {
            "scatter" => Self::Scatter,
            "bar" | "vertical bar" | "column" => Self::Bar,
            "barh" | "horizontal bar" | "hbar" => Self::Barh,
            "hist" | "histogram" => Self::Hist,
            "box" | "box and whisker" | "boxwhisker" => Self::Box,
            "violin" => Self::Violin,
            "pie" => Self::Pie,
            "hexbin" | "hex" | "hexagonal binning" => Self::Hexbin,
            "kde" | "density" | "kernel density" => Self::Kde,
            "ecdf" | "cumulative distribution" | "empirical cumulative distribution" => Self::Ecdf,
            _ => return None,
        };
        Some(kind)
    }
}
fn normalise_chart_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();
    let mut words = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    for suffix in [" chart", " plot", " graph", "plot", "chart"] {
        if words.len() > suffix.len() && words.ends_with(suffix) {
            words.truncate(words.len() - suffix.len());
            break;
        }
    }
    words
}
impl FromStr for ChartKind {
    type Err = ValidationError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_normalised(&normalise_chart_name(s)).ok_or_else(|| {
            ValidationError::UnknownChartType {
                name: s.trim().to_string(),
            }
        })
    }
}
impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgSpec {
    pub data_type: DataTypeSpec,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataTypeSpec {
    Single(DataType),
    Multiple(Vec<DataType>),
}
impl DataTypeSpec {
    pub fn accepts(&self, data_type: &DataType) -> bool {
        match self {
            Self::Single(dt) => dt == data_type,
            Self::Multiple(types) => types.contains(data_type),
        }
    }
    pub fn accepted_types(&self) -> Vec<&DataType> {
        match self {
            Self::Single(dt) => vec![dt],
            Self::Multiple(types) => types.iter().collect(),
        }
    }
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartNode {
    pub kind: ChartKind,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub args: IndexMap<String, ArgSpec>,
}
impl ChartNode {
    pub fn required_args(&self) -> Vec<(&String, &ArgSpec)> {
        self.args.iter().filter(|(_, spec)| spec.required).collect()
    }
    pub fn optional_args(&self) -> Vec<(&String, &ArgSpec)> {
        self.args.iter().filter(|(_, spec)| !spec.required).collect()
    }
    pub fn can_render_with(&self, available: &[DataType]) -> bool {
        self.required_args()
            .iter()
            .all(|(_, spec)| available.iter().any(|dt| spec.data_type.accepts(dt)))
    }
    pub fn has_any_tag(&self, tags: &[&str]) -> bool {
        tags.iter().any(|tag| self.tags.iter().any(|t| t == tag))
    }
    pub fn calculate_semantic_score(
        &self,
        has_temporal: bool,
        numeric_count: usize,
        categorical_count: usize,
    ) -> f64 {
        let mut score: f64 = 0.0;
        if numeric_count >= 1 {
            if self.has_any_tag(&["distribution", "histogram", "density"]) {
                score += 0.4;
            }
            if self.has_any_tag(&["frequency", "cumulative"]) {
                score += 0.2;
            }
        }
        if numeric_count >= 2 && self.has_any_tag(&["relationship", "correlation"]) {
            score += 0.5;
        }
        if categorical_count > 0 {
            if self.has_any_tag(&["comparison", "categorical", "ranking"]) {
                score += 0.3;
            }
            if self.has_any_tag(&["proportion", "parts-of-whole"]) {
                score += 0.25;
            }
        }
        if numeric_count >= 1 && self.has_any_tag(&["statistical", "summary", "outlier"]) {
            score += 0.3;
        }
        if has_temporal && self.has_any_tag(&["relationship"]) {
            score += 0.1;
        }
        score.min(1.0)
    }
    pub fn complexity_score(&self) -> f64 {
        if self.args.is_empty() {
            return 0.0;
        }
        let optional_ratio = self.optional_args().len() as f64 / self.args.len() as f64;
        let mut complexity = self.args.len() as f64 / 5.0 + optional_ratio * 0.3;
        if self.has_any_tag(&["density"]) {
            complexity += 0.2;
        }
        complexity.min(1.0)
    }
}
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    charts: Vec<ChartNode>,
}
#[derive(Debug, Clone)]
pub struct ChartCatalog {
    charts: Vec<ChartNode>,
    by_kind: HashMap<ChartKind, usize>,
    by_tag: HashMap<String, Vec<usize>>,
}
impl ChartCatalog {
    pub fn builtin() -> crate::error::Result<Self> {
        Self::from_yaml_str(BUILTIN_CATALOG)
            .map_err(|e| VistaError::Config(ConfigError::Catalog(format!("{e:#}"))))
    }
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read chart catalog: {}", path.as_ref().display())
        })?;
        Self::from_yaml_str(&content)
    }
    pub fn from_yaml_str(yaml_content: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_yaml::from_str(yaml_content).context("Failed to parse chart catalog YAML")?;
        let mut by_kind = HashMap::new();
        let mut by_tag: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, chart) in file.charts.iter().enumerate() {
            if by_kind.insert(chart.kind, idx).is_some() {
                anyhow::bail!("Duplicate chart name found: {}", chart.kind);
            }
            if chart.args.is_empty() {
                anyhow::bail!("Chart '{}' has no arguments", chart.kind);
            }
            for tag in &chart.tags {
                by_tag.entry(tag.clone()).or_default().push(idx);
            }
        }
        Ok(Self {
            charts: file.charts,
            by_kind,
            by_tag,
        })
    }
    pub fn charts(&self) -> &[ChartNode] {
        &self.charts
    }
    pub fn get(&self, kind: ChartKind) -> Option<&ChartNode> {
        self.by_kind.get(&kind).map(|&idx| &self.charts[idx])
    }
    pub fn kinds(&self) -> Vec<ChartKind> {
        self.charts.iter().map(|c| c.kind).collect()
    }
    pub fn charts_by_tags(&self, tags: &[&str]) -> Vec<&ChartNode> {
        let mut indices: Vec<usize> = tags
            .iter()
            .filter_map(|tag| self.by_tag.get(*tag))
            .flatten()
            .copied()
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices.into_iter().map(|idx| &self.charts[idx]).collect()
    }
    pub fn compatible_charts(&self, available: &[DataType]) -> Vec<&ChartNode> {
        self.charts
            .iter()
            .filter(|chart| chart.can_render_with(available))
            .collect()
    }
}
