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

use llm_contracts::LLMError;
use thiserror::Error;
#[derive(Error, Debug)]
pub enum VistaError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Chart error: {0}")]
    Chart(#[from] ChartError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("LLM service error: {0}")]
    Service(#[from] LLMError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Empty dataset provided")]
    EmptyDataset,
    #[error("Dataset has no usable columns: {reason}")]
    NoUsableColumns { reason: String },
    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },
    #[error("Failed to read data file '{path}': {source}")]
    DataFileError {
        path: String,
        #[source]
        source: polars::error::PolarsError,
    },
    #[error("Failed to profile column '{column}': {reason}")]
    ColumnProfilingError { column: String, reason: String },
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Suggestion count must be a positive integer")]
    InvalidSuggestionCount,
    #[error("Suggestion index {index} is out of range for {len} suggestions")]
    SuggestionIndexOutOfRange { index: usize, len: usize },
    #[error("Chart type '{name}' is not supported")]
    UnknownChartType { name: String },
    #[error("Column '{column}' given for {role} does not exist in the dataset")]
    UnknownColumn { column: String, role: String },
    #[error("Invalid variables for plot '{chart}': {reason}")]
    InvalidVariables { chart: String, reason: String },
    #[error("Invalid style for plot '{chart}': {reason}")]
    InvalidStyle { chart: String, reason: String },
    #[error("No figure was provided to explain")]
    MissingFigure,
    #[error("Explanation prompt must not be empty")]
    EmptyPrompt,
}
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("No renderer registered for chart type '{kind}'")]
    UnsupportedChart { kind: String },
    #[error("Column '{column}' has no plottable values for '{chart}'")]
    NoPlottableData { chart: String, column: String },
    #[error("Failed to render '{chart}': {reason}")]
    Render { chart: String, reason: String },
}
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
    #[error("Invalid chart catalog: {0}")]
    Catalog(String),
}
pub type Result<T> = std::result::Result<T, VistaError>;
impl VistaError {
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Service(e) => e.is_transient(),
            Self::Io(_) => true,
            _ => false,
        }
    }
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_authentication())
    }
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_transient())
    }
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Validation(_) => "validation",
            Self::Chart(_) => "chart",
            Self::Config(_) => "config",
            Self::Service(LLMError::Authentication(_)) => "auth",
            Self::Service(_) => "service",
            Self::Io(_) => "io",
            Self::Serialisation(_) => "serialisation",
        }
    }
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Data(DataError::EmptyDataset) => vec![
                "Provide a dataset with at least one row and one column".to_string(),
            ],
            Self::Data(DataError::NoUsableColumns { .. }) => vec![
                "Include at least one numeric or low-cardinality categorical column".to_string(),
                "Drop identifier or free-text columns before recommending".to_string(),
            ],
            Self::Data(DataError::ColumnNotFound { column }) => {
                vec![format!("Check the spelling of column '{column}'")]
            }
            Self::Validation(ValidationError::SuggestionIndexOutOfRange { len, .. }) => {
                vec![format!("Use an index between 0 and {}", len.saturating_sub(1))]
            }
            Self::Validation(ValidationError::UnknownChartType { .. }) => vec![
                "Supported charts: scatter, bar, barh, hist, box, violin, pie, hexbin, kde, ecdf"
                    .to_string(),
            ],
            Self::Validation(ValidationError::MissingFigure) => {
                vec!["Generate a figure with plotgen before explaining it".to_string()]
            }
            Self::Service(LLMError::Authentication(_)) => vec![
                "Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GROQ_API_KEY, GEMINI_API_KEY or AZURE_OPENAI_API_KEY"
                    .to_string(),
                "Or call set_api_key before explaining".to_string(),
            ],
            Self::Service(LLMError::Timeout | LLMError::Network(_)) => vec![
                "Check network connectivity".to_string(),
                "Increase llm.timeout_seconds".to_string(),
            ],
            Self::Service(LLMError::RateLimit) => {
                vec!["Wait before retrying or switch to another model".to_string()]
            }
            _ => Vec::new(),
        }
    }
    pub fn user_message(&self) -> String {
        let suggestions = self.suggestions();
        if suggestions.is_empty() {
            self.to_string()
        } else {
            format!("{self}\nSuggestions:\n  - {}", suggestions.join("\n  - "))
        }
    }
}
impl From<polars::error::PolarsError> for VistaError {
    fn from(e: polars::error::PolarsError) -> Self {
        Self::Data(DataError::Polars(e))
    }
}
impl From<::config::ConfigError> for VistaError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(ConfigError::Load(e))
    }
}
pub mod utils {
    use super::*;
    pub fn unknown_column(column: &str, role: &str) -> VistaError {
        VistaError::Validation(ValidationError::UnknownColumn {
            column: column.to_string(),
            role: role.to_string(),
        })
    }
    pub fn invalid_variables(chart: &str, reason: impl Into<String>) -> VistaError {
        VistaError::Validation(ValidationError::InvalidVariables {
            chart: chart.to_string(),
            reason: reason.into(),
        })
    }
    pub fn invalid_style(chart: &str, reason: impl Into<String>) -> VistaError {
        VistaError::Validation(ValidationError::InvalidStyle {
            chart: chart.to_string(),
            reason: reason.into(),
        })
    }
    pub fn render_failed(chart: &str, reason: impl std::fmt::Display) -> VistaError {
        VistaError::Chart(ChartError::Render {
            chart: chart.to_string(),
            reason: reason.to_string(),
        })
    }
    pub fn no_plottable_data(chart: &str, column: &str) -> VistaError {
        VistaError::Chart(ChartError::NoPlottableData {
            chart: chart.to_string(),
            column: column.to_string(),
        })
    }
}
