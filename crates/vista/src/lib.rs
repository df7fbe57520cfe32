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

pub mod assistant;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod data_profiler;
pub mod dataset;
pub mod error;
pub mod explainer;
pub mod figure;
pub mod llm;
pub mod plotgen;
pub mod recommender;
pub mod telemetry;

pub use assistant::{
    explainer, plotgen, recommender, reset_shared_assistant, set_api_key, set_shared_assistant,
    Assistant,
};
pub use cache::RecommendationCache;
pub use catalog::{ChartCatalog, ChartKind, DataType};
pub use config::AssistantConfig;
pub use data_profiler::{DataProfiler, DatasetSummary, DimensionProfile, ProfilingConfig};
pub use dataset::Dataset;
pub use error::{ChartError, ConfigError, DataError, Result, ValidationError, VistaError};
pub use explainer::{Explainer, Explanation};
pub use figure::Figure;
pub use llm::{Credentials, ModelPool};
pub use plotgen::{
    PlotGenerator, PlotRegistry, PlotRenderer, PlotRequest, PlotRequirements, StyleOverrides,
    SuggestionRef, VariableOverrides,
};
pub use recommender::{RankingMode, Recommender, Suggestion};

pub use llm_contracts::{LLMError, ModelRoute, Provider, StrategyName};
