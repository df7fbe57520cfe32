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

pub mod aggregate;
pub mod registry;
mod render;

pub use registry::{NumericRule, PlotRegistry, PlotRenderer, PlotRequest, PlotRequirements, SvgRenderer};
pub use render::default_labels;

use crate::catalog::ChartKind;
use crate::config::{PlotSettings, MAX_BINS, MAX_HEXBIN_GRIDSIZE, PLOT_SIZE_RANGE};
use crate::dataset::Dataset;
use crate::error::{utils, Result, ValidationError};
use crate::figure::Figure;
use crate::recommender::Suggestion;
use tracing::{debug, info};

/// How the caller points at the suggestion to plot.
#[derive(Debug, Clone, Copy)]
pub enum SuggestionRef<'a> {
    Suggestion(&'a Suggestion),
    Index {
        index: usize,
        suggestions: &'a [Suggestion],
    },
}

impl<'a> SuggestionRef<'a> {
    pub fn resolve(self) -> Result<&'a Suggestion> {
        match self {
            Self::Suggestion(s) => Ok(s),
            Self::Index { index, suggestions } => {
                suggestions
                    .get(index)
                    .ok_or_else(|| {
                        ValidationError::SuggestionIndexOutOfRange {
                            index,
                            len: suggestions.len(),
                        }
                        .into()
                    })
            }
        }
    }
}

impl<'a> From<&'a Suggestion> for SuggestionRef<'a> {
    fn from(suggestion: &'a Suggestion) -> Self {
        Self::Suggestion(suggestion)
    }
}

/// Column names that replace the suggestion's bound variables by position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableOverrides {
    pub x: Option<String>,
    pub y: Option<String>,
    pub z: Option<String>,
}

impl VariableOverrides {
    pub fn x(column: impl Into<String>) -> Self {
        Self {
            x: Some(column.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_y(mut self, column: impl Into<String>) -> Self {
        self.y = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_z(mut self, column: impl Into<String>) -> Self {
        self.z = Some(column.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }

    /// A column may only extend the binding by one slot; z never fills the y slot.
    fn apply(&self, kind: ChartKind, base: &[String]) -> Result<Vec<String>> {
        let mut variables = base.to_vec();
        for (slot, column) in [&self.x, &self.y, &self.z].into_iter().enumerate() {
            let Some(column) = column else { continue };
            if slot < variables.len() {
                variables[slot] = column.clone();
            } else if slot == variables.len() {
                variables.push(column.clone());
            } else {
                return Err(utils::invalid_variables(
                    kind.as_str(),
                    format!(
                        "{} override needs a {} variable to be bound",
                        ROLES[slot],
                        ROLES[slot - 1]
                    ),
                ));
            }
        }
        Ok(variables)
    }
}

/// Sizes are in pixels and must lie within 100..=4000; bins within 1..=10000.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleOverrides {
    pub title: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bins: Option<usize>,
}

const ROLES: [&str; 3] = ["x", "y", "z"];

#[derive(Debug, Clone, Default)]
pub struct PlotGenerator {
    settings: PlotSettings,
    registry: PlotRegistry,
}

impl PlotGenerator {
    pub fn new(settings: PlotSettings, registry: PlotRegistry) -> Self {
        Self { settings, registry }
    }

    pub fn registry(&self) -> &PlotRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PlotRegistry {
        &mut self.registry
    }

    pub fn plot(
        &self,
        dataset: &Dataset,
        selection: SuggestionRef<'_>,
        variables: &VariableOverrides,
        style: &StyleOverrides,
    ) -> Result<Figure> {
        let suggestion = selection.resolve()?;
        let kind = suggestion.chart_type;
        let bound = variables.apply(kind, &suggestion.variables)?;
        for (slot, name) in bound.iter().enumerate() {
            if !dataset.has_column(name) {
                let role = ROLES.get(slot).copied().unwrap_or("variable");
                return Err(utils::unknown_column(name, role));
            }
        }
        let requirements = self.registry.requirements(kind)?;
        requirements.check(kind, &bound, dataset)?;

        let (title, x_label, y_label) = default_labels(kind, &bound);
        let width = style.width.unwrap_or(self.settings.width);
        let height = style.height.unwrap_or(self.settings.height);
        let bins = style.bins.unwrap_or(self.settings.bins);
        self.check_style(kind, width, height, bins)?;
        let request = PlotRequest {
            dataset,
            kind,
            variables: bound,
            title: style.title.clone().unwrap_or(title),
            x_label: style.x_label.clone().unwrap_or(x_label),
            y_label: style.y_label.clone().unwrap_or(y_label),
            width,
            height,
            bins,
            hexbin_gridsize: self.settings.hexbin_gridsize,
        };
        debug!(chart = %kind, variables = ?request.variables, "Rendering figure");
        let figure = self.registry.renderer(kind)?.render(&request)?;
        info!(chart = %kind, figure = %figure.id(), "Plot generated");
        Ok(figure)
    }

    fn check_style(&self, kind: ChartKind, width: u32, height: u32, bins: usize) -> Result<()> {
        let chart = kind.as_str();
        if !PLOT_SIZE_RANGE.contains(&width) || !PLOT_SIZE_RANGE.contains(&height) {
            return Err(utils::invalid_style(
                chart,
                format!(
                    "size {width}x{height} is outside {}..={} pixels",
                    PLOT_SIZE_RANGE.start(),
                    PLOT_SIZE_RANGE.end()
                ),
            ));
        }
        if !(1..=MAX_BINS).contains(&bins) {
            return Err(utils::invalid_style(
                chart,
                format!("bin count {bins} is outside 1..={MAX_BINS}"),
            ));
        }
        let gridsize = self.settings.hexbin_gridsize;
        if !(1..=MAX_HEXBIN_GRIDSIZE).contains(&gridsize) {
            return Err(utils::invalid_style(
                chart,
                format!("hexbin grid size {gridsize} is outside 1..={MAX_HEXBIN_GRIDSIZE}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChartError, VistaError};
    use polars::prelude::*;

    fn dataset() -> Dataset {
        Dataset::new(
            df! {
                "price" => [10.0, 12.5, 9.0, 30.0, 11.0, 14.0],
                "area" => [50.0, 60.0, 45.0, 120.0, 55.0, 70.0],
                "city" => ["oslo", "bergen", "oslo", "oslo", "bergen", "tromso"],
                "rating" => [Some(4.0), None, Some(3.5), Some(5.0), None, Some(4.5)],
            }
            .unwrap(),
        )
        .unwrap()
    }

    fn suggestion(kind: ChartKind, vars: &[&str]) -> Suggestion {
        Suggestion::new(kind, vars.iter().map(ToString::to_string).collect(), 0.8)
    }

    #[test]
    fn test_out_of_range_index_is_validation_error() {
        let ds = dataset();
        let suggestions = vec![suggestion(ChartKind::Hist, &["price"])];
        let err = PlotGenerator::default()
            .plot(
                &ds,
                SuggestionRef::Index {
                    index: 3,
                    suggestions: &suggestions,
                },
                &VariableOverrides::default(),
                &StyleOverrides::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            VistaError::Validation(ValidationError::SuggestionIndexOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn test_overrides_replace_and_append() {
        let base = vec!["price".to_string()];
        let overrides = VariableOverrides::x("area").with_y("price");
        assert_eq!(overrides.apply(ChartKind::Bar, &base).unwrap(), vec!["area", "price"]);
        let pair = vec!["price".to_string(), "area".to_string()];
        let z = VariableOverrides::default().with_z("city");
        assert_eq!(
            z.apply(ChartKind::Scatter, &pair).unwrap(),
            vec!["price", "area", "city"]
        );
    }

    #[test]
    fn test_z_without_y_is_rejected() {
        let ds = dataset();
        for kind in [ChartKind::Bar, ChartKind::Barh, ChartKind::Box, ChartKind::Violin] {
            let s = suggestion(kind, &["price"]);
            let err = PlotGenerator::default()
                .plot(
                    &ds,
                    (&s).into(),
                    &VariableOverrides::default().with_z("city"),
                    &StyleOverrides::default(),
                )
                .unwrap_err();
            match err {
                VistaError::Validation(ValidationError::InvalidVariables { reason, .. }) => {
                    assert!(reason.contains("z override"), "{kind}: {reason}");
                }
                other => panic!("{kind}: unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_scatter_z_colours_points() {
        let ds = dataset();
        let s = suggestion(ChartKind::Scatter, &["area", "price"]);
        let generator = PlotGenerator::default();
        let by_city = generator
            .plot(
                &ds,
                (&s).into(),
                &VariableOverrides::default().with_z("city"),
                &StyleOverrides::default(),
            )
            .unwrap();
        assert_eq!(by_city.variables(), ["area", "price", "city"]);
        assert_eq!(by_city.title(), "price vs area (coloured by city)");
        assert!(by_city.summary().contains("Colour: city"));
        assert!(by_city.svg().contains("oslo"));

        let sized = Suggestion::new(
            ChartKind::Scatter,
            vec!["area".into(), "price".into(), "price".into(), "rating".into()],
            0.8,
        );
        let figure = generator
            .plot(&ds, (&sized).into(), &VariableOverrides::default(), &StyleOverrides::default())
            .unwrap();
        assert!(figure.summary().starts_with("4 points."));
        assert!(figure.summary().contains("Size: rating"));
        assert!(figure.title().ends_with("(sized by rating)"));
    }

    #[test]
    fn test_hexbin_rejects_third_variable() {
        let ds = dataset();
        let s = suggestion(ChartKind::Hexbin, &["area", "price"]);
        let err = PlotGenerator::default()
            .plot(
                &ds,
                (&s).into(),
                &VariableOverrides::default().with_z("city"),
                &StyleOverrides::default(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("expected 2 variables, got 3"));
    }

    #[test]
    fn test_out_of_range_style_is_rejected_before_render() {
        let ds = dataset();
        let hist = suggestion(ChartKind::Hist, &["price"]);
        let pie = suggestion(ChartKind::Pie, &["city"]);
        let generator = PlotGenerator::default();
        let cases = [
            (&hist, StyleOverrides { bins: Some(usize::MAX), ..StyleOverrides::default() }),
            (&hist, StyleOverrides { bins: Some(0), ..StyleOverrides::default() }),
            (&pie, StyleOverrides { width: Some(10), height: Some(10), ..StyleOverrides::default() }),
            (&pie, StyleOverrides { width: Some(400), height: Some(20), ..StyleOverrides::default() }),
            (&pie, StyleOverrides { width: Some(4001), ..StyleOverrides::default() }),
        ];
        for (s, style) in cases {
            let err = generator
                .plot(&ds, s.into(), &VariableOverrides::default(), &style)
                .unwrap_err();
            assert!(
                matches!(err, VistaError::Validation(ValidationError::InvalidStyle { .. })),
                "{style:?}: {err:?}"
            );
        }
        let smallest = StyleOverrides {
            width: Some(100),
            height: Some(100),
            ..StyleOverrides::default()
        };
        generator
            .plot(&ds, (&pie).into(), &VariableOverrides::default(), &smallest)
            .unwrap();
    }

    #[test]
    fn test_unknown_override_fails_before_render() {
        let ds = dataset();
        let s = suggestion(ChartKind::Scatter, &["price", "area"]);
        let err = PlotGenerator::default()
            .plot(
                &ds,
                (&s).into(),
                &VariableOverrides::default().with_y("missing"),
                &StyleOverrides::default(),
            )
            .unwrap_err();
        match err {
            VistaError::Validation(ValidationError::UnknownColumn { column, role }) => {
                assert_eq!(column, "missing");
                assert_eq!(role, "y");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_every_builtin_kind_renders_svg() {
        let ds = dataset();
        let generator = PlotGenerator::default();
        let cases = [
            (ChartKind::Scatter, vec!["area", "price"]),
            (ChartKind::Bar, vec!["city"]),
            (ChartKind::Bar, vec!["price", "city"]),
            (ChartKind::Barh, vec!["city"]),
            (ChartKind::Hist, vec!["price"]),
            (ChartKind::Box, vec!["price", "city"]),
            (ChartKind::Violin, vec!["price"]),
            (ChartKind::Pie, vec!["city"]),
            (ChartKind::Hexbin, vec!["area", "price"]),
            (ChartKind::Kde, vec!["area"]),
            (ChartKind::Ecdf, vec!["rating"]),
        ];
        for (kind, vars) in cases {
            let s = suggestion(kind, &vars);
            let figure = generator
                .plot(&ds, (&s).into(), &VariableOverrides::default(), &StyleOverrides::default())
                .unwrap_or_else(|e| panic!("{kind} failed: {e}"));
            assert!(figure.svg().contains("<svg"), "{kind} produced no svg");
            assert!(!figure.summary().is_empty());
            assert_eq!(figure.kind(), kind);
        }
    }

    #[test]
    fn test_style_overrides_win() {
        let ds = dataset();
        let s = suggestion(ChartKind::Hist, &["price"]);
        let style = StyleOverrides {
            title: Some("Prices".into()),
            width: Some(400),
            height: Some(300),
            bins: Some(4),
            ..StyleOverrides::default()
        };
        let figure = PlotGenerator::default()
            .plot(&ds, (&s).into(), &VariableOverrides::default(), &style)
            .unwrap();
        assert_eq!(figure.title(), "Prices");
        assert_eq!(figure.size(), (400, 300));
        assert_eq!(figure.y_label(), "Frequency");
        assert!(figure.summary().starts_with("4 bins of price"));
    }

    #[test]
    fn test_all_null_column_has_no_plottable_data() {
        let ds = Dataset::new(
            df! {
                "empty" => [None::<f64>, None, None],
                "label" => ["a", "b", "c"],
            }
            .unwrap(),
        )
        .unwrap();
        let s = suggestion(ChartKind::Hist, &["empty"]);
        let err = PlotGenerator::default()
            .plot(&ds, (&s).into(), &VariableOverrides::default(), &StyleOverrides::default())
            .unwrap_err();
        assert!(matches!(
            err,
            VistaError::Chart(ChartError::NoPlottableData { .. })
        ));
    }

    #[test]
    fn test_same_input_renders_identically() {
        let ds = dataset();
        let s = suggestion(ChartKind::Box, &["price", "city"]);
        let generator = PlotGenerator::default();
        let a = generator
            .plot(&ds, (&s).into(), &VariableOverrides::default(), &StyleOverrides::default())
            .unwrap();
        let b = generator
            .plot(&ds, (&s).into(), &VariableOverrides::default(), &StyleOverrides::default())
            .unwrap();
        assert!(a.renders_like(&b));
        assert_ne!(a.id(), b.id());
    }
}
