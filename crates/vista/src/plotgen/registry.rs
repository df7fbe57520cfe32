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

use super::render;
use crate::catalog::ChartKind;
use crate::dataset::Dataset;
use crate::error::{utils, ChartError, Result};
use crate::figure::Figure;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which bound variables must be numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericRule {
    All,
    Leading,
    /// Only the first variable, and only when a grouping variable follows it.
    LeadingWhenGrouped,
    /// x and y; a fourth (size) variable must be numeric too, the third (colour) may be anything.
    Axes,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotRequirements {
    pub min_variables: usize,
    pub max_variables: usize,
    pub numeric: NumericRule,
}

impl PlotRequirements {
    pub const fn new(min_variables: usize, max_variables: usize, numeric: NumericRule) -> Self {
        Self {
            min_variables,
            max_variables,
            numeric,
        }
    }

    pub const fn for_kind(kind: ChartKind) -> Self {
        match kind {
            ChartKind::Scatter => Self::new(2, 4, NumericRule::Axes),
            ChartKind::Hexbin => Self::new(2, 2, NumericRule::All),
            ChartKind::Hist | ChartKind::Kde | ChartKind::Ecdf => {
                Self::new(1, 1, NumericRule::All)
            }
            ChartKind::Box | ChartKind::Violin => Self::new(1, 2, NumericRule::Leading),
            ChartKind::Bar | ChartKind::Barh => {
                Self::new(1, 2, NumericRule::LeadingWhenGrouped)
            }
            ChartKind::Pie => Self::new(1, 1, NumericRule::Any),
        }
    }

    /// Arity and numeric checks. Column existence is checked separately.
    pub fn check(&self, kind: ChartKind, variables: &[String], dataset: &Dataset) -> Result<()> {
        let n = variables.len();
        if n < self.min_variables || n > self.max_variables {
            let expected = if self.min_variables == self.max_variables {
                self.min_variables.to_string()
            } else {
                format!("{} to {}", self.min_variables, self.max_variables)
            };
            let noun = if expected == "1" { "variable" } else { "variables" };
            return Err(utils::invalid_variables(
                kind.as_str(),
                format!("expected {expected} {noun}, got {n}"),
            ));
        }
        let leading = variables.get(..1).unwrap_or_default();
        let must_be_numeric: Vec<&String> = match self.numeric {
            NumericRule::All => variables.iter().collect(),
            NumericRule::Leading => leading.iter().collect(),
            NumericRule::LeadingWhenGrouped if n > 1 => leading.iter().collect(),
            NumericRule::Axes => variables
                .iter()
                .enumerate()
                .filter(|(slot, _)| *slot != 2)
                .map(|(_, name)| name)
                .collect(),
            NumericRule::LeadingWhenGrouped | NumericRule::Any => Vec::new(),
        };
        for name in must_be_numeric {
            if !dataset.is_numeric(name) {
                return Err(utils::invalid_variables(
                    kind.as_str(),
                    format!("'{name}' must be numeric"),
                ));
            }
        }
        Ok(())
    }
}

/// Everything a renderer needs; labels are already resolved.
#[derive(Debug, Clone)]
pub struct PlotRequest<'a> {
    pub dataset: &'a Dataset,
    pub kind: ChartKind,
    pub variables: Vec<String>,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: u32,
    pub height: u32,
    pub bins: usize,
    pub hexbin_gridsize: usize,
}

pub trait PlotRenderer: Send + Sync {
    fn render(&self, request: &PlotRequest<'_>) -> Result<Figure>;
}

/// SVG renderer for the built-in chart kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgRenderer;

impl PlotRenderer for SvgRenderer {
    fn render(&self, request: &PlotRequest<'_>) -> Result<Figure> {
        let (svg, summary) = render::render_svg(request)?;
        Ok(Figure::new(request, svg, summary))
    }
}

#[derive(Clone)]
struct Entry {
    requirements: PlotRequirements,
    renderer: Arc<dyn PlotRenderer>,
}

#[derive(Clone)]
pub struct PlotRegistry {
    entries: HashMap<ChartKind, Entry>,
}

impl PlotRegistry {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let renderer: Arc<dyn PlotRenderer> = Arc::new(SvgRenderer);
        for kind in ChartKind::ALL {
            registry.register(kind, PlotRequirements::for_kind(kind), renderer.clone());
        }
        registry
    }

    /// Replaces any renderer already registered for `kind`.
    pub fn register(
        &mut self,
        kind: ChartKind,
        requirements: PlotRequirements,
        renderer: Arc<dyn PlotRenderer>,
    ) {
        self.entries.insert(
            kind,
            Entry {
                requirements,
                renderer,
            },
        );
    }

    pub fn contains(&self, kind: ChartKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ChartKind> {
        let mut kinds: Vec<ChartKind> = self.entries.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn requirements(&self, kind: ChartKind) -> Result<PlotRequirements> {
        Ok(self.entry(kind)?.requirements)
    }

    pub fn renderer(&self, kind: ChartKind) -> Result<Arc<dyn PlotRenderer>> {
        Ok(self.entry(kind)?.renderer.clone())
    }

    fn entry(&self, kind: ChartKind) -> Result<&Entry> {
        self.entries.get(&kind).ok_or_else(|| {
            ChartError::UnsupportedChart {
                kind: kind.to_string(),
            }
            .into()
        })
    }
}

impl Default for PlotRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for PlotRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlotRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
