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
use crate::error::Result;
use crate::plotgen::PlotRequest;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// A rendered chart. Immutable once produced by the plot generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    id: Uuid,
    kind: ChartKind,
    variables: Vec<String>,
    title: String,
    x_label: String,
    y_label: String,
    width: u32,
    height: u32,
    svg: String,
    summary: String,
    created_at: DateTime<Utc>,
}

impl Figure {
    /// `summary` is a plain-text account of the plotted values.
    pub fn new(request: &PlotRequest<'_>, svg: String, summary: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: request.kind,
            variables: request.variables.clone(),
            title: request.title.clone(),
            x_label: request.x_label.clone(),
            y_label: request.y_label.clone(),
            width: request.width,
            height: request.height,
            svg,
            summary,
            created_at: Utc::now(),
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn x_label(&self) -> &str {
        &self.x_label
    }

    pub fn y_label(&self) -> &str {
        &self.y_label
    }

    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn svg(&self) -> &str {
        &self.svg
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Text encoding of the chart handed to the language model.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "Chart type: {}\nTitle: {}\nX axis: {}\nY axis: {}\nVariables: {}\n",
            self.kind.display_name(),
            self.title,
            self.x_label,
            self.y_label,
            self.variables.join(", ")
        );
        if !self.summary.is_empty() {
            out.push_str("Plotted data:\n");
            out.push_str(&self.summary);
            if !self.summary.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    pub fn save_svg<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), &self.svg)?;
        debug!(figure = %self.id, path = %path.as_ref().display(), "Saved figure");
        Ok(())
    }

    pub fn svg_data_uri(&self) -> String {
        format!("data:image/svg+xml;base64,{}", STANDARD.encode(&self.svg))
    }

    /// Same chart, same bindings and identical markup.
    pub fn renders_like(&self, other: &Self) -> bool {
        self.kind == other.kind && self.variables == other.variables && self.svg == other.svg
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::ChartKind;
    use crate::dataset::Dataset;
    use crate::plotgen::{PlotGenerator, StyleOverrides, VariableOverrides};
    use crate::recommender::Suggestion;
    use polars::prelude::*;

    fn bar_figure() -> super::Figure {
        let ds = Dataset::new(df! { "fruit" => ["apple", "pear", "apple", "fig"] }.unwrap()).unwrap();
        let s = Suggestion::new(ChartKind::Bar, vec!["fruit".into()], 1.0);
        PlotGenerator::default()
            .plot(&ds, (&s).into(), &VariableOverrides::default(), &StyleOverrides::default())
            .unwrap()
    }

    #[test]
    fn test_describe_lists_labels_and_data() {
        let fig = bar_figure();
        let text = fig.describe();
        assert!(text.contains(&format!("Title: {}", fig.title())));
        assert!(text.contains("Variables: fruit"));
        assert!(text.contains("Plotted data:"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_data_uri_prefix_and_identity() {
        let a = bar_figure();
        let b = bar_figure();
        assert!(a.svg_data_uri().starts_with("data:image/svg+xml;base64,"));
        assert_ne!(a.id(), b.id());
        assert!(a.renders_like(&b));
    }
}
