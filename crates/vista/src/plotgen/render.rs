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

use super::aggregate::{self, Bin, BoxStats, HexGrid};
use super::registry::PlotRequest;
use crate::catalog::ChartKind;
use crate::error::{utils, Result};
use itertools::Itertools;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters_svg::SVGBackend;
use std::f64::consts::PI;
use std::fmt::Write as _;

const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];
const LOW_DENSITY: RGBColor = RGBColor(68, 1, 84);
const HIGH_DENSITY: RGBColor = RGBColor(253, 231, 37);
const KDE_POINTS: usize = 200;
const SUMMARY_LIMIT: usize = 20;
const FONT: &str = "sans-serif";

type DrawResult<DB> = std::result::Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

/// Colour channel of a scatter's third variable.
enum Hue {
    Scale { name: String, values: Vec<f64> },
    Groups {
        name: String,
        labels: Vec<String>,
        codes: Vec<usize>,
    },
}

struct Scatter {
    points: Vec<(f64, f64)>,
    hue: Option<Hue>,
    /// Marker radii and the column they encode.
    sizes: Option<(String, Vec<f64>, Vec<i32>)>,
}

struct Violin {
    label: String,
    curve: Vec<(f64, f64)>,
    count: usize,
    median: f64,
}

enum Prepared {
    Bars {
        labels: Vec<String>,
        heights: Vec<f64>,
        horizontal: bool,
    },
    Histogram(Vec<Bin>),
    Boxes(Vec<(String, BoxStats)>),
    Violins(Vec<Violin>),
    Pie(Vec<(String, usize)>),
    Points(Scatter),
    Hexbin(HexGrid),
    Curve {
        points: Vec<(f64, f64)>,
        step: bool,
    },
}

/// Title, x label and y label used when the caller does not override them.
pub fn default_labels(kind: ChartKind, variables: &[String]) -> (String, String, String) {
    let first = variables.first().cloned().unwrap_or_default();
    let second = variables.get(1).cloned();
    match (kind, second) {
        (ChartKind::Bar, None) => (format!("Bar plot of {first}"), first, "Count".into()),
        (ChartKind::Bar, Some(group)) => (format!("{first} by {group}"), group, first),
        (ChartKind::Barh, None) => (format!("Bar plot of {first}"), "Count".into(), first),
        (ChartKind::Barh, Some(group)) => (format!("{first} by {group}"), first, group),
        (ChartKind::Hist, _) => (format!("Histogram of {first}"), first, "Frequency".into()),
        (ChartKind::Box, None) => (format!("Box plot of {first}"), String::new(), first),
        (ChartKind::Violin, None) => (format!("Violin plot of {first}"), String::new(), first),
        (ChartKind::Box | ChartKind::Violin, Some(group)) => {
            (format!("{first} by {group}"), group, first)
        }
        (ChartKind::Pie, _) => (format!("Pie chart of {first}"), String::new(), String::new()),
        (ChartKind::Scatter, Some(y)) => {
            let mut title = format!("{y} vs {first}");
            if let Some(colour) = variables.get(2) {
                let _ = write!(title, " (coloured by {colour})");
            }
            if let Some(size) = variables.get(3) {
                let _ = write!(title, " (sized by {size})");
            }
            (title, first, y)
        }
        (ChartKind::Hexbin, Some(y)) => (format!("Hexbin: {first} vs {y}"), first, y),
        (ChartKind::Scatter | ChartKind::Hexbin, None) => {
            (first.clone(), first, String::new())
        }
        (ChartKind::Kde, _) => (format!("Density of {first}"), first, "Density".into()),
        (ChartKind::Ecdf, _) => (format!("ECDF of {first}"), first, "Proportion".into()),
    }
}

pub(crate) fn render_svg(request: &PlotRequest<'_>) -> Result<(String, String)> {
    let prepared = prepare(request)?;
    let summary = summarise(request, &prepared);
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (request.width, request.height))
            .into_drawing_area();
        draw(&root, request, &prepared)
            .map_err(|e| utils::render_failed(request.kind.as_str(), e))?;
        root.present()
            .map_err(|e| utils::render_failed(request.kind.as_str(), e))?;
    }
    Ok((svg, summary))
}

fn numeric(request: &PlotRequest<'_>, idx: usize) -> Result<Vec<f64>> {
    let name = &request.variables[idx];
    let values = request.dataset.numeric_values(name)?;
    if values.is_empty() {
        return Err(utils::no_plottable_data(request.kind.as_str(), name));
    }
    Ok(values)
}

fn paired(request: &PlotRequest<'_>) -> Result<Vec<(f64, f64)>> {
    let x = request.dataset.numeric_column(&request.variables[0])?;
    let y = request.dataset.numeric_column(&request.variables[1])?;
    let points: Vec<(f64, f64)> = x
        .into_iter()
        .zip(y)
        .filter_map(|(a, b)| Some((a?, b?)))
        .collect();
    if points.is_empty() {
        return Err(utils::no_plottable_data(
            request.kind.as_str(),
            &request.variables.join(", "),
        ));
    }
    Ok(points)
}

const MIN_RADIUS: f64 = 2.0;
const MAX_RADIUS: f64 = 12.0;

fn radii(values: &[f64]) -> Vec<i32> {
    let magnitudes: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    let (lo, hi) = range_of(magnitudes.iter().copied());
    magnitudes
        .iter()
        .map(|m| {
            let t = if hi > lo { (m - lo) / (hi - lo) } else { 0.5 };
            (MIN_RADIUS + (MAX_RADIUS - MIN_RADIUS) * t).round() as i32
        })
        .collect()
}

/// Rows where x, y and every bound colour or size value are present.
fn scatter(request: &PlotRequest<'_>) -> Result<Scatter> {
    let ds = request.dataset;
    let vars = &request.variables;
    let x = ds.numeric_column(&vars[0])?;
    let y = ds.numeric_column(&vars[1])?;
    let colour = vars.get(2);
    let scale = match colour {
        Some(name) if ds.is_numeric(name) => Some(ds.numeric_column(name)?),
        _ => None,
    };
    let groups = match colour {
        Some(name) if scale.is_none() => Some(ds.string_values(name)?),
        _ => None,
    };
    let size = vars.get(3).map(|name| ds.numeric_column(name)).transpose()?;

    let mut points = Vec::new();
    let mut scale_values = Vec::new();
    let mut group_values = Vec::new();
    let mut size_values = Vec::new();
    for (row, pair) in x.iter().zip(&y).enumerate() {
        let (Some(px), Some(py)) = pair else { continue };
        let tone = scale.as_ref().map(|c| c.get(row).copied().flatten());
        let group = groups.as_ref().map(|c| c.get(row).cloned().flatten());
        let magnitude = size.as_ref().map(|c| c.get(row).copied().flatten());
        if matches!(tone, Some(None)) || matches!(group, Some(None)) || matches!(magnitude, Some(None)) {
            continue;
        }
        points.push((*px, *py));
        scale_values.extend(tone.flatten());
        group_values.extend(group.flatten());
        size_values.extend(magnitude.flatten());
    }
    if points.is_empty() {
        return Err(utils::no_plottable_data(request.kind.as_str(), &vars.join(", ")));
    }

    let hue = colour.map(|name| {
        if scale.is_some() {
            Hue::Scale {
                name: name.clone(),
                values: scale_values,
            }
        } else {
            let labels: Vec<String> = group_values.iter().unique().cloned().collect();
            let codes = group_values
                .iter()
                .map(|g| labels.iter().position(|l| l == g).unwrap_or_default())
                .collect();
            Hue::Groups {
                name: name.clone(),
                labels,
                codes,
            }
        }
    });
    let sizes = vars.get(3).map(|name| {
        let radii = radii(&size_values);
        (name.clone(), size_values, radii)
    });
    Ok(Scatter { points, hue, sizes })
}

fn grouped(request: &PlotRequest<'_>) -> Result<Vec<(String, Vec<f64>)>> {
    let name = &request.variables[0];
    let groups = match request.variables.get(1) {
        Some(group) => aggregate::split_by_group(
            &request.dataset.numeric_column(name)?,
            &request.dataset.string_values(group)?,
        ),
        None => vec![(name.clone(), request.dataset.numeric_values(name)?)],
    };
    let groups: Vec<_> = groups.into_iter().filter(|(_, v)| !v.is_empty()).collect();
    if groups.is_empty() {
        return Err(utils::no_plottable_data(request.kind.as_str(), name));
    }
    Ok(groups)
}

fn prepare(request: &PlotRequest<'_>) -> Result<Prepared> {
    let ds = request.dataset;
    let chart = request.kind.as_str();
    let first = &request.variables[0];
    let prepared = match request.kind {
        ChartKind::Bar | ChartKind::Barh => {
            let (labels, heights): (Vec<String>, Vec<f64>) = match request.variables.get(1) {
                None => aggregate::value_counts(&ds.string_values(first)?)
                    .into_iter()
                    .map(|(label, count)| (label, count as f64))
                    .unzip(),
                Some(group) => {
                    aggregate::group_means(&ds.numeric_column(first)?, &ds.string_values(group)?)
                        .into_iter()
                        .unzip()
                }
            };
            if labels.is_empty() {
                return Err(utils::no_plottable_data(chart, first));
            }
            Prepared::Bars {
                labels,
                heights,
                horizontal: request.kind == ChartKind::Barh,
            }
        }
        ChartKind::Hist => {
            Prepared::Histogram(aggregate::histogram(&numeric(request, 0)?, request.bins))
        }
        ChartKind::Box => Prepared::Boxes(
            grouped(request)?
                .into_iter()
                .filter_map(|(label, values)| Some((label, aggregate::box_stats(&values)?)))
                .collect(),
        ),
        ChartKind::Violin => Prepared::Violins(
            grouped(request)?
                .into_iter()
                .map(|(label, values)| {
                    let mut sorted = values.clone();
                    sorted.sort_by(f64::total_cmp);
                    Violin {
                        label,
                        curve: aggregate::gaussian_kde(&values, KDE_POINTS),
                        count: values.len(),
                        median: aggregate::quantile_sorted(&sorted, 0.5).unwrap_or_default(),
                    }
                })
                .collect(),
        ),
        ChartKind::Pie => {
            let counts = aggregate::value_counts(&ds.string_values(first)?);
            if counts.is_empty() {
                return Err(utils::no_plottable_data(chart, first));
            }
            Prepared::Pie(counts)
        }
        ChartKind::Scatter => Prepared::Points(scatter(request)?),
        ChartKind::Hexbin => {
            Prepared::Hexbin(aggregate::hexbin(&paired(request)?, request.hexbin_gridsize))
        }
        ChartKind::Kde => Prepared::Curve {
            points: aggregate::gaussian_kde(&numeric(request, 0)?, KDE_POINTS),
            step: false,
        },
        ChartKind::Ecdf => Prepared::Curve {
            points: aggregate::ecdf(&numeric(request, 0)?),
            step: true,
        },
    };
    Ok(prepared)
}

fn fmt_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

fn push_limited<I: ExactSizeIterator<Item = String>>(out: &mut String, items: I) {
    let total = items.len();
    for line in items.take(SUMMARY_LIMIT) {
        let _ = writeln!(out, "  {line}");
    }
    if total > SUMMARY_LIMIT {
        let _ = writeln!(out, "  ... and {} more", total - SUMMARY_LIMIT);
    }
}

fn summarise(request: &PlotRequest<'_>, prepared: &Prepared) -> String {
    let vars = &request.variables;
    let mut out = String::new();
    match prepared {
        Prepared::Bars { labels, heights, .. } => {
            let heading = match vars.get(1) {
                None => format!("Count of rows per {}:", vars[0]),
                Some(group) => format!("Mean {} per {group}:", vars[0]),
            };
            let _ = writeln!(out, "{heading}");
            push_limited(
                &mut out,
                labels
                    .iter()
                    .zip(heights)
                    .map(|(l, h)| format!("{l}: {}", fmt_value(*h)))
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
        }
        Prepared::Histogram(bins) => {
            let _ = writeln!(out, "{} bins of {}:", bins.len(), vars[0]);
            push_limited(
                &mut out,
                bins.iter()
                    .map(|b| format!("[{:.2}, {:.2}): {}", b.lower, b.upper, b.count))
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
        }
        Prepared::Boxes(groups) => {
            let _ = writeln!(out, "Quartiles of {}:", vars[0]);
            push_limited(
                &mut out,
                groups
                    .iter()
                    .map(|(label, s)| {
                        format!(
                            "{label}: median={:.2}, Q1={:.2}, Q3={:.2}, whiskers=[{:.2}, {:.2}], outliers={}",
                            s.median,
                            s.q1,
                            s.q3,
                            s.lower_whisker,
                            s.upper_whisker,
                            s.outliers.len()
                        )
                    })
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
        }
        Prepared::Violins(violins) => {
            let _ = writeln!(out, "Density shapes of {}:", vars[0]);
            push_limited(
                &mut out,
                violins
                    .iter()
                    .map(|v| {
                        let peak = v
                            .curve
                            .iter()
                            .max_by(|a, b| a.1.total_cmp(&b.1))
                            .map_or(v.median, |p| p.0);
                        format!(
                            "{}: n={}, median={:.2}, densest near {:.2}",
                            v.label, v.count, v.median, peak
                        )
                    })
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
        }
        Prepared::Pie(counts) => {
            let total: usize = counts.iter().map(|(_, c)| c).sum();
            let _ = writeln!(out, "Share of {} ({total} rows):", vars[0]);
            push_limited(
                &mut out,
                counts
                    .iter()
                    .map(|(l, c)| format!("{l}: {c} ({:.1}%)", *c as f64 * 100.0 / total as f64))
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
        }
        Prepared::Points(Scatter { points, hue, sizes }) => {
            let xs: Vec<Option<f64>> = points.iter().map(|p| Some(p.0)).collect();
            let ys: Vec<Option<f64>> = points.iter().map(|p| Some(p.1)).collect();
            let (x_lo, x_hi) = range_of(points.iter().map(|p| p.0));
            let (y_lo, y_hi) = range_of(points.iter().map(|p| p.1));
            let _ = writeln!(
                out,
                "{} points. {} ranges {:.2} to {:.2}; {} ranges {:.2} to {:.2}.",
                points.len(),
                vars[0],
                x_lo,
                x_hi,
                vars[1],
                y_lo,
                y_hi
            );
            if let Some(r) = aggregate::pearson(&xs, &ys) {
                let _ = writeln!(out, "Pearson correlation: {r:.2}");
            }
            match hue {
                Some(Hue::Scale { name, values }) => {
                    let (lo, hi) = range_of(values.iter().copied());
                    let _ = writeln!(out, "Colour: {name} ranges {lo:.2} to {hi:.2}.");
                }
                Some(Hue::Groups { name, labels, codes }) => {
                    let _ = writeln!(out, "Colour: {name} in {} groups:", labels.len());
                    push_limited(
                        &mut out,
                        labels
                            .iter()
                            .enumerate()
                            .map(|(g, l)| {
                                format!("{l}: {} points", codes.iter().filter(|c| **c == g).count())
                            })
                            .collect::<Vec<_>>()
                            .into_iter(),
                    );
                }
                None => {}
            }
            if let Some((name, values, _)) = sizes {
                let (lo, hi) = range_of(values.iter().copied());
                let _ = writeln!(out, "Size: {name} ranges {lo:.2} to {hi:.2}.");
            }
        }
        Prepared::Hexbin(grid) => {
            let total: usize = grid.cells.iter().map(|c| c.count).sum();
            let _ = writeln!(
                out,
                "{total} points in {} occupied hexagons.",
                grid.cells.len()
            );
            if let Some(densest) = grid.cells.iter().max_by_key(|c| c.count) {
                let _ = writeln!(
                    out,
                    "Densest cell: {} points around {}={:.2}, {}={:.2}",
                    densest.count, vars[0], densest.cx, vars[1], densest.cy
                );
            }
        }
        Prepared::Curve { points, step } => {
            if *step {
                let median = points.iter().find(|p| p.1 >= 0.5).map_or(f64::NAN, |p| p.0);
                let (lo, hi) = range_of(points.iter().map(|p| p.0));
                let _ = writeln!(
                    out,
                    "{} values of {} from {:.2} to {:.2}; half are at or below {:.2}.",
                    points.len(),
                    vars[0],
                    lo,
                    hi,
                    median
                );
            } else if let Some(peak) = points.iter().max_by(|a, b| a.1.total_cmp(&b.1)) {
                let _ = writeln!(
                    out,
                    "Estimated density of {} peaks at {:.2} (density {:.4}).",
                    vars[0], peak.0, peak.1
                );
            }
        }
    }
    out
}

fn range_of(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if lo == hi {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

fn index_label(x: f64, labels: &[String]) -> String {
    let idx = x.round();
    if (x - idx).abs() > 1e-6 || idx < 0.0 {
        return String::new();
    }
    labels.get(idx as usize).cloned().unwrap_or_default()
}

fn segment_label(x: &SegmentValue<usize>, labels: &[String]) -> String {
    match x {
        SegmentValue::CenterOf(idx) => labels.get(*idx).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

fn shade(count: usize, max: usize) -> RGBColor {
    let t = if max <= 1 {
        1.0
    } else {
        (count as f64 - 1.0) / (max as f64 - 1.0)
    };
    gradient(t)
}

fn gradient(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    RGBColor(
        mix(LOW_DENSITY.0, HIGH_DENSITY.0),
        mix(LOW_DENSITY.1, HIGH_DENSITY.1),
        mix(LOW_DENSITY.2, HIGH_DENSITY.2),
    )
}

fn draw<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    prepared: &Prepared,
) -> DrawResult<DB> {
    root.fill(&WHITE)?;
    match prepared {
        Prepared::Bars {
            labels,
            heights,
            horizontal: false,
        } => draw_columns(root, request, labels, heights),
        Prepared::Bars {
            labels,
            heights,
            horizontal: true,
        } => draw_rows(root, request, labels, heights),
        Prepared::Histogram(bins) => draw_histogram(root, request, bins),
        Prepared::Boxes(groups) => draw_boxes(root, request, groups),
        Prepared::Violins(violins) => draw_violins(root, request, violins),
        Prepared::Pie(counts) => draw_pie(root, request, counts),
        Prepared::Points(scatter) => draw_points(root, request, scatter),
        Prepared::Hexbin(grid) => draw_hexbin(root, request, grid),
        Prepared::Curve { points, step } => draw_curve(root, request, points, *step),
    }
}

fn value_span(heights: &[f64]) -> (f64, f64) {
    let top = heights.iter().copied().fold(0.0, f64::max) * 1.1;
    let bottom = heights.iter().copied().fold(0.0, f64::min) * 1.1;
    if top == bottom {
        (bottom, bottom + 1.0)
    } else {
        (bottom, top)
    }
}

fn draw_columns<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    labels: &[String],
    heights: &[f64],
) -> DrawResult<DB> {
    let n = labels.len();
    let (bottom, top) = value_span(heights);
    let mut chart = ChartBuilder::on(root)
        .caption(&request.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d((0..n).into_segmented(), bottom..top)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|x| segment_label(x, labels))
        .x_desc(request.x_label.as_str())
        .y_desc(request.y_label.as_str())
        .draw()?;
    chart.draw_series(heights.iter().enumerate().map(|(i, h)| {
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *h)],
            PALETTE[0].filled(),
        );
        bar.set_margin(0, 0, 6, 6);
        bar
    }))?;
    Ok(())
}

fn draw_rows<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    labels: &[String],
    heights: &[f64],
) -> DrawResult<DB> {
    let n = labels.len();
    let (left, right) = value_span(heights);
    // Largest bar on top.
    let flipped: Vec<String> = labels.iter().rev().cloned().collect();
    let mut chart = ChartBuilder::on(root)
        .caption(&request.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(120)
        .build_cartesian_2d(left..right, (0..n).into_segmented())?;
    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n)
        .y_label_formatter(&|y| segment_label(y, &flipped))
        .x_desc(request.x_label.as_str())
        .y_desc(request.y_label.as_str())
        .draw()?;
    chart.draw_series(heights.iter().enumerate().map(|(i, h)| {
        let row = n - 1 - i;
        let mut bar = Rectangle::new(
            [(0.0, SegmentValue::Exact(row)), (*h, SegmentValue::Exact(row + 1))],
            PALETTE[0].filled(),
        );
        bar.set_margin(4, 4, 0, 0);
        bar
    }))?;
    Ok(())
}

fn draw_histogram<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    bins: &[Bin],
) -> DrawResult<DB> {
    let lo = bins.first().map_or(0.0, |b| b.lower);
    let hi = bins.last().map_or(1.0, |b| b.upper);
    let top = bins.iter().map(|b| b.count).max().unwrap_or(0).max(1) as f64 * 1.1;
    let mut chart = ChartBuilder::on(root)
        .caption(&request.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, 0f64..top)?;
    chart
        .configure_mesh()
        .x_desc(request.x_label.as_str())
        .y_desc(request.y_label.as_str())
        .draw()?;
    chart.draw_series(bins.iter().map(|b| {
        Rectangle::new(
            [(b.lower, 0.0), (b.upper, b.count as f64)],
            PALETTE[0].mix(0.85).filled(),
        )
    }))?;
    chart.draw_series(bins.iter().map(|b| {
        Rectangle::new([(b.lower, 0.0), (b.upper, b.count as f64)], BLACK.stroke_width(1))
    }))?;
    Ok(())
}

fn draw_boxes<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    groups: &[(String, BoxStats)],
) -> DrawResult<DB> {
    let n = groups.len();
    let labels: Vec<String> = groups.iter().map(|(l, _)| l.clone()).collect();
    let (lo, hi) = range_of(groups.iter().flat_map(|(_, s)| {
        s.outliers
            .iter()
            .copied()
            .chain([s.lower_whisker, s.upper_whisker])
    }));
    let (lo, hi) = padded(lo, hi);
    let mut chart = ChartBuilder::on(root)
        .caption(&request.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), lo..hi)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n + 1)
        .x_label_formatter(&|x| index_label(*x, &labels))
        .x_desc(request.x_label.as_str())
        .y_desc(request.y_label.as_str())
        .draw()?;
    let half = 0.25;
    chart.draw_series(groups.iter().enumerate().map(|(i, (_, s))| {
        let x = i as f64;
        Rectangle::new(
            [(x - half, s.q1), (x + half, s.q3)],
            PALETTE[i % PALETTE.len()].mix(0.6).filled(),
        )
    }))?;
    chart.draw_series(groups.iter().enumerate().map(|(i, (_, s))| {
        let x = i as f64;
        Rectangle::new([(x - half, s.q1), (x + half, s.q3)], BLACK.stroke_width(1))
    }))?;
    chart.draw_series(groups.iter().enumerate().flat_map(|(i, (_, s))| {
        let x = i as f64;
        let cap = half / 2.0;
        [
            vec![(x - half, s.median), (x + half, s.median)],
            vec![(x, s.q3), (x, s.upper_whisker)],
            vec![(x, s.q1), (x, s.lower_whisker)],
            vec![(x - cap, s.upper_whisker), (x + cap, s.upper_whisker)],
            vec![(x - cap, s.lower_whisker), (x + cap, s.lower_whisker)],
        ]
        .into_iter()
        .map(|path| PathElement::new(path, BLACK.stroke_width(2)))
    }))?;
    chart.draw_series(groups.iter().enumerate().flat_map(|(i, (_, s))| {
        s.outliers
            .iter()
            .map(move |o| Circle::new((i as f64, *o), 3, BLACK.stroke_width(1)))
    }))?;
    Ok(())
}

fn draw_violins<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    violins: &[Violin],
) -> DrawResult<DB> {
    let n = violins.len();
    let labels: Vec<String> = violins.iter().map(|v| v.label.clone()).collect();
    let (lo, hi) = range_of(violins.iter().flat_map(|v| v.curve.iter().map(|p| p.0)));
    let (lo, hi) = padded(lo, hi);
    let mut chart = ChartBuilder::on(root)
        .caption(&request.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), lo..hi)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n + 1)
        .x_label_formatter(&|x| index_label(*x, &labels))
        .x_desc(request.x_label.as_str())
        .y_desc(request.y_label.as_str())
        .draw()?;
    chart.draw_series(violins.iter().enumerate().map(|(i, v)| {
        let x = i as f64;
        let peak = v.curve.iter().map(|p| p.1).fold(0.0, f64::max);
        let scale = if peak > 0.0 { 0.4 / peak } else { 0.0 };
        let right = v.curve.iter().map(|(y, d)| (x + d * scale, *y));
        let left = v.curve.iter().rev().map(|(y, d)| (x - d * scale, *y));
        Polygon::new(
            right.chain(left).collect::<Vec<_>>(),
            PALETTE[i % PALETTE.len()].mix(0.6).filled(),
        )
    }))?;
    chart.draw_series(violins.iter().enumerate().map(|(i, v)| {
        let x = i as f64;
        PathElement::new(
            vec![(x - 0.1, v.median), (x + 0.1, v.median)],
            BLACK.stroke_width(2),
        )
    }))?;
    Ok(())
}

fn draw_pie<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    counts: &[(String, usize)],
) -> DrawResult<DB> {
    let area = root.titled(&request.title, (FONT, 22))?;
    let (w, h) = area.dim_in_pixel();
    let (cx, cy) = (f64::from(w) / 2.0, f64::from(h) / 2.0);
    let radius = f64::from(w.min(h)) * 0.35;
    let total: usize = counts.iter().map(|(_, c)| c).sum();
    let label_style = TextStyle::from((FONT, 14).into_font()).pos(Pos::new(HPos::Center, VPos::Center));
    let mut start = -PI / 2.0;
    for (i, (label, count)) in counts.iter().enumerate() {
        let frac = *count as f64 / total as f64;
        let sweep = frac * 2.0 * PI;
        let steps = ((frac * 120.0).ceil() as usize).max(2);
        let mut points = vec![(cx.round() as i32, cy.round() as i32)];
        points.extend((0..=steps).map(|s| {
            let angle = start + sweep * s as f64 / steps as f64;
            (
                (cx + radius * angle.cos()).round() as i32,
                (cy + radius * angle.sin()).round() as i32,
            )
        }));
        area.draw(&Polygon::new(points, PALETTE[i % PALETTE.len()].filled()))?;
        let mid = start + sweep / 2.0;
        let at = (
            (cx + radius * 1.2 * mid.cos()).round() as i32,
            (cy + radius * 1.2 * mid.sin()).round() as i32,
        );
        area.draw(&Text::new(
            format!("{label} ({:.1}%)", frac * 100.0),
            at,
            label_style.clone(),
        ))?;
        start += sweep;
    }
    Ok(())
}

fn draw_points<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    scatter: &Scatter,
) -> DrawResult<DB> {
    let points = &scatter.points;
    let radius = |i: usize| {
        scatter
            .sizes
            .as_ref()
            .and_then(|(_, _, radii)| radii.get(i).copied())
            .unwrap_or(3)
    };
    let (x_lo, x_hi) = padded_range(points.iter().map(|p| p.0));
    let (y_lo, y_hi) = padded_range(points.iter().map(|p| p.1));
    let mut chart = ChartBuilder::on(root)
        .caption(&request.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    chart
        .configure_mesh()
        .x_desc(request.x_label.as_str())
        .y_desc(request.y_label.as_str())
        .draw()?;
    match &scatter.hue {
        None => {
            chart.draw_series(
                points
                    .iter()
                    .enumerate()
                    .map(|(i, p)| Circle::new(*p, radius(i), PALETTE[0].mix(0.7).filled())),
            )?;
        }
        Some(Hue::Scale { values, .. }) => {
            let (lo, hi) = range_of(values.iter().copied());
            chart.draw_series(points.iter().zip(values).enumerate().map(|(i, (p, v))| {
                let t = if hi > lo { (v - lo) / (hi - lo) } else { 0.5 };
                Circle::new(*p, radius(i), gradient(t).mix(0.8).filled())
            }))?;
        }
        Some(Hue::Groups { labels, codes, .. }) => {
            for (g, label) in labels.iter().enumerate() {
                let colour = PALETTE[g % PALETTE.len()];
                chart
                    .draw_series(
                        points
                            .iter()
                            .zip(codes)
                            .enumerate()
                            .filter(|(_, (_, code))| **code == g)
                            .map(|(i, (p, _))| Circle::new(*p, radius(i), colour.mix(0.7).filled())),
                    )?
                    .label(label.as_str())
                    .legend(move |(x, y)| Circle::new((x, y), 4, colour.filled()));
            }
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
    }
    Ok(())
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = range_of(values);
    padded(lo, hi)
}

fn draw_hexbin<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    grid: &HexGrid,
) -> DrawResult<DB> {
    let (x_lo, x_hi) = range_of(grid.cells.iter().map(|c| c.cx));
    let (y_lo, y_hi) = range_of(grid.cells.iter().map(|c| c.cy));
    let (x_lo, x_hi) = padded(x_lo - grid.sx, x_hi + grid.sx);
    let (y_lo, y_hi) = padded(y_lo - grid.sy, y_hi + grid.sy);
    let max = grid.max_count();
    let mut chart = ChartBuilder::on(root)
        .caption(&request.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    chart
        .configure_mesh()
        .x_desc(request.x_label.as_str())
        .y_desc(request.y_label.as_str())
        .draw()?;
    chart.draw_series(
        grid.cells
            .iter()
            .map(|cell| Polygon::new(grid.hexagon(cell), shade(cell.count, max).filled())),
    )?;
    Ok(())
}

fn draw_curve<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    request: &PlotRequest<'_>,
    points: &[(f64, f64)],
    step: bool,
) -> DrawResult<DB> {
    let (x_lo, x_hi) = padded_range(points.iter().map(|p| p.0));
    let top = points.iter().map(|p| p.1).fold(0.0, f64::max);
    let top = if step { 1.05 } else { (top * 1.1).max(f64::EPSILON) };
    let mut chart = ChartBuilder::on(root)
        .caption(&request.title, (FONT, 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, 0f64..top)?;
    chart
        .configure_mesh()
        .x_desc(request.x_label.as_str())
        .y_desc(request.y_label.as_str())
        .draw()?;
    if step {
        let mut stepped = Vec::with_capacity(points.len() * 2 + 1);
        let mut level = 0.0;
        stepped.push((x_lo, 0.0));
        for (x, y) in points {
            stepped.push((*x, level));
            stepped.push((*x, *y));
            level = *y;
        }
        stepped.push((x_hi, level));
        chart.draw_series(LineSeries::new(stepped, PALETTE[0].stroke_width(2)))?;
    } else {
        chart.draw_series(
            AreaSeries::new(points.iter().copied(), 0.0, PALETTE[0].mix(0.2))
                .border_style(PALETTE[0].stroke_width(2)),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_titles() {
        let one = vec!["region".to_string()];
        let two = vec!["sales".to_string(), "region".to_string()];
        assert_eq!(default_labels(ChartKind::Bar, &one).0, "Bar plot of region");
        assert_eq!(default_labels(ChartKind::Bar, &two).0, "sales by region");
        assert_eq!(default_labels(ChartKind::Hist, &one).2, "Frequency");
        assert_eq!(
            default_labels(ChartKind::Hexbin, &["a".into(), "b".into()]).0,
            "Hexbin: a vs b"
        );
        assert_eq!(default_labels(ChartKind::Pie, &one).0, "Pie chart of region");
    }

    #[test]
    fn test_index_labels_only_on_integers() {
        let labels = vec!["a".to_string(), "b".to_string()];
        assert_eq!(index_label(1.0, &labels), "b");
        assert_eq!(index_label(0.5, &labels), "");
        assert_eq!(index_label(-1.0, &labels), "");
        assert_eq!(index_label(5.0, &labels), "");
    }

    #[test]
    fn test_radii_follow_magnitude() {
        assert_eq!(radii(&[0.0, -5.0, 10.0]), vec![2, 7, 12]);
        assert_eq!(radii(&[4.0, 4.0]), vec![7, 7]);
    }

    #[test]
    fn test_shade_spans_palette() {
        assert_eq!(shade(1, 10), LOW_DENSITY);
        assert_eq!(shade(10, 10), HIGH_DENSITY);
    }
}
