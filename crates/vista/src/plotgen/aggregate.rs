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

//! Statistics behind each chart kind. Pure functions over plain slices.

use crate::config::MAX_BINS;
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexCell {
    pub cx: f64,
    pub cy: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HexGrid {
    pub cells: Vec<HexCell>,
    /// Horizontal and vertical lattice spacing.
    pub sx: f64,
    pub sy: f64,
}

impl HexGrid {
    pub fn max_count(&self) -> usize {
        self.cells.iter().map(|c| c.count).max().unwrap_or(0)
    }

    /// Vertices of the hexagon around a cell centre.
    pub fn hexagon(&self, cell: &HexCell) -> Vec<(f64, f64)> {
        const OFFSETS: [(f64, f64); 6] = [
            (0.5, -0.5),
            (0.5, 0.5),
            (0.0, 1.0),
            (-0.5, 0.5),
            (-0.5, -0.5),
            (0.0, -1.0),
        ];
        OFFSETS
            .iter()
            .map(|(dx, dy)| (cell.cx + dx * self.sx, cell.cy + dy * self.sy / 3.0))
            .collect()
    }
}

/// Category frequencies, most frequent first; ties keep label order.
pub fn value_counts(values: &[Option<String>]) -> Vec<(String, usize)> {
    values
        .iter()
        .flatten()
        .counts()
        .into_iter()
        .map(|(label, count)| (label.clone(), count))
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .collect()
}

/// Mean of `values` within each group, largest mean first. Rows where either side is null are skipped.
pub fn group_means(values: &[Option<f64>], groups: &[Option<String>]) -> Vec<(String, f64)> {
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
    for (value, group) in values.iter().zip(groups) {
        if let (Some(v), Some(g)) = (value, group) {
            let entry = sums.entry(g.as_str()).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(group, (sum, n))| (group.to_string(), sum / n as f64))
        .sorted_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .collect()
}

/// Values of `values` grouped by label, groups in label order.
pub fn split_by_group(values: &[Option<f64>], groups: &[Option<String>]) -> Vec<(String, Vec<f64>)> {
    let mut split: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (value, group) in values.iter().zip(groups) {
        if let (Some(v), Some(g)) = (value, group) {
            split.entry(g.clone()).or_default().push(*v);
        }
    }
    split.into_iter().collect()
}

pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().copied().minmax().into_option()
}

/// Equal-width bins over `[min, max]`; the last bin is closed on the right.
/// `bins` is clamped to `1..=MAX_BINS`.
pub fn histogram(values: &[f64], bins: usize) -> Vec<Bin> {
    let Some((mut lo, mut hi)) = min_max(values) else {
        return Vec::new();
    };
    let bins = bins.clamp(1, MAX_BINS);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bin {
            lower: lo + i as f64 * width,
            upper: lo + (i + 1) as f64 * width,
            count,
        })
        .collect()
}

/// Linear-interpolated quantile of already sorted values.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

pub(crate) fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Quartiles with whiskers at the most extreme points inside 1.5 IQR.
pub fn box_stats(values: &[f64]) -> Option<BoxStats> {
    let sorted = sorted_copy(values);
    let q1 = quantile_sorted(&sorted, 0.25)?;
    let median = quantile_sorted(&sorted, 0.5)?;
    let q3 = quantile_sorted(&sorted, 0.75)?;
    let iqr = q3 - q1;
    let (low_fence, high_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let inside = sorted.iter().filter(|v| (low_fence..=high_fence).contains(*v));
    let (lower_whisker, upper_whisker) = inside
        .copied()
        .minmax()
        .into_option()
        .unwrap_or((q1, q3));
    let outliers = sorted
        .iter()
        .copied()
        .filter(|v| *v < low_fence || *v > high_fence)
        .collect();
    Some(BoxStats {
        q1,
        median,
        q3,
        lower_whisker,
        upper_whisker,
        outliers,
    })
}

pub(crate) fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Scott's rule bandwidth, `std * n^(-1/5)`. Degenerate samples fall back to 1.
pub fn scott_bandwidth(values: &[f64]) -> f64 {
    match sample_std(values) {
        Some(std) if std > 0.0 => std * (values.len() as f64).powf(-0.2),
        _ => 1.0,
    }
}

/// Gaussian kernel density evaluated on `points` evenly spaced positions
/// spanning three bandwidths beyond the data.
pub fn gaussian_kde(values: &[f64], points: usize) -> Vec<(f64, f64)> {
    let Some((lo, hi)) = min_max(values) else {
        return Vec::new();
    };
    let bw = scott_bandwidth(values);
    let (start, end) = (lo - 3.0 * bw, hi + 3.0 * bw);
    let points = points.max(2);
    let step = (end - start) / (points - 1) as f64;
    let norm = 1.0 / (values.len() as f64 * bw * (2.0 * std::f64::consts::PI).sqrt());
    (0..points)
        .map(|i| {
            let x = start + i as f64 * step;
            let density = values
                .iter()
                .map(|v| (-0.5 * ((x - v) / bw).powi(2)).exp())
                .sum::<f64>()
                * norm;
            (x, density)
        })
        .collect()
}

/// Sorted values paired with `i / n`.
pub fn ecdf(values: &[f64]) -> Vec<(f64, f64)> {
    let sorted = sorted_copy(values);
    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, (i + 1) as f64 / n))
        .collect()
}

/// Hexagonal binning on two interleaved rectangular lattices.
pub fn hexbin(points: &[(f64, f64)], gridsize: usize) -> HexGrid {
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let (Some((mut xmin, mut xmax)), Some((mut ymin, mut ymax))) = (min_max(&xs), min_max(&ys))
    else {
        return HexGrid {
            cells: Vec::new(),
            sx: 1.0,
            sy: 1.0,
        };
    };
    if xmin == xmax {
        xmin -= 0.5;
        xmax += 0.5;
    }
    if ymin == ymax {
        ymin -= 0.5;
        ymax += 0.5;
    }
    let nx = gridsize.max(1) as f64;
    let ny = (nx / 3f64.sqrt()).round().max(1.0);
    let sx = (xmax - xmin) / nx;
    let sy = (ymax - ymin) / ny;
    let mut counts: BTreeMap<(u8, i64, i64), usize> = BTreeMap::new();
    for (x, y) in points {
        let ix = (x - xmin) / sx;
        let iy = (y - ymin) / sy;
        let (ix1, iy1) = (ix.round(), iy.round());
        let (ix2, iy2) = (ix.floor(), iy.floor());
        let d1 = (ix - ix1).powi(2) + 3.0 * (iy - iy1).powi(2);
        let d2 = (ix - ix2 - 0.5).powi(2) + 3.0 * (iy - iy2 - 0.5).powi(2);
        let key = if d1 < d2 {
            (0, ix1 as i64, iy1 as i64)
        } else {
            (1, ix2 as i64, iy2 as i64)
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    let cells = counts
        .into_iter()
        .map(|((lattice, i, j), count)| {
            let offset = if lattice == 0 { 0.0 } else { 0.5 };
            HexCell {
                cx: xmin + (i as f64 + offset) * sx,
                cy: ymin + (j as f64 + offset) * sy,
                count,
            }
        })
        .collect();
    HexGrid { cells, sx, sy }
}

/// Pearson correlation over rows where both values are present.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    let denom = (var_x * var_y).sqrt();
    (denom > 0.0).then(|| (cov / denom).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some((*v).to_string())).collect()
    }

    #[test]
    fn test_value_counts_sorted_descending() {
        let mut values = labels(&["b", "a", "b", "c", "b", "a"]);
        values.push(None);
        let counts = value_counts(&values);
        assert_eq!(
            counts,
            vec![
                ("b".to_string(), 3),
                ("a".to_string(), 2),
                ("c".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_group_means_skip_missing_rows() {
        let values = vec![Some(10.0), Some(20.0), None, Some(4.0)];
        let groups = labels(&["x", "x", "y", "y"]);
        let means = group_means(&values, &groups);
        assert_eq!(means, vec![("x".to_string(), 15.0), ("y".to_string(), 4.0)]);
    }

    #[test]
    fn test_histogram_counts_every_value() {
        let values = [1.0, 2.0, 2.5, 3.0, 10.0];
        let bins = histogram(&values, 3);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), values.len());
        assert_eq!(bins[2].count, 1);
        assert!((bins[0].lower - 1.0).abs() < 1e-12);
        assert!((bins[2].upper - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_huge_bin_count_is_clamped() {
        let bins = histogram(&[1.0, 2.0], usize::MAX);
        assert_eq!(bins.len(), MAX_BINS);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 2);
    }

    #[test]
    fn test_constant_column_gets_one_unit_wide_range() {
        let bins = histogram(&[5.0, 5.0], 2);
        assert_eq!(bins[0].lower, 4.5);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 2);
    }

    #[test]
    fn test_box_stats_flag_outliers() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 100.0];
        let stats = box_stats(&values).unwrap();
        assert_eq!(stats.median, 5.0);
        assert_eq!(stats.q1, 3.0);
        assert_eq!(stats.q3, 7.0);
        assert_eq!(stats.outliers, vec![100.0]);
        assert_eq!(stats.upper_whisker, 8.0);
        assert_eq!(stats.lower_whisker, 1.0);
    }

    #[test]
    fn test_kde_integrates_to_about_one() {
        let values = [1.0, 2.0, 2.0, 3.0, 4.0, 4.5, 6.0];
        let curve = gaussian_kde(&values, 400);
        let step = curve[1].0 - curve[0].0;
        let area: f64 = curve.iter().map(|(_, d)| d * step).sum();
        assert!((area - 1.0).abs() < 0.02, "area was {area}");
    }

    #[test]
    fn test_ecdf_ends_at_one() {
        let steps = ecdf(&[3.0, 1.0, 2.0, 2.0]);
        assert_eq!(steps.first(), Some(&(1.0, 0.25)));
        assert_eq!(steps.last(), Some(&(3.0, 1.0)));
    }

    #[test]
    fn test_hexbin_conserves_points() {
        let points: Vec<(f64, f64)> = (0..200)
            .map(|i| (f64::from(i % 17), f64::from((i * 7) % 23)))
            .collect();
        let grid = hexbin(&points, 10);
        assert_eq!(grid.cells.iter().map(|c| c.count).sum::<usize>(), 200);
        assert!(grid.max_count() >= 1);
        assert_eq!(grid.hexagon(&grid.cells[0]).len(), 6);
    }

    #[test]
    fn test_pearson_perfect_and_undefined() {
        let x = vec![Some(1.0), Some(2.0), Some(3.0), None];
        let y = vec![Some(2.0), Some(4.0), Some(6.0), Some(1.0)];
        assert!((pearson(&x, &y).unwrap() - 1.0).abs() < 1e-12);
        let flat = vec![Some(1.0), Some(1.0), Some(1.0), Some(1.0)];
        assert!(pearson(&flat, &y).is_none());
    }
}
