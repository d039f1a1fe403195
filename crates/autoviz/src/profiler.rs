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

//! Column profiling and semantic type inference.
//!
//! Type inference is an ordered list of checks where the first match wins:
//! identifier, datetime, numeric, categorical, then text. Every statistic is
//! computed from the string tokens alone so the same table always yields the
//! same profiles.

use crate::config::{PipelineConfig, ProfilingOptions};
use crate::error::{ConfigError, ConfigResult};
use crate::table::Tabular;
use crate::values::{parse_number, DateTimeParser};
use chrono::NaiveDateTime;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;
const HIGH_NULL_SHARE: f64 = 0.3;
const MIN_CORRELATION_OBSERVATIONS: usize = 3;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Datetime,
    Text,
    Identifier,
}
impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::Datetime => "datetime",
            ColumnType::Text => "text",
            ColumnType::Identifier => "identifier",
        }
    }
}
impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: Option<f64>,
    pub q25: f64,
    pub q75: f64,
    pub outlier_count: usize,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalSummary {
    pub min: String,
    pub max: String,
    pub range_days: i64,
    pub inferred_frequency: Option<String>,
    pub has_time_component: bool,
    pub distinct_count: usize,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub position: usize,
    pub inferred_type: ColumnType,
    pub type_confidence: f64,
    pub row_count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    /// Non-null tokens that do not parse under the inferred type.
    pub unparseable_count: usize,
    pub numeric: Option<NumericSummary>,
    pub temporal: Option<TemporalSummary>,
    pub top_categories: Vec<CategoryCount>,
    pub sample_values: Vec<String>,
    pub issues: Vec<String>,
}
impl ColumnProfile {
    pub fn null_ratio(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.null_count as f64 / self.row_count as f64
        }
    }
    pub fn non_null_count(&self) -> usize {
        self.row_count - self.null_count
    }
}
impl fmt::Display for ColumnProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} distinct, {} null)",
            self.name, self.inferred_type, self.distinct_count, self.null_count
        )
    }
}
/// Pearson correlation between two numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub left: String,
    pub right: String,
    pub coefficient: f64,
    pub observations: usize,
}
impl Correlation {
    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.left == a && self.right == b) || (self.left == b && self.right == a)
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub row_count: usize,
    pub column_count: usize,
    pub numeric_count: usize,
    pub categorical_count: usize,
    pub datetime_count: usize,
    pub text_count: usize,
    pub identifier_count: usize,
    pub total_nulls: usize,
    pub completeness: f64,
    pub rejected_rows: usize,
}
impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dataset: {} rows x {} columns, {:.1}% complete",
            self.row_count,
            self.column_count,
            self.completeness * 100.0
        )
    }
}
#[derive(Debug, Clone)]
pub struct Profiler {
    options: ProfilingOptions,
    categorical_max_distinct: usize,
    identifier_pattern: Regex,
    category_pattern: Regex,
    datetime: DateTimeParser,
}
impl Profiler {
    pub fn new(config: &PipelineConfig) -> ConfigResult<Self> {
        let options = config.profiling.clone();
        let identifier_pattern = Regex::new(&options.identifier_pattern)
            .map_err(|e| ConfigError::invalid("profiling.identifier_pattern", e.to_string()))?;
        let category_pattern = Regex::new(&options.category_pattern)
            .map_err(|e| ConfigError::invalid("profiling.category_pattern", e.to_string()))?;
        Ok(Self {
            datetime: DateTimeParser::new(options.datetime_formats.clone()),
            options,
            categorical_max_distinct: config.categorical_max_distinct,
            identifier_pattern,
            category_pattern,
        })
    }
    pub fn datetime_parser(&self) -> &DateTimeParser {
        &self.datetime
    }
    /// Profiles every column. Total over any table; output follows header order.
    pub fn profile<T: Tabular + Sync>(&self, table: &T) -> Vec<ColumnProfile> {
        self.profile_with(table, |_| None)
    }
    /// Re-profiles a cleaned table, keeping the type each column had in
    /// `reference` so cleaning decisions and later stages agree on it.
    /// Columns missing from `reference` are inferred as usual.
    pub fn profile_pinned<T: Tabular + Sync>(
        &self,
        table: &T,
        reference: &[ColumnProfile],
    ) -> Vec<ColumnProfile> {
        self.profile_with(table, |name| {
            reference
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.inferred_type)
        })
    }
    fn profile_with<T, F>(&self, table: &T, pinned: F) -> Vec<ColumnProfile>
    where
        T: Tabular + Sync,
        F: Fn(&str) -> Option<ColumnType> + Sync,
    {
        let profiles: Vec<ColumnProfile> = (0..table.column_count())
            .into_par_iter()
            .map(|index| self.profile_column(table, index, pinned(&table.columns()[index])))
            .collect();
        debug!(
            columns = profiles.len(),
            rows = table.row_count(),
            "Profiled table"
        );
        profiles
    }
    fn profile_column<T: Tabular>(
        &self,
        table: &T,
        position: usize,
        pinned: Option<ColumnType>,
    ) -> ColumnProfile {
        let name = table.columns()[position].clone();
        let cells = table.column_cells(position);
        let row_count = cells.len();
        let values: Vec<&str> = cells.iter().filter_map(|cell| *cell).collect();
        let null_count = row_count - values.len();
        let distinct: IndexSet<&str> = values.iter().copied().collect();
        let (inferred_type, type_confidence) = match pinned {
            Some(kind) => (kind, self.confidence_as(kind, &values, distinct.len(), row_count)),
            None => self.infer_type(&name, &values, distinct.len(), null_count, row_count),
        };
        let mut numeric = None;
        let mut temporal = None;
        let mut unparseable_count = 0;
        match inferred_type {
            ColumnType::Numeric => {
                let parsed: Vec<f64> = values.iter().filter_map(|v| parse_number(v)).collect();
                unparseable_count = values.len() - parsed.len();
                numeric = numeric_summary(parsed);
            }
            ColumnType::Datetime => {
                let parsed: Vec<(NaiveDateTime, bool)> = values
                    .iter()
                    .filter_map(|v| self.datetime.parse(v))
                    .map(|p| (p.value, p.has_time))
                    .collect();
                unparseable_count = values.len() - parsed.len();
                temporal = temporal_summary(parsed);
            }
            _ => {}
        }
        let top_categories = if matches!(
            inferred_type,
            ColumnType::Categorical | ColumnType::Text
        ) {
            top_categories(&values, self.options.top_k)
        } else {
            Vec::new()
        };
        let sample_values = distinct
            .iter()
            .take(self.options.sample_size)
            .map(|v| v.to_string())
            .collect();
        let mut profile = ColumnProfile {
            name,
            position,
            inferred_type,
            type_confidence,
            row_count,
            null_count,
            distinct_count: distinct.len(),
            unparseable_count,
            numeric,
            temporal,
            top_categories,
            sample_values,
            issues: Vec::new(),
        };
        profile.issues = self.detect_quality_issues(&profile);
        profile
    }
    fn infer_type(
        &self,
        name: &str,
        values: &[&str],
        distinct: usize,
        null_count: usize,
        row_count: usize,
    ) -> (ColumnType, f64) {
        if values.is_empty() {
            return if self.category_pattern.is_match(name) {
                (ColumnType::Categorical, 0.0)
            } else {
                (ColumnType::Text, 0.0)
            };
        }
        if self.identifier_pattern.is_match(name) && null_count == 0 && distinct == values.len() {
            return (ColumnType::Identifier, 1.0);
        }
        let total = values.len() as f64;
        let datetime_share =
            values.iter().filter(|v| self.datetime.is_datetime(v)).count() as f64 / total;
        if datetime_share >= self.options.type_confidence {
            return (ColumnType::Datetime, datetime_share);
        }
        let numeric_share = values.iter().filter(|v| parse_number(v).is_some()).count() as f64 / total;
        if numeric_share >= self.options.type_confidence {
            return (ColumnType::Numeric, numeric_share);
        }
        let distinct_ratio = distinct as f64 / row_count as f64;
        if distinct <= self.categorical_max_distinct || distinct_ratio <= self.options.categorical_ratio
        {
            return (ColumnType::Categorical, 1.0 - distinct_ratio);
        }
        (ColumnType::Text, 1.0)
    }
    fn confidence_as(
        &self,
        kind: ColumnType,
        values: &[&str],
        distinct: usize,
        row_count: usize,
    ) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let share = |hits: usize| hits as f64 / values.len() as f64;
        match kind {
            ColumnType::Datetime => {
                share(values.iter().filter(|v| self.datetime.is_datetime(v)).count())
            }
            ColumnType::Numeric => {
                share(values.iter().filter(|v| parse_number(v).is_some()).count())
            }
            ColumnType::Categorical => 1.0 - distinct as f64 / row_count as f64,
            ColumnType::Identifier | ColumnType::Text => 1.0,
        }
    }
    fn detect_quality_issues(&self, profile: &ColumnProfile) -> Vec<String> {
        let mut issues = Vec::new();
        let null_ratio = profile.null_ratio();
        if null_ratio > HIGH_NULL_SHARE {
            issues.push(format!("High null share: {:.1}%", null_ratio * 100.0));
        }
        if profile.distinct_count == 1 && profile.non_null_count() > 1 {
            issues.push("Single unique value (constant column)".to_string());
        }
        if profile.unparseable_count > 0 {
            issues.push(format!(
                "{} values do not parse as {}",
                profile.unparseable_count, profile.inferred_type
            ));
        }
        match profile.inferred_type {
            ColumnType::Categorical if profile.distinct_count > self.categorical_max_distinct => {
                issues.push(format!(
                    "High cardinality: {} unique values",
                    profile.distinct_count
                ));
            }
            ColumnType::Numeric => {
                if let Some(stats) = &profile.numeric {
                    if stats.outlier_count > profile.non_null_count() / 10 {
                        issues.push(format!("High outlier count: {}", stats.outlier_count));
                    }
                }
            }
            ColumnType::Datetime => {
                if let Some(stats) = &profile.temporal {
                    if stats.distinct_count < profile.non_null_count() / 10
                        && profile.non_null_count() > 20
                    {
                        issues.push("Sparse temporal data with many repeated timestamps".to_string());
                    }
                }
            }
            _ => {}
        }
        issues
    }
}
fn numeric_summary(mut values: Vec<f64>) -> Option<NumericSummary> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let min = values[0];
    let max = values[values.len() - 1];
    // Moments are taken over values scaled into [-1, 1] so sums stay finite near f64::MAX.
    let scale = min.abs().max(max.abs());
    let (mean, std_dev) = if scale > 0.0 {
        let (mean, spread) = scaled_moments(&values, scale);
        (mean * scale, spread.map(|s| s * scale).filter(|s| s.is_finite()))
    } else {
        (0.0, (values.len() > 1).then_some(0.0))
    };
    let q25 = linear_quantile(&values, 0.25);
    let q75 = linear_quantile(&values, 0.75);
    let iqr = q75 - q25;
    let outlier_count = if iqr > 0.0 && iqr.is_finite() {
        let lower = q25 - 1.5 * iqr;
        let upper = q75 + 1.5 * iqr;
        values.iter().filter(|&&v| v < lower || v > upper).count()
    } else {
        0
    };
    Some(NumericSummary {
        min,
        max,
        mean,
        median: linear_quantile(&values, 0.5),
        std_dev,
        q25,
        q75,
        outlier_count,
    })
}
/// Welford mean and sample deviation of `values / scale`.
fn scaled_moments(values: &[f64], scale: f64) -> (f64, Option<f64>) {
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (seen, value) in values.iter().enumerate() {
        let x = value / scale;
        let delta = x - mean;
        mean += delta / (seen + 1) as f64;
        m2 += delta * (x - mean);
    }
    let spread = (values.len() > 1).then(|| (m2 / (values.len() - 1) as f64).sqrt());
    (mean, spread)
}
/// Linear interpolation between closest ranks; `sorted` must be non-empty.
pub(crate) fn linear_quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    let gap = sorted[upper] - sorted[lower];
    if gap.is_finite() {
        sorted[lower] + gap * weight
    } else {
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}
fn temporal_summary(mut values: Vec<(NaiveDateTime, bool)>) -> Option<TemporalSummary> {
    if values.is_empty() {
        return None;
    }
    let has_time_component = values.iter().any(|(_, has_time)| *has_time);
    values.sort();
    let stamps: Vec<NaiveDateTime> = values.into_iter().map(|(v, _)| v).dedup().collect();
    let first = stamps[0];
    let last = stamps[stamps.len() - 1];
    let render = |dt: NaiveDateTime| {
        if has_time_component {
            dt.format("%Y-%m-%dT%H:%M:%S").to_string()
        } else {
            dt.format("%Y-%m-%d").to_string()
        }
    };
    Some(TemporalSummary {
        min: render(first),
        max: render(last),
        range_days: last.signed_duration_since(first).num_days(),
        inferred_frequency: infer_frequency(&stamps),
        has_time_component,
        distinct_count: stamps.len(),
    })
}
/// Most common gap between consecutive distinct timestamps; ties go to the
/// smallest gap.
fn infer_frequency(stamps: &[NaiveDateTime]) -> Option<String> {
    if stamps.len() < 2 {
        return None;
    }
    let mut delta_counts: BTreeMap<i64, usize> = BTreeMap::new();
    for pair in stamps.windows(2) {
        let delta = pair[1].signed_duration_since(pair[0]).num_seconds();
        *delta_counts.entry(delta).or_insert(0) += 1;
    }
    let mut best: Option<(i64, usize)> = None;
    for (&delta, &count) in &delta_counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((delta, count));
        }
    }
    let (delta, _) = best?;
    let frequency = match delta {
        d if d >= 365 * 86_400 => "yearly",
        d if d >= 28 * 86_400 => "monthly",
        d if d >= 7 * 86_400 => "weekly",
        d if d >= 86_400 => "daily",
        d if d >= 3_600 => "hourly",
        d if d >= 60 => "minutely",
        _ => "irregular",
    };
    Some(frequency.to_string())
}
/// Counts in first-occurrence order, then a stable sort by count so ties keep
/// that order.
fn top_categories(values: &[&str], k: usize) -> Vec<CategoryCount> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for &value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1))
        .take(k)
        .map(|(value, count)| CategoryCount {
            value: value.to_string(),
            count,
        })
        .collect()
}
/// Pairwise Pearson correlations between the numeric columns in `profiles`,
/// in header order. Pairs with fewer than three co-present values or a
/// constant side are skipped.
pub fn correlate<T: Tabular>(table: &T, profiles: &[ColumnProfile]) -> Vec<Correlation> {
    let numeric: Vec<(&ColumnProfile, Vec<Option<f64>>)> = profiles
        .iter()
        .filter(|p| p.inferred_type == ColumnType::Numeric)
        .filter_map(|p| {
            let index = table.column_index(&p.name)?;
            let values = table
                .column_cells(index)
                .into_iter()
                .map(|cell| cell.and_then(parse_number))
                .collect();
            Some((p, values))
        })
        .collect();
    let mut correlations = Vec::new();
    for (i, (left, left_values)) in numeric.iter().enumerate() {
        for (right, right_values) in &numeric[i + 1..] {
            let pairs: Vec<(f64, f64)> = left_values
                .iter()
                .zip(right_values)
                .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                .collect();
            if let Some(coefficient) = pearson(&pairs) {
                correlations.push(Correlation {
                    left: left.name.clone(),
                    right: right.name.clone(),
                    coefficient,
                    observations: pairs.len(),
                });
            }
        }
    }
    correlations
}
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < MIN_CORRELATION_OBSERVATIONS {
        return None;
    }
    let n = pairs.len() as f64;
    // r is scale invariant, so both axes are brought into [-1, 1] first.
    let scale_x = pairs.iter().fold(0.0_f64, |m, (x, _)| m.max(x.abs()));
    let scale_y = pairs.iter().fold(0.0_f64, |m, (_, y)| m.max(y.abs()));
    if scale_x == 0.0 || scale_y == 0.0 {
        return None;
    }
    let mean_x = pairs.iter().map(|(x, _)| x / scale_x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y / scale_y).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x / scale_x - mean_x;
        let dy = y / scale_y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}
/// Dataset-level view used for reporting and prompt building.
pub fn summarize<T: Tabular>(profiles: &[ColumnProfile], table: &T) -> DatasetSummary {
    let count = |t: ColumnType| profiles.iter().filter(|p| p.inferred_type == t).count();
    let total_nulls: usize = profiles.iter().map(|p| p.null_count).sum();
    let cells = table.row_count() * profiles.len();
    DatasetSummary {
        row_count: table.row_count(),
        column_count: profiles.len(),
        numeric_count: count(ColumnType::Numeric),
        categorical_count: count(ColumnType::Categorical),
        datetime_count: count(ColumnType::Datetime),
        text_count: count(ColumnType::Text),
        identifier_count: count(ColumnType::Identifier),
        total_nulls,
        completeness: if cells == 0 {
            1.0
        } else {
            1.0 - total_nulls as f64 / cells as f64
        },
        rejected_rows: table.rejected_rows().len(),
    }
}
