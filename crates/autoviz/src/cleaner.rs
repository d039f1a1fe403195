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

//! Profile-driven remediation.
//!
//! Steps always run in the same order: drop sparse columns, coerce
//! unparseable numeric/datetime tokens to null, drop empty rows, remove
//! duplicate rows, then impute numeric (median) and categorical (mode) gaps.
//! Every step that changes something appends exactly one action per column
//! (or one table-wide action) to the log.

use crate::config::PipelineConfig;
use crate::error::CleanError;
use crate::profiler::{linear_quantile, ColumnProfile, ColumnType};
use crate::table::{Cell, CleanTable, RawTable, Tabular};
use crate::values::{format_number, parse_number, DateTimeParser};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Impute,
    Coerce,
    DropRow,
    DropColumn,
    Dedupe,
}
impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Impute => "impute",
            ActionKind::Coerce => "coerce",
            ActionKind::DropRow => "drop_row",
            ActionKind::DropColumn => "drop_column",
            ActionKind::Dedupe => "dedupe",
        };
        f.write_str(name)
    }
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningAction {
    pub sequence: u64,
    /// `None` for table-wide actions (row drops and deduplication).
    pub column: Option<String>,
    pub kind: ActionKind,
    pub rationale: String,
    pub affected_row_count: usize,
    /// Value written into the affected cells, for imputations.
    pub replacement: Option<String>,
}
impl fmt::Display for CleaningAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}: {} ({} rows)",
            self.sequence,
            self.kind,
            self.column.as_deref().unwrap_or("*"),
            self.rationale,
            self.affected_row_count
        )
    }
}
/// Append-only record of remediation. Entries are never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CleaningLog {
    actions: Vec<CleaningAction>,
}
impl CleaningLog {
    fn record(
        &mut self,
        column: Option<&str>,
        kind: ActionKind,
        rationale: String,
        affected_row_count: usize,
        replacement: Option<String>,
    ) -> u64 {
        let sequence = self.actions.len() as u64 + 1;
        debug!(
            sequence,
            kind = %kind,
            column = column.unwrap_or("*"),
            affected_row_count,
            "Recorded cleaning action"
        );
        self.actions.push(CleaningAction {
            sequence,
            column: column.map(str::to_string),
            kind,
            rationale,
            affected_row_count,
            replacement,
        });
        sequence
    }
    pub fn actions(&self) -> &[CleaningAction] {
        &self.actions
    }
    pub fn iter(&self) -> impl Iterator<Item = &CleaningAction> {
        self.actions.iter()
    }
    pub fn len(&self) -> usize {
        self.actions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
    pub fn of_kind(&self, kind: ActionKind) -> impl Iterator<Item = &CleaningAction> {
        self.actions.iter().filter(move |a| a.kind == kind)
    }
    pub fn sequences(&self) -> Vec<u64> {
        self.actions.iter().map(|a| a.sequence).collect()
    }
}
#[derive(Debug, Clone)]
pub struct Cleaner {
    null_drop_threshold: f64,
    datetime: DateTimeParser,
}
struct Working {
    columns: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<Cell>>,
}
impl Working {
    fn remove_columns(&mut self, drop: &[usize]) {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|i| !drop.contains(i))
            .collect();
        self.columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        self.types = keep.iter().map(|&i| self.types[i]).collect();
        for row in &mut self.rows {
            *row = keep.iter().map(|&i| row[i].take()).collect();
        }
        if self.columns.is_empty() {
            self.rows.clear();
        }
    }
    fn missing(&self, column: usize) -> usize {
        self.rows.iter().filter(|row| row[column].is_none()).count()
    }
    fn fill(&mut self, column: usize, value: &str) {
        for row in &mut self.rows {
            if row[column].is_none() {
                row[column] = Some(value.to_string());
            }
        }
    }
}
impl Cleaner {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            null_drop_threshold: config.null_drop_threshold,
            datetime: DateTimeParser::new(config.profiling.datetime_formats.clone()),
        }
    }
    pub fn clean(
        &self,
        table: &RawTable,
        profiles: &[ColumnProfile],
    ) -> Result<(CleanTable, CleaningLog), CleanError> {
        let found: Vec<String> = profiles.iter().map(|p| p.name.clone()).collect();
        if found.as_slice() != table.columns() {
            return Err(CleanError::ProfileMismatch {
                expected: table.columns().to_vec(),
                found,
            });
        }
        let mut log = CleaningLog::default();
        let mut work = Working {
            columns: table.columns().to_vec(),
            types: profiles.iter().map(|p| p.inferred_type).collect(),
            rows: table.rows().to_vec(),
        };
        self.drop_sparse_columns(&mut work, profiles, &mut log);
        self.coerce(&mut work, &mut log);
        drop_empty_rows(&mut work, &mut log);
        dedupe(&mut work, &mut log);
        impute(&mut work, &mut log);
        info!(
            actions = log.len(),
            rows = work.rows.len(),
            columns = work.columns.len(),
            "Cleaned table"
        );
        let clean = CleanTable::new(table.id(), work.columns, work.rows, log.sequences());
        Ok((clean, log))
    }
    fn drop_sparse_columns(
        &self,
        work: &mut Working,
        profiles: &[ColumnProfile],
        log: &mut CleaningLog,
    ) {
        let mut drop = Vec::new();
        for (index, profile) in profiles.iter().enumerate() {
            let ratio = profile.null_ratio();
            if profile.row_count > 0 && ratio >= self.null_drop_threshold {
                log.record(
                    Some(profile.name.as_str()),
                    ActionKind::DropColumn,
                    format!(
                        "{:.1}% of values are null (ceiling {:.1}%)",
                        ratio * 100.0,
                        self.null_drop_threshold * 100.0
                    ),
                    profile.row_count,
                    None,
                );
                drop.push(index);
            }
        }
        if !drop.is_empty() {
            work.remove_columns(&drop);
        }
    }
    fn coerce(&self, work: &mut Working, log: &mut CleaningLog) {
        for column in 0..work.columns.len() {
            let ty = work.types[column];
            let parses = |value: &str| match ty {
                ColumnType::Numeric => parse_number(value).is_some(),
                ColumnType::Datetime => self.datetime.is_datetime(value),
                _ => true,
            };
            let mut coerced = 0;
            for row in &mut work.rows {
                if row[column].as_deref().is_some_and(|v| !parses(v)) {
                    row[column] = None;
                    coerced += 1;
                }
            }
            if coerced > 0 {
                let rationale = match ty {
                    ColumnType::Numeric => {
                        format!("{coerced} values could not be parsed as numbers and were set to null")
                    }
                    _ => format!("{coerced} values could not be parsed as dates and were left null"),
                };
                log.record(
                    Some(work.columns[column].as_str()),
                    ActionKind::Coerce,
                    rationale,
                    coerced,
                    None,
                );
            }
        }
    }
}
fn drop_empty_rows(work: &mut Working, log: &mut CleaningLog) {
    let before = work.rows.len();
    work.rows.retain(|row| row.iter().any(Option::is_some));
    let removed = before - work.rows.len();
    if removed > 0 {
        log.record(
            None,
            ActionKind::DropRow,
            format!("{removed} rows contained no values"),
            removed,
            None,
        );
    }
}
/// Keeps the first occurrence of every row that is identical across all
/// remaining columns.
fn dedupe(work: &mut Working, log: &mut CleaningLog) {
    let before = work.rows.len();
    let mut seen: HashSet<Vec<Cell>> = HashSet::with_capacity(before);
    work.rows.retain(|row| seen.insert(row.clone()));
    let removed = before - work.rows.len();
    if removed > 0 {
        log.record(
            None,
            ActionKind::Dedupe,
            format!("{removed} duplicate rows removed, keeping first occurrences"),
            removed,
            None,
        );
    }
}
fn impute(work: &mut Working, log: &mut CleaningLog) {
    let mut exhausted = Vec::new();
    for column in 0..work.columns.len() {
        let ty = work.types[column];
        if !matches!(ty, ColumnType::Numeric | ColumnType::Categorical) {
            continue;
        }
        let missing = work.missing(column);
        if missing == 0 {
            continue;
        }
        let replacement = match ty {
            ColumnType::Numeric => median_token(work, column),
            _ => mode_token(work, column),
        };
        let name = work.columns[column].clone();
        match replacement {
            Some((value, rationale)) => {
                work.fill(column, &value);
                log.record(
                    Some(name.as_str()),
                    ActionKind::Impute,
                    rationale,
                    missing,
                    Some(value),
                );
            }
            None => {
                log.record(
                    Some(name.as_str()),
                    ActionKind::DropColumn,
                    "no observed values to impute from".to_string(),
                    work.rows.len(),
                    None,
                );
                exhausted.push(column);
            }
        }
    }
    if !exhausted.is_empty() {
        work.remove_columns(&exhausted);
    }
}
/// Median of the observed values. Integral columns get an integral
/// replacement, rounded half away from zero.
fn median_token(work: &Working, column: usize) -> Option<(String, String)> {
    let mut values: Vec<f64> = work
        .rows
        .iter()
        .filter_map(|row| row[column].as_deref().and_then(parse_number))
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let median = linear_quantile(&values, 0.5);
    let integral = values.iter().all(|v| v.fract() == 0.0);
    let value = if integral { median.round() } else { median };
    Some((
        format_number(value),
        format!("missing values replaced with column median ({median})"),
    ))
}
/// Most frequent category; ties go to the one seen first in row order.
fn mode_token(work: &Working, column: usize) -> Option<(String, String)> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for row in &work.rows {
        if let Some(value) = row[column].as_deref() {
            *counts.entry(value).or_insert(0) += 1;
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, count)| {
        (
            value.to_string(),
            format!("missing values replaced with most frequent category ({count} occurrences)"),
        )
    })
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::Profiler;
    fn table(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|v| (!v.is_empty()).then(|| v.to_string()))
                        .collect()
                })
                .collect(),
        )
    }
    fn clean_with(config: &PipelineConfig, t: &RawTable) -> (CleanTable, CleaningLog) {
        let profiles = Profiler::new(config).unwrap().profile(t);
        Cleaner::new(config).clean(t, &profiles).unwrap()
    }
    fn clean(t: &RawTable) -> (CleanTable, CleaningLog) {
        clean_with(&PipelineConfig::default(), t)
    }
    fn cell(s: &str) -> Cell {
        Some(s.to_string())
    }
    #[test]
    fn test_median_and_mode_imputation() {
        let t = table(&["age", "city"], &[&["25", "NYC"], &["", "NYC"], &["30", ""]]);
        let (clean, log) = clean(&t);
        assert_eq!(clean.rows()[1][0], cell("28"));
        assert_eq!(clean.rows()[2][1], cell("NYC"));
        assert_eq!(clean.null_count(), 0);
        let imputations: Vec<_> = log.of_kind(ActionKind::Impute).collect();
        assert_eq!(imputations.len(), 2);
        assert_eq!(imputations[0].column.as_deref(), Some("age"));
        assert_eq!(imputations[0].affected_row_count, 1);
        assert_eq!(imputations[0].replacement.as_deref(), Some("28"));
    }
    #[test]
    fn test_fractional_median_is_kept() {
        let t = table(&["price", "sku"], &[&["1.5", "a"], &["2", "b"], &["", "c"]]);
        let (clean, _) = clean(&t);
        assert_eq!(clean.rows()[2][0], cell("1.75"));
    }
    #[test]
    fn test_mode_ties_go_to_first_seen() {
        let t = table(
            &["team", "n"],
            &[
                &["red", "1"],
                &["blue", "2"],
                &["blue", "3"],
                &["red", "4"],
                &["", "5"],
            ],
        );
        let (clean, _) = clean(&t);
        assert_eq!(clean.rows()[4][0], cell("red"));
    }
    #[test]
    fn test_duplicate_rows_removed_once() {
        let t = table(
            &["name", "score"],
            &[&["ada", "1"], &["bob", "2"], &["ada", "1"]],
        );
        let (clean, log) = clean(&t);
        assert_eq!(clean.row_count(), 2);
        let dedupes: Vec<_> = log.of_kind(ActionKind::Dedupe).collect();
        assert_eq!(dedupes.len(), 1);
        assert_eq!(dedupes[0].affected_row_count, 1);
        assert!(dedupes[0].column.is_none());
    }
    #[test]
    fn test_sparse_column_dropped() {
        let rows: Vec<Vec<&str>> = (0..20)
            .map(|i| if i == 0 { vec!["1", "x"] } else { vec!["2", ""] })
            .collect();
        let row_refs: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        let t = table(&["a", "mostly_empty"], &row_refs);
        let (clean, log) = clean(&t);
        assert_eq!(clean.columns(), &["a".to_string()]);
        let drops: Vec<_> = log.of_kind(ActionKind::DropColumn).collect();
        assert_eq!(drops[0].column.as_deref(), Some("mostly_empty"));
        assert_eq!(drops[0].sequence, 1);
    }
    #[test]
    fn test_all_null_column_dropped() {
        let t = table(&["a", "b"], &[&["1", ""], &["2", ""]]);
        let (clean, log) = clean(&t);
        assert_eq!(clean.column_count(), 1);
        assert_eq!(log.of_kind(ActionKind::DropColumn).count(), 1);
    }
    #[test]
    fn test_coercion_then_imputation() {
        let config = PipelineConfig {
            profiling: crate::config::ProfilingOptions {
                type_confidence: 0.7,
                ..Default::default()
            },
            ..Default::default()
        };
        let t = table(
            &["n", "label"],
            &[&["1", "a"], &["3", "b"], &["five", "c"], &["5", "d"]],
        );
        let (clean, log) = clean_with(&config, &t);
        assert_eq!(clean.rows()[2][0], cell("3"));
        let kinds: Vec<ActionKind> = log.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Coerce, ActionKind::Impute]);
        assert_eq!(log.sequences(), vec![1, 2]);
        assert_eq!(clean.applied_actions(), &[1, 2]);
    }
    #[test]
    fn test_datetime_coerced_but_not_imputed() {
        let config = PipelineConfig {
            profiling: crate::config::ProfilingOptions {
                type_confidence: 0.6,
                ..Default::default()
            },
            ..Default::default()
        };
        let t = table(
            &["when", "v"],
            &[
                &["2024-01-01", "1"],
                &["2024-01-02", "2"],
                &["soon", "3"],
            ],
        );
        let (clean, log) = clean_with(&config, &t);
        assert_eq!(clean.rows()[2][0], None);
        let coerce: Vec<_> = log.of_kind(ActionKind::Coerce).collect();
        assert_eq!(coerce.len(), 1);
        assert!(coerce[0].rationale.contains("left null"));
        assert_eq!(log.of_kind(ActionKind::Impute).count(), 0);
    }
    #[test]
    fn test_empty_rows_dropped() {
        let t = table(&["a", "b"], &[&["1", "x"], &["", ""], &["2", "y"]]);
        let (clean, log) = clean(&t);
        assert_eq!(clean.row_count(), 2);
        assert_eq!(log.of_kind(ActionKind::DropRow).count(), 1);
    }
    #[test]
    fn test_profile_mismatch() {
        let t = table(&["a", "b"], &[&["1", "x"]]);
        let other = table(&["a"], &[&["1"]]);
        let profiles = Profiler::new(&PipelineConfig::default())
            .unwrap()
            .profile(&other);
        let err = Cleaner::new(&PipelineConfig::default())
            .clean(&t, &profiles)
            .unwrap_err();
        assert!(matches!(err, CleanError::ProfileMismatch { .. }));
    }
    #[test]
    fn test_clean_table_references_source() {
        let t = table(&["a"], &[&["1"]]);
        let (clean, log) = clean(&t);
        assert_eq!(clean.source(), t.id());
        assert!(log.is_empty());
    }
}
