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

use crate::config::PipelineConfig;
use crate::profiler::{ColumnProfile, ColumnType, Correlation};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;
mod priority {
    pub const LINE: f64 = 2.0;
    pub const BOX_SCALE: f64 = 0.5;
    pub const MIN_BAR_CATEGORIES: usize = 2;
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Histogram,
    Bar,
    Line,
    Scatter,
    Box,
    Heatmap,
}
impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Histogram => "histogram",
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Box => "box",
            ChartKind::Heatmap => "heatmap",
        }
    }
}
impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub columns: Vec<String>,
    pub title: String,
    pub rationale: String,
    pub priority: f64,
    /// Visual channel to column, e.g. `x -> age`.
    pub mappings: IndexMap<String, String>,
}
impl fmt::Display for ChartSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] priority {:.3}",
            self.title, self.kind, self.priority
        )
    }
}
struct Candidate {
    spec: ChartSpec,
    positions: Vec<usize>,
}
#[derive(Debug, Clone)]
pub struct ChartSelector {
    max_charts: usize,
    max_categories: usize,
    min_correlation: f64,
    min_heatmap_columns: usize,
}
impl ChartSelector {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_charts: config.max_charts,
            max_categories: config.categorical_max_distinct,
            min_correlation: config.charts.min_correlation,
            min_heatmap_columns: config.charts.min_heatmap_columns,
        }
    }
    /// Top `max_charts` candidates by priority; ties fall back to header
    /// positions and then chart kind. Never fails; no profiles means no charts.
    pub fn select(&self, profiles: &[ColumnProfile], correlations: &[Correlation]) -> Vec<ChartSpec> {
        let numeric: Vec<&ColumnProfile> = of_type(profiles, ColumnType::Numeric);
        let datetime: Vec<&ColumnProfile> = of_type(profiles, ColumnType::Datetime);
        let categorical: Vec<&ColumnProfile> = of_type(profiles, ColumnType::Categorical)
            .into_iter()
            .filter(|p| {
                (priority::MIN_BAR_CATEGORIES..=self.max_categories).contains(&p.distinct_count)
            })
            .collect();
        let mut candidates = Vec::new();
        for p in &numeric {
            candidates.push(Candidate {
                spec: ChartSpec {
                    kind: ChartKind::Histogram,
                    columns: vec![p.name.clone()],
                    title: format!("Distribution of {}", p.name),
                    rationale: format!(
                        "{} is numeric with {:.0}% of values present",
                        p.name,
                        (1.0 - p.null_ratio()) * 100.0
                    ),
                    priority: 1.0 / (1.0 + p.null_ratio()),
                    mappings: mappings(&[("x", p.name.as_str())]),
                },
                positions: vec![p.position],
            });
        }
        for p in &categorical {
            candidates.push(Candidate {
                spec: ChartSpec {
                    kind: ChartKind::Bar,
                    columns: vec![p.name.clone()],
                    title: format!("{} counts", p.name),
                    rationale: format!("{} has {} categories", p.name, p.distinct_count),
                    priority: 1.0 / p.distinct_count as f64,
                    mappings: mappings(&[("x", p.name.as_str())]),
                },
                positions: vec![p.position],
            });
        }
        for (i, x) in numeric.iter().enumerate() {
            for y in &numeric[i + 1..] {
                let Some(correlation) = correlations.iter().find(|c| c.involves(&x.name, &y.name))
                else {
                    continue;
                };
                let strength = correlation.coefficient.abs();
                if strength < self.min_correlation {
                    continue;
                }
                candidates.push(Candidate {
                    spec: ChartSpec {
                        kind: ChartKind::Scatter,
                        columns: vec![x.name.clone(), y.name.clone()],
                        title: format!("{} vs {}", y.name, x.name),
                        rationale: format!(
                            "Pearson correlation of {:.2} over {} rows",
                            correlation.coefficient, correlation.observations
                        ),
                        priority: strength,
                        mappings: mappings(&[("x", x.name.as_str()), ("y", y.name.as_str())]),
                    },
                    positions: vec![x.position, y.position],
                });
            }
        }
        for t in &datetime {
            for y in &numeric {
                candidates.push(Candidate {
                    spec: ChartSpec {
                        kind: ChartKind::Line,
                        columns: vec![t.name.clone(), y.name.clone()],
                        title: format!("{} over {}", y.name, t.name),
                        rationale: format!("{} ordered by {} shows the trend over time", y.name, t.name),
                        priority: priority::LINE,
                        mappings: mappings(&[("x", t.name.as_str()), ("y", y.name.as_str())]),
                    },
                    positions: vec![t.position, y.position],
                });
            }
        }
        for c in &categorical {
            for y in &numeric {
                candidates.push(Candidate {
                    spec: ChartSpec {
                        kind: ChartKind::Box,
                        columns: vec![c.name.clone(), y.name.clone()],
                        title: format!("{} by {}", y.name, c.name),
                        rationale: format!(
                            "Spread of {} across {} {} groups",
                            y.name, c.distinct_count, c.name
                        ),
                        priority: priority::BOX_SCALE / c.distinct_count as f64,
                        mappings: mappings(&[("x", c.name.as_str()), ("y", y.name.as_str())]),
                    },
                    positions: vec![c.position, y.position],
                });
            }
        }
        if let Some(candidate) = self.heatmap(&numeric, correlations) {
            candidates.push(candidate);
        }
        candidates.sort_by(|a, b| {
            b.spec
                .priority
                .total_cmp(&a.spec.priority)
                .then_with(|| a.positions.cmp(&b.positions))
                .then_with(|| a.spec.kind.cmp(&b.spec.kind))
        });
        let mut seen: HashSet<(ChartKind, Vec<String>)> = HashSet::new();
        let selected: Vec<ChartSpec> = candidates
            .into_iter()
            .filter(|c| seen.insert((c.spec.kind, c.spec.columns.clone())))
            .take(self.max_charts)
            .map(|c| c.spec)
            .collect();
        debug!(charts = selected.len(), "Selected charts");
        selected
    }
    fn heatmap(&self, numeric: &[&ColumnProfile], correlations: &[Correlation]) -> Option<Candidate> {
        if numeric.len() < self.min_heatmap_columns {
            return None;
        }
        let names: HashSet<&str> = numeric.iter().map(|p| p.name.as_str()).collect();
        let relevant: Vec<f64> = correlations
            .iter()
            .filter(|c| names.contains(c.left.as_str()) && names.contains(c.right.as_str()))
            .map(|c| c.coefficient.abs())
            .collect();
        if relevant.is_empty() {
            return None;
        }
        let mean = relevant.iter().sum::<f64>() / relevant.len() as f64;
        let columns: Vec<String> = numeric.iter().map(|p| p.name.clone()).collect();
        Some(Candidate {
            spec: ChartSpec {
                kind: ChartKind::Heatmap,
                title: format!("Correlation of {}", columns.join(", ")),
                rationale: format!(
                    "Mean absolute correlation {mean:.2} across {} numeric columns",
                    columns.len()
                ),
                columns,
                priority: mean,
                mappings: IndexMap::new(),
            },
            positions: numeric.iter().map(|p| p.position).collect(),
        })
    }
}
fn of_type(profiles: &[ColumnProfile], ty: ColumnType) -> Vec<&ColumnProfile> {
    let mut selected: Vec<&ColumnProfile> =
        profiles.iter().filter(|p| p.inferred_type == ty).collect();
    selected.sort_by_key(|p| p.position);
    selected
}
fn mappings(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(role, column)| (role.to_string(), column.to_string()))
        .collect()
}
#[cfg(test)]
mod tests {
    use super::*;
    fn profile(name: &str, position: usize, ty: ColumnType, distinct: usize, nulls: usize) -> ColumnProfile {
        ColumnProfile {
            name: name.to_string(),
            position,
            inferred_type: ty,
            type_confidence: 1.0,
            row_count: 10,
            null_count: nulls,
            distinct_count: distinct,
            unparseable_count: 0,
            numeric: None,
            temporal: None,
            top_categories: Vec::new(),
            sample_values: Vec::new(),
            issues: Vec::new(),
        }
    }
    fn correlation(left: &str, right: &str, coefficient: f64) -> Correlation {
        Correlation {
            left: left.to_string(),
            right: right.to_string(),
            coefficient,
            observations: 10,
        }
    }
    fn selector(max_charts: usize) -> ChartSelector {
        ChartSelector::new(&PipelineConfig {
            max_charts,
            ..Default::default()
        })
    }
    #[test]
    fn test_empty_profiles_yield_no_charts() {
        assert!(selector(6).select(&[], &[]).is_empty());
    }
    #[test]
    fn test_line_charts_rank_first() {
        let profiles = vec![
            profile("day", 0, ColumnType::Datetime, 10, 0),
            profile("sales", 1, ColumnType::Numeric, 10, 0),
            profile("region", 2, ColumnType::Categorical, 4, 0),
        ];
        let charts = selector(6).select(&profiles, &[]);
        let kinds: Vec<ChartKind> = charts.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChartKind::Line,
                ChartKind::Histogram,
                ChartKind::Bar,
                ChartKind::Box
            ]
        );
        assert_eq!(charts[0].title, "sales over day");
        assert_eq!(charts[3].title, "sales by region");
        assert_eq!(charts[3].priority, 0.125);
    }
    #[test]
    fn test_histogram_priority_prefers_fewer_nulls() {
        let profiles = vec![
            profile("a", 0, ColumnType::Numeric, 10, 5),
            profile("b", 1, ColumnType::Numeric, 10, 0),
        ];
        let charts = selector(6).select(&profiles, &[]);
        assert_eq!(charts[0].columns, vec!["b".to_string()]);
        assert_eq!(charts[1].columns, vec!["a".to_string()]);
    }
    #[test]
    fn test_scatter_respects_minimum_correlation() {
        let profiles = vec![
            profile("x", 0, ColumnType::Numeric, 10, 0),
            profile("y", 1, ColumnType::Numeric, 10, 0),
            profile("z", 2, ColumnType::Numeric, 10, 0),
        ];
        let correlations = vec![
            correlation("x", "y", -0.9),
            correlation("x", "z", 0.1),
            correlation("y", "z", 0.2),
        ];
        let charts = selector(10).select(&profiles, &correlations);
        let scatters: Vec<&ChartSpec> = charts
            .iter()
            .filter(|c| c.kind == ChartKind::Scatter)
            .collect();
        assert_eq!(scatters.len(), 1);
        assert_eq!(scatters[0].title, "y vs x");
        assert_eq!(scatters[0].priority, 0.9);
        let heatmap = charts.iter().find(|c| c.kind == ChartKind::Heatmap).unwrap();
        assert!((heatmap.priority - 0.4).abs() < 1e-9);
        assert_eq!(heatmap.columns.len(), 3);
    }
    #[test]
    fn test_bar_requires_distinct_bounds_and_skips_identifiers() {
        let profiles = vec![
            profile("constant", 0, ColumnType::Categorical, 1, 0),
            profile("wide", 1, ColumnType::Categorical, 21, 0),
            profile("order_id", 2, ColumnType::Identifier, 10, 0),
            profile("comment", 3, ColumnType::Text, 10, 0),
        ];
        assert!(selector(6).select(&profiles, &[]).is_empty());
    }
    #[test]
    fn test_bounded_and_unique() {
        let profiles: Vec<ColumnProfile> = (0..8)
            .map(|i| profile(&format!("n{i}"), i, ColumnType::Numeric, 10, 0))
            .collect();
        let charts = selector(6).select(&profiles, &[]);
        assert_eq!(charts.len(), 6);
        let unique: HashSet<(ChartKind, Vec<String>)> =
            charts.iter().map(|c| (c.kind, c.columns.clone())).collect();
        assert_eq!(unique.len(), charts.len());
        assert_eq!(charts[0].columns, vec!["n0".to_string()]);
    }
}
