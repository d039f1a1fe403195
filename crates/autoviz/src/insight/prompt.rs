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

use crate::chart_selector::ChartSpec;
use crate::config::InsightOptions;
use crate::profiler::{ColumnProfile, ColumnType};
use crate::values::format_number;
use tracing::debug;

const RESPONSE_CONTRACT: &str = r#"Respond with a JSON array only. Each element must be an object:
{"text": "<one observation>", "columns": ["<column name>", ...], "confidence": <number between 0 and 1>}
Only reference column names listed above."#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightPrompt {
    pub system: String,
    pub user: String,
}

/// Summarises profiles and charts into a bounded prompt. Only a handful of
/// sample values per column are included, never raw rows.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    sample_values: usize,
    max_statements: usize,
}

impl PromptBuilder {
    pub fn new(options: &InsightOptions) -> Self {
        Self {
            system_prompt: options.system_prompt.clone(),
            sample_values: options.sample_values_per_column,
            max_statements: options.max_statements,
        }
    }

    pub fn build(&self, profiles: &[ColumnProfile], charts: &[ChartSpec]) -> InsightPrompt {
        let rows = profiles.first().map_or(0, |p| p.row_count);
        let mut user = format!(
            "Analyse this dataset and report up to {} notable patterns.\n\n",
            self.max_statements
        );
        user.push_str("## Dataset\n");
        user.push_str(&format!("- Rows: {rows}\n"));
        user.push_str(&format!("- Columns: {}\n\n", profiles.len()));

        user.push_str("## Columns\n");
        for profile in profiles {
            user.push_str(&self.describe_column(profile));
            user.push('\n');
        }

        if !charts.is_empty() {
            user.push_str("\n## Selected charts\n");
            for chart in charts {
                user.push_str(&format!(
                    "- {} ({}; columns: {}): {}\n",
                    chart.title,
                    chart.kind,
                    chart.columns.join(", "),
                    chart.rationale
                ));
            }
        }

        user.push_str(&format!("\n## Response format\n{RESPONSE_CONTRACT}\n"));

        debug!(
            columns = profiles.len(),
            charts = charts.len(),
            prompt_chars = user.len(),
            "Built insight prompt"
        );

        InsightPrompt {
            system: self.system_prompt.clone(),
            user,
        }
    }

    fn describe_column(&self, profile: &ColumnProfile) -> String {
        let mut line = format!(
            "- {} ({}): {} nulls, {} distinct",
            profile.name, profile.inferred_type, profile.null_count, profile.distinct_count
        );
        match profile.inferred_type {
            ColumnType::Numeric => {
                if let Some(stats) = &profile.numeric {
                    line.push_str(&format!(
                        "; min {}, max {}, mean {}, median {}",
                        format_number(stats.min),
                        format_number(stats.max),
                        format_number(round2(stats.mean)),
                        format_number(stats.median)
                    ));
                    if stats.outlier_count > 0 {
                        line.push_str(&format!(", {} outliers", stats.outlier_count));
                    }
                }
            }
            ColumnType::Datetime => {
                if let Some(stats) = &profile.temporal {
                    line.push_str(&format!("; from {} to {}", stats.min, stats.max));
                    if let Some(frequency) = &stats.inferred_frequency {
                        line.push_str(&format!(", roughly {frequency}"));
                    }
                }
            }
            ColumnType::Categorical => {
                let top: Vec<String> = profile
                    .top_categories
                    .iter()
                    .map(|c| format!("{} ({})", c.value, c.count))
                    .collect();
                if !top.is_empty() {
                    line.push_str(&format!("; most frequent: {}", top.join(", ")));
                }
            }
            ColumnType::Text | ColumnType::Identifier => {}
        }
        let samples: Vec<&str> = profile
            .sample_values
            .iter()
            .take(self.sample_values)
            .map(String::as_str)
            .collect();
        if !samples.is_empty() && profile.inferred_type != ColumnType::Identifier {
            line.push_str(&format!("; e.g. {}", samples.join(", ")));
        }
        line
    }
}

fn round2(value: f64) -> f64 {
    let scaled = (value * 100.0).round();
    if scaled.is_finite() {
        scaled / 100.0
    } else {
        value
    }
}
