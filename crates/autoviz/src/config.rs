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

//! Pipeline configuration.
//!
//! Defaults live here; a TOML file may override any of them and the seven
//! recognised top-level options may further be overridden through
//! `AUTOVIZ_<OPTION>` environment variables.

use crate::error::{ConfigError, ConfigResult};
use llm_contracts::ProviderConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
pub const ENV_PREFIX: &str = "AUTOVIZ_";
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_upload_bytes: u64,
    pub max_rows: u64,
    pub null_drop_threshold: f64,
    pub categorical_max_distinct: usize,
    pub max_charts: usize,
    pub completion_timeout_seconds: u64,
    pub completion_max_retries: u32,
    pub ingest: IngestOptions,
    pub profiling: ProfilingOptions,
    pub charts: ChartOptions,
    pub insight: InsightOptions,
    pub provider: ProviderConfig,
}
impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 16 * 1024 * 1024,
            max_rows: 1_000_000,
            null_drop_threshold: 0.95,
            categorical_max_distinct: 20,
            max_charts: 6,
            completion_timeout_seconds: 30,
            completion_max_retries: 2,
            ingest: IngestOptions::default(),
            profiling: ProfilingOptions::default(),
            charts: ChartOptions::default(),
            insight: InsightOptions::default(),
            provider: ProviderConfig::default(),
        }
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    pub delimiters: Vec<char>,
    /// Permissive encoding tried last; `None` disables the fallback.
    pub fallback_encoding: Option<String>,
    pub null_tokens: Vec<String>,
    pub allowed_extensions: Vec<String>,
}
impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiters: vec![',', ';', '\t', '|'],
            fallback_encoding: Some("windows-1252".to_string()),
            null_tokens: ["", "NA", "N/A", "null", "NULL", "NaN", "nan", "None", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_extensions: vec!["csv".to_string(), "tsv".to_string(), "txt".to_string()],
        }
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingOptions {
    /// Share of non-null values that must parse for a datetime/numeric verdict.
    pub type_confidence: f64,
    pub categorical_ratio: f64,
    pub sample_size: usize,
    pub top_k: usize,
    pub datetime_formats: Vec<String>,
    pub identifier_pattern: String,
    pub category_pattern: String,
}
impl Default for ProfilingOptions {
    fn default() -> Self {
        Self {
            type_confidence: 0.9,
            categorical_ratio: 0.05,
            sample_size: 5,
            top_k: 5,
            datetime_formats: vec![
                "%Y-%m-%d".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S%.f".to_string(),
                "%Y/%m/%d".to_string(),
                "%m/%d/%Y".to_string(),
                "%d/%m/%Y".to_string(),
                "%d.%m.%Y".to_string(),
            ],
            identifier_pattern:
                r"(?i)^(id|key|uuid|guid)$|(_|\b)(id|uuid|guid|key)$|^(id|uuid)_|(?-i:[a-z]Id$)"
                    .to_string(),
            category_pattern:
                r"(?i)(category|type|class|group|status|kind|segment|label|region|city|country|state|gender)"
                    .to_string(),
        }
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOptions {
    pub min_correlation: f64,
    pub min_heatmap_columns: usize,
}
impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            min_correlation: 0.3,
            min_heatmap_columns: 3,
        }
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightOptions {
    pub enabled: bool,
    pub backoff_base_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_statements: usize,
    pub sample_values_per_column: usize,
    pub system_prompt: String,
}
impl Default for InsightOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            backoff_base_ms: 500,
            max_tokens: 300,
            temperature: 0.7,
            max_statements: 8,
            sample_values_per_column: 3,
            system_prompt: "You are a helpful data analysis assistant.".to_string(),
        }
    }
}
impl PipelineConfig {
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(source)?)
    }
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
    /// File (when given), then process environment, then validation.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "MAX_UPLOAD_BYTES", &mut self.max_upload_bytes)?;
        override_from(&lookup, "MAX_ROWS", &mut self.max_rows)?;
        override_from(&lookup, "NULL_DROP_THRESHOLD", &mut self.null_drop_threshold)?;
        override_from(
            &lookup,
            "CATEGORICAL_MAX_DISTINCT",
            &mut self.categorical_max_distinct,
        )?;
        override_from(&lookup, "MAX_CHARTS", &mut self.max_charts)?;
        override_from(
            &lookup,
            "COMPLETION_TIMEOUT_SECONDS",
            &mut self.completion_timeout_seconds,
        )?;
        override_from(
            &lookup,
            "COMPLETION_MAX_RETRIES",
            &mut self.completion_max_retries,
        )?;
        Ok(())
    }
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::invalid("max_upload_bytes", "must be positive"));
        }
        if self.max_rows == 0 {
            return Err(ConfigError::invalid("max_rows", "must be positive"));
        }
        if !(self.null_drop_threshold > 0.0 && self.null_drop_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "null_drop_threshold",
                "must be in (0, 1]",
            ));
        }
        if self.categorical_max_distinct < 2 {
            return Err(ConfigError::invalid(
                "categorical_max_distinct",
                "must be at least 2",
            ));
        }
        if self.max_charts == 0 {
            return Err(ConfigError::invalid("max_charts", "must be at least 1"));
        }
        if self.completion_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "completion_timeout_seconds",
                "must be at least 1",
            ));
        }
        if self.completion_max_retries > 10 {
            return Err(ConfigError::invalid(
                "completion_max_retries",
                "must not exceed 10",
            ));
        }
        if self.ingest.delimiters.is_empty() || self.ingest.delimiters.iter().any(|d| !d.is_ascii())
        {
            return Err(ConfigError::invalid(
                "ingest.delimiters",
                "must be a non-empty list of ASCII characters",
            ));
        }
        if let Some(label) = &self.ingest.fallback_encoding {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                return Err(ConfigError::invalid(
                    "ingest.fallback_encoding",
                    format!("'{label}' is not a known encoding label"),
                ));
            }
        }
        let profiling = &self.profiling;
        if !(profiling.type_confidence > 0.0 && profiling.type_confidence <= 1.0) {
            return Err(ConfigError::invalid(
                "profiling.type_confidence",
                "must be in (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&profiling.categorical_ratio) {
            return Err(ConfigError::invalid(
                "profiling.categorical_ratio",
                "must be in [0, 1]",
            ));
        }
        for (field, pattern) in [
            ("profiling.identifier_pattern", &profiling.identifier_pattern),
            ("profiling.category_pattern", &profiling.category_pattern),
        ] {
            Regex::new(pattern).map_err(|e| ConfigError::invalid(field, e.to_string()))?;
        }
        if !(0.0..=1.0).contains(&self.charts.min_correlation) {
            return Err(ConfigError::invalid(
                "charts.min_correlation",
                "must be in [0, 1]",
            ));
        }
        if self.charts.min_heatmap_columns < 2 {
            return Err(ConfigError::invalid(
                "charts.min_heatmap_columns",
                "must be at least 2",
            ));
        }
        if !(0.0..=2.0).contains(&self.insight.temperature) {
            return Err(ConfigError::invalid(
                "insight.temperature",
                "must be in [0, 2]",
            ));
        }
        if self.insight.max_statements == 0 || self.insight.max_tokens == 0 {
            return Err(ConfigError::invalid(
                "insight",
                "max_statements and max_tokens must be positive",
            ));
        }
        Ok(())
    }
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_seconds)
    }
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.insight.backoff_base_ms)
    }
}
fn override_from<F, T>(lookup: &F, option: &str, target: &mut T) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let var = format!("{ENV_PREFIX}{option}");
    if let Some(value) = lookup(&var) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvOverride { var, value })?;
    }
    Ok(())
}
