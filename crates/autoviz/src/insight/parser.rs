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

use super::InsightStatement;
use crate::error::{InsightError, InsightResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("bullet pattern"));

/// Turns a raw completion into statements.
///
/// Accepted shapes, in order: a JSON array (bare, fenced or embedded in
/// prose, or under an `insights` key), then bulleted or numbered lines.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    known_columns: Vec<String>,
    max_statements: usize,
}

impl ResponseParser {
    pub fn new(known_columns: Vec<String>, max_statements: usize) -> Self {
        Self {
            known_columns,
            max_statements,
        }
    }

    pub fn parse(&self, raw: &str) -> InsightResult<Vec<InsightStatement>> {
        let structured: Vec<InsightStatement> = extract_json_array(raw)
            .map(|items| {
                debug!(items = items.len(), "Parsing structured insight response");
                items
                    .iter()
                    .filter_map(|item| self.statement_from_json(item))
                    .collect()
            })
            .unwrap_or_default();
        let candidates = if structured.is_empty() {
            debug!("No usable JSON array in response; falling back to bullet lines");
            self.statements_from_lines(raw)
        } else {
            structured
        };

        let mut statements: Vec<InsightStatement> = Vec::with_capacity(candidates.len());
        for statement in candidates {
            if !statements.iter().any(|s| s.text == statement.text) {
                statements.push(statement);
            }
        }

        if statements.is_empty() {
            warn!(response_chars = raw.len(), "Insight response yielded no statements");
            return Err(InsightError::Unparseable(format!(
                "no insight statements found in {} characters of response",
                raw.len()
            )));
        }
        statements.truncate(self.max_statements);
        Ok(statements)
    }

    fn statement_from_json(&self, item: &Value) -> Option<InsightStatement> {
        match item {
            Value::String(text) => self.statement(text, Vec::new(), None),
            Value::Object(map) => {
                let text = ["text", "insight", "statement"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))?;
                let columns = match map.get("columns").or_else(|| map.get("column")) {
                    Some(Value::Array(values)) => values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                    Some(Value::String(single)) => vec![single.clone()],
                    _ => Vec::new(),
                };
                let confidence = map.get("confidence").and_then(Value::as_f64);
                self.statement(text, columns, confidence)
            }
            _ => None,
        }
    }

    fn statements_from_lines(&self, raw: &str) -> Vec<InsightStatement> {
        raw.lines()
            .filter_map(|line| BULLET.captures(line))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .filter_map(|text| self.statement(&text, Vec::new(), None))
            .collect()
    }

    /// Keeps only known columns; with none given, infers them from the names
    /// the text mentions.
    fn statement(
        &self,
        text: &str,
        columns: Vec<String>,
        confidence: Option<f64>,
    ) -> Option<InsightStatement> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let mut supporting: Vec<String> = Vec::new();
        let claimed = !columns.is_empty();
        for column in columns {
            if let Some(known) = self.resolve(&column) {
                if !supporting.contains(known) {
                    supporting.push(known.clone());
                }
            }
        }
        if !claimed {
            let lowered = text.to_lowercase();
            for known in &self.known_columns {
                if lowered.contains(&known.to_lowercase()) && !supporting.contains(known) {
                    supporting.push(known.clone());
                }
            }
        }
        Some(InsightStatement {
            text: text.to_string(),
            columns: supporting,
            confidence: confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0)),
        })
    }

    fn resolve(&self, column: &str) -> Option<&String> {
        let column = column.trim();
        self.known_columns
            .iter()
            .find(|known| known.as_str() == column)
            .or_else(|| {
                self.known_columns
                    .iter()
                    .find(|known| known.eq_ignore_ascii_case(column))
            })
    }
}

fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    let as_array = |value: Value| -> Option<Vec<Value>> {
        match value {
            Value::Array(items) => Some(items),
            Value::Object(mut map) => match map.remove("insights") {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            },
            _ => None,
        }
    };

    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if let Some(items) = as_array(value) {
            return Some(items);
        }
    }
    for (language, content) in extract_code_blocks(text) {
        if language.as_deref() == Some("json") || language.is_none() {
            if let Ok(value) = serde_json::from_str::<Value>(&content) {
                if let Some(items) = as_array(value) {
                    return Some(items);
                }
            }
        }
    }
    bracketed_spans(text, '[', ']').find_map(|candidate| {
        serde_json::from_str::<Value>(candidate)
            .ok()
            .and_then(as_array)
    })
}

/// Every balanced `start_char`..`end_char` span, one per opening delimiter,
/// in order of where it opens.
fn bracketed_spans(text: &str, start_char: char, end_char: char) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(move |&(_, ch)| ch == start_char)
        .filter_map(move |(start, _)| {
            let mut balance = 0usize;
            for (offset, ch) in text[start..].char_indices() {
                if ch == start_char {
                    balance += 1;
                } else if ch == end_char {
                    balance -= 1;
                    if balance == 0 {
                        return Some(&text[start..=start + offset]);
                    }
                }
            }
            None
        })
}

fn extract_code_blocks(text: &str) -> Vec<(Option<String>, String)> {
    let mut code_blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(lang_str) = line.trim().strip_prefix("```") else {
            continue;
        };
        let language = {
            let lang_str = lang_str.trim();
            if lang_str.is_empty() {
                None
            } else {
                Some(lang_str.to_ascii_lowercase())
            }
        };

        let mut code_content = String::new();
        for code_line in lines.by_ref() {
            if code_line.trim().starts_with("```") {
                break;
            }
            if !code_content.is_empty() {
                code_content.push('\n');
            }
            code_content.push_str(code_line);
        }
        code_blocks.push((language, code_content));
    }
    code_blocks
}
