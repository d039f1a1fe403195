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

use chrono::{DateTime, NaiveDate, NaiveDateTime};
/// Finite floating-point value of a token, if it has one.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}
/// Renders an imputed or summary number without a spurious trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let rounded = if value == 0.0 { 0.0 } else { value };
        format!("{rounded:.0}")
    } else {
        format!("{value}")
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParsedDateTime {
    pub value: NaiveDateTime,
    pub has_time: bool,
}
#[derive(Debug, Clone)]
pub struct DateTimeParser {
    formats: Vec<String>,
}
impl DateTimeParser {
    pub fn new(formats: Vec<String>) -> Self {
        Self { formats }
    }
    /// RFC 3339 first, then each configured pattern in order, as a datetime
    /// and then as a bare date.
    pub fn parse(&self, value: &str) -> Option<ParsedDateTime> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(ParsedDateTime {
                value: dt.naive_utc(),
                has_time: true,
            });
        }
        for format in &self.formats {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
                return Some(ParsedDateTime {
                    value: dt,
                    has_time: true,
                });
            }
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                return Some(ParsedDateTime {
                    value: date.and_hms_opt(0, 0, 0)?,
                    has_time: false,
                });
            }
        }
        None
    }
    pub fn is_datetime(&self, value: &str) -> bool {
        self.parse(value).is_some()
    }
}
