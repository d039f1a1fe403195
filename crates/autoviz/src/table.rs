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

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use uuid::Uuid;
/// One cell; `None` is a null after token normalisation.
pub type Cell = Option<String>;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(Uuid);
impl TableId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}
impl Default for TableId {
    fn default() -> Self {
        Self::new()
    }
}
impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
/// A data row that could not be aligned with the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    /// 1-based line number in the decoded upload.
    pub record: u64,
    pub fields: Vec<String>,
    pub reason: String,
}
/// Read access shared by raw and cleaned tables, so profiling can run over
/// either.
pub trait Tabular {
    fn columns(&self) -> &[String];
    fn rows(&self) -> &[Vec<Cell>];
    fn rejected_rows(&self) -> &[RejectedRow] {
        &[]
    }
    fn row_count(&self) -> usize {
        self.rows().len()
    }
    fn column_count(&self) -> usize {
        self.columns().len()
    }
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns().iter().position(|c| c == name)
    }
    fn column_cells(&self, index: usize) -> Vec<Option<&str>> {
        self.rows()
            .iter()
            .map(|row| row.get(index).and_then(|cell| cell.as_deref()))
            .collect()
    }
    fn record(&self, row: usize) -> Option<IndexMap<&str, Option<&str>>> {
        let cells = self.rows().get(row)?;
        Some(
            self.columns()
                .iter()
                .map(String::as_str)
                .zip(cells.iter().map(|cell| cell.as_deref()))
                .collect(),
        )
    }
    fn null_count(&self) -> usize {
        self.rows()
            .iter()
            .map(|row| row.iter().filter(|cell| cell.is_none()).count())
            .sum()
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    id: TableId,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    rejected: Vec<RejectedRow>,
    encoding: String,
    delimiter: char,
}
impl RawTable {
    /// Rows whose width differs from the header are moved to the rejected list
    /// rather than kept.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let (rows, misaligned): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .enumerate()
            .partition(|(_, row)| row.len() == width);
        let rejected = misaligned
            .into_iter()
            .map(|(index, row)| RejectedRow {
                record: index as u64 + 2,
                reason: format!("expected {width} fields, found {}", row.len()),
                fields: row.into_iter().map(Option::unwrap_or_default).collect(),
            })
            .collect();
        Self {
            id: TableId::new(),
            columns,
            rows: rows.into_iter().map(|(_, row)| row).collect(),
            rejected,
            encoding: "UTF-8".to_string(),
            delimiter: ',',
        }
    }
    pub(crate) fn from_parts(
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
        rejected: Vec<RejectedRow>,
        encoding: &str,
        delimiter: char,
    ) -> Self {
        Self {
            id: TableId::new(),
            columns,
            rows,
            rejected,
            encoding: encoding.to_string(),
            delimiter,
        }
    }
    pub fn id(&self) -> TableId {
        self.id
    }
    pub fn encoding(&self) -> &str {
        &self.encoding
    }
    pub fn delimiter(&self) -> char {
        self.delimiter
    }
}
impl Tabular for RawTable {
    fn columns(&self) -> &[String] {
        &self.columns
    }
    fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }
    fn rejected_rows(&self) -> &[RejectedRow] {
        &self.rejected
    }
}
/// Result of cleaning: points back at its source table and at the log
/// sequence numbers that produced it, but owns neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanTable {
    id: TableId,
    source: TableId,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    applied_actions: Vec<u64>,
}
impl CleanTable {
    pub(crate) fn new(
        source: TableId,
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
        applied_actions: Vec<u64>,
    ) -> Self {
        Self {
            id: TableId::new(),
            source,
            columns,
            rows,
            applied_actions,
        }
    }
    pub fn id(&self) -> TableId {
        self.id
    }
    pub fn source(&self) -> TableId {
        self.source
    }
    pub fn applied_actions(&self) -> &[u64] {
        &self.applied_actions
    }
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }
    pub fn to_csv_string(&self) -> csv::Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
impl Tabular for CleanTable {
    fn columns(&self) -> &[String] {
        &self.columns
    }
    fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }
}
