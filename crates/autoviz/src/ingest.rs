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

//! Upload decoding and delimited-text parsing.

use crate::config::{IngestOptions, PipelineConfig};
use crate::error::{IngestError, IngestResult, LimitUnit};
use crate::table::{Cell, RawTable, RejectedRow};
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;
const DELIMITER_SAMPLE_LINES: usize = 5;
/// Raw bytes plus whatever the transport knew about them.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub declared_encoding: Option<String>,
    pub bytes: Vec<u8>,
}
impl Upload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: None,
            declared_encoding: None,
            bytes: bytes.into(),
        }
    }
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.declared_encoding = Some(encoding.into());
        self
    }
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut upload = Self::new(bytes);
        upload.filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(upload)
    }
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
    pub fn to_ref(&self) -> UploadRef {
        UploadRef {
            upload_id: Uuid::new_v4(),
            filename: self.filename.clone(),
            declared_encoding: self.declared_encoding.clone(),
            byte_len: self.bytes.len() as u64,
            sha256: self.digest(),
        }
    }
}
/// Identity of an upload as recorded in a session. Re-analysis copies it so
/// both sessions point at the same upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRef {
    pub upload_id: Uuid,
    pub filename: Option<String>,
    pub declared_encoding: Option<String>,
    pub byte_len: u64,
    pub sha256: String,
}
#[derive(Debug, Clone)]
pub struct Ingestor {
    options: IngestOptions,
    max_upload_bytes: u64,
    max_rows: u64,
    null_tokens: HashSet<String>,
}
impl Ingestor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            null_tokens: config.ingest.null_tokens.iter().cloned().collect(),
            options: config.ingest.clone(),
            max_upload_bytes: config.max_upload_bytes,
            max_rows: config.max_rows,
        }
    }
    pub fn ingest(&self, upload: &Upload) -> IngestResult<RawTable> {
        if let Some(filename) = &upload.filename {
            self.check_extension(filename)?;
        }
        self.ingest_bytes(&upload.bytes, upload.declared_encoding.as_deref())
    }
    pub fn ingest_bytes(
        &self,
        raw_bytes: &[u8],
        declared_encoding: Option<&str>,
    ) -> IngestResult<RawTable> {
        if raw_bytes.is_empty() {
            return Err(IngestError::Empty);
        }
        if raw_bytes.len() as u64 > self.max_upload_bytes {
            return Err(IngestError::TooLarge {
                limit: self.max_upload_bytes,
                actual: raw_bytes.len() as u64,
                unit: LimitUnit::Bytes,
            });
        }
        let (text, encoding) = self.decode(raw_bytes, declared_encoding)?;
        let delimiter = self.detect_delimiter(&text);
        debug!(
            encoding = encoding.name(),
            delimiter = %(delimiter as char).escape_default(),
            "Decoded upload"
        );
        let table = self.parse(&text, delimiter, encoding)?;
        info!(
            rows = table.rows.len(),
            columns = table.columns.len(),
            rejected = table.rejected.len(),
            encoding = encoding.name(),
            "Ingested upload"
        );
        Ok(RawTable::from_parts(
            table.columns,
            table.rows,
            table.rejected,
            encoding.name(),
            delimiter as char,
        ))
    }
    fn check_extension(&self, filename: &str) -> IngestResult<()> {
        let extension = PathBuf::from(filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        match extension {
            Some(ext)
                if self
                    .options
                    .allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(&ext)) =>
            {
                Ok(())
            }
            _ => Err(IngestError::UnsupportedFormat {
                filename: filename.to_string(),
            }),
        }
    }
    /// Strict decode with, in order: a byte-order mark, the declared label,
    /// UTF-8, then the permissive fallback.
    fn decode<'a>(
        &self,
        bytes: &'a [u8],
        declared: Option<&str>,
    ) -> IngestResult<(Cow<'a, str>, &'static Encoding)> {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            if let Some(text) = encoding
                .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
            {
                return Ok((text, encoding));
            }
        }
        let mut attempted = Vec::new();
        let mut candidates: Vec<&'static Encoding> = Vec::new();
        if let Some(label) = declared {
            match Encoding::for_label(label.trim().as_bytes()) {
                Some(encoding) => candidates.push(encoding),
                None => {
                    warn!(label, "Unknown declared encoding; falling back");
                    attempted.push(label.to_string());
                }
            }
        }
        candidates.push(UTF_8);
        if let Some(label) = &self.options.fallback_encoding {
            if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
                candidates.push(encoding);
            }
        }
        for encoding in candidates {
            if attempted.iter().any(|name| name == encoding.name()) {
                continue;
            }
            attempted.push(encoding.name().to_string());
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes)
            {
                return Ok((text, encoding));
            }
            debug!(encoding = encoding.name(), "Strict decode failed");
        }
        Err(IngestError::Encoding { attempted })
    }
    /// Candidate giving the widest header whose width holds on the first few
    /// lines; the widest header if none is consistent; `,` otherwise.
    fn detect_delimiter(&self, text: &str) -> u8 {
        let sample: Vec<&str> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .take(DELIMITER_SAMPLE_LINES)
            .collect();
        let sample = sample.join("\n");
        let mut best_consistent: Option<(usize, u8)> = None;
        let mut best_any: Option<(usize, u8)> = None;
        for candidate in &self.options.delimiters {
            let delimiter = *candidate as u8;
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .has_headers(false)
                .flexible(true)
                .from_reader(sample.as_bytes());
            let widths: Vec<usize> = reader
                .records()
                .filter_map(|record| record.ok().map(|r| r.len()))
                .collect();
            let Some(&header_width) = widths.first() else {
                continue;
            };
            if header_width < 2 {
                continue;
            }
            if best_any.map_or(true, |(width, _)| header_width > width) {
                best_any = Some((header_width, delimiter));
            }
            let consistent = widths.iter().all(|&w| w == header_width);
            if consistent && best_consistent.map_or(true, |(width, _)| header_width > width) {
                best_consistent = Some((header_width, delimiter));
            }
        }
        best_consistent
            .or(best_any)
            .map_or(b',', |(_, delimiter)| delimiter)
    }
    fn parse(
        &self,
        text: &str,
        delimiter: u8,
        encoding: &'static Encoding,
    ) -> IngestResult<ParsedTable> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let mut records = reader.records();
        let header = loop {
            match records.next() {
                Some(Ok(record)) if is_blank(&record) => continue,
                Some(Ok(record)) => break record,
                Some(Err(e)) => {
                    return Err(IngestError::MalformedHeader {
                        reason: e.to_string(),
                    })
                }
                None => {
                    return Err(IngestError::MalformedHeader {
                        reason: "no header row found".to_string(),
                    })
                }
            }
        };
        let columns = validate_header(&header)?;
        let width = columns.len();
        let mut rows = Vec::new();
        let mut rejected = Vec::new();
        let mut row_total: u64 = 0;
        for result in records {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    row_total += 1;
                    let line = e.position().map_or(0, |p| p.line());
                    rejected.push(RejectedRow {
                        record: line,
                        fields: Vec::new(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if is_blank(&record) {
                continue;
            }
            // Quarantined rows count toward the ceiling too.
            row_total += 1;
            let line = record.position().map_or(0, |p| p.line());
            if record.len() != width {
                rejected.push(RejectedRow {
                    record: line,
                    fields: record.iter().map(str::to_string).collect(),
                    reason: format!("expected {width} fields, found {}", record.len()),
                });
                continue;
            }
            if row_total <= self.max_rows {
                rows.push(record.iter().map(|field| self.normalise(field)).collect());
            }
        }
        if row_total > self.max_rows {
            return Err(IngestError::TooLarge {
                limit: self.max_rows,
                actual: row_total,
                unit: LimitUnit::Rows,
            });
        }
        if !rejected.is_empty() {
            warn!(
                rejected = rejected.len(),
                encoding = encoding.name(),
                "Quarantined rows with mismatched field counts"
            );
        }
        Ok(ParsedTable {
            columns,
            rows,
            rejected,
        })
    }
    fn normalise(&self, field: &str) -> Cell {
        if self.null_tokens.contains(field) {
            None
        } else {
            Some(field.to_string())
        }
    }
}
struct ParsedTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    rejected: Vec<RejectedRow>,
}
fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|field| field.is_empty())
}
fn validate_header(header: &csv::StringRecord) -> IngestResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(header.len());
    for (index, name) in header.iter().enumerate() {
        let name = name.trim_start_matches('\u{feff}').trim();
        if name.is_empty() {
            return Err(IngestError::MalformedHeader {
                reason: format!("column {} has a blank name", index + 1),
            });
        }
        if !seen.insert(name.to_string()) {
            return Err(IngestError::MalformedHeader {
                reason: format!("duplicate column name '{name}'"),
            });
        }
        columns.push(name.to_string());
    }
    Ok(columns)
}
/// `ingest(raw_bytes, declared_encoding?)` under the given configuration.
pub fn ingest(
    raw_bytes: &[u8],
    declared_encoding: Option<&str>,
    config: &PipelineConfig,
) -> IngestResult<RawTable> {
    Ingestor::new(config).ingest_bytes(raw_bytes, declared_encoding)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Tabular;
    fn ingestor() -> Ingestor {
        Ingestor::new(&PipelineConfig::default())
    }
    #[test]
    fn test_basic_csv_with_nulls() {
        let table = ingestor()
            .ingest_bytes(b"age,city\n25,NYC\n,NYC\n30,\n", None)
            .unwrap();
        assert_eq!(table.columns(), &["age".to_string(), "city".to_string()]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows()[1][0], None);
        assert_eq!(table.rows()[2][1], None);
        assert_eq!(table.encoding(), "UTF-8");
    }
    #[test]
    fn test_null_tokens_and_trimming() {
        let table = ingestor()
            .ingest_bytes(b"a,b\n  NA , x \nnull,-\n", None)
            .unwrap();
        assert_eq!(table.rows()[0], vec![None, Some("x".to_string())]);
        assert_eq!(table.rows()[1], vec![None, None]);
    }
    #[test]
    fn test_empty_upload() {
        assert_eq!(ingestor().ingest_bytes(b"", None), Err(IngestError::Empty));
    }
    #[test]
    fn test_byte_ceiling() {
        let config = PipelineConfig {
            max_upload_bytes: 8,
            ..Default::default()
        };
        let err = Ingestor::new(&config)
            .ingest_bytes(b"a,b\n1,2\n3,4\n", None)
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::TooLarge {
                unit: LimitUnit::Bytes,
                ..
            }
        ));
    }
    #[test]
    fn test_row_ceiling() {
        let config = PipelineConfig {
            max_rows: 2,
            ..Default::default()
        };
        let err = Ingestor::new(&config)
            .ingest_bytes(b"a\n1\n2\n3\n", None)
            .unwrap_err();
        assert_eq!(
            err,
            IngestError::TooLarge {
                limit: 2,
                actual: 3,
                unit: LimitUnit::Rows
            }
        );
    }
    #[test]
    fn test_row_ceiling_counts_quarantined_rows() {
        let config = PipelineConfig {
            max_rows: 2,
            ..Default::default()
        };
        let err = Ingestor::new(&config)
            .ingest_bytes(b"a,b\n1,2\n3\n4\n5\n6\n", None)
            .unwrap_err();
        assert_eq!(
            err,
            IngestError::TooLarge {
                limit: 2,
                actual: 5,
                unit: LimitUnit::Rows
            }
        );
    }
    #[test]
    fn test_mismatched_rows_are_quarantined() {
        let table = ingestor()
            .ingest_bytes(b"a,b,c\n1,2,3\n4,5\n6,7,8,9\n10,11,12\n", None)
            .unwrap();
        assert_eq!(table.row_count(), 2);
        let rejected = table.rejected_rows();
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].record, 3);
        assert_eq!(rejected[0].fields, vec!["4".to_string(), "5".to_string()]);
        assert!(rejected[1].reason.contains("found 4"));
    }
    #[test]
    fn test_malformed_header_fails_whole_ingest() {
        let err = ingestor().ingest_bytes(b"a,,c\n1,2,3\n", None).unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::MalformedHeader);
        let err = ingestor().ingest_bytes(b"a,b,a\n1,2,3\n", None).unwrap_err();
        assert!(err.to_string().contains("duplicate column name 'a'"));
        let err = ingestor().ingest_bytes(b"\n\n\n", None).unwrap_err();
        assert!(matches!(err, IngestError::MalformedHeader { .. }));
    }
    #[test]
    fn test_delimiter_detection() {
        let table = ingestor()
            .ingest_bytes(b"name;score;team\nAda;3,5;red\nBob;4,0;blue\n", None)
            .unwrap();
        assert_eq!(table.delimiter(), ';');
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.rows()[0][1].as_deref(), Some("3,5"));
        let table = ingestor()
            .ingest_bytes(b"x\ty\n1\t2\n", None)
            .unwrap();
        assert_eq!(table.delimiter(), '\t');
    }
    #[test]
    fn test_declared_and_fallback_encodings() {
        let latin1 = b"name,city\nJos\xe9,M\xe1laga\n";
        let table = ingestor().ingest_bytes(latin1, Some("latin1")).unwrap();
        assert_eq!(table.rows()[0][0].as_deref(), Some("José"));
        let table = ingestor().ingest_bytes(latin1, None).unwrap();
        assert_eq!(table.encoding(), "windows-1252");
        assert_eq!(table.rows()[0][1].as_deref(), Some("Málaga"));
    }
    #[test]
    fn test_encoding_failure_without_fallback() {
        let mut config = PipelineConfig::default();
        config.ingest.fallback_encoding = None;
        let err = Ingestor::new(&config)
            .ingest_bytes(b"a\n\xff\xfe\xfd\n", Some("utf-8"))
            .unwrap_err();
        assert_eq!(
            err,
            IngestError::Encoding {
                attempted: vec!["UTF-8".to_string()]
            }
        );
    }
    #[test]
    fn test_utf8_bom_is_stripped() {
        let table = ingestor()
            .ingest_bytes(b"\xef\xbb\xbfid,value\n1,2\n", None)
            .unwrap();
        assert_eq!(table.columns()[0], "id");
    }
    #[test]
    fn test_extension_policy() {
        let upload = Upload::new(b"a,b\n1,2\n".to_vec()).with_filename("report.xlsx");
        assert!(matches!(
            ingestor().ingest(&upload),
            Err(IngestError::UnsupportedFormat { .. })
        ));
        let upload = Upload::new(b"a,b\n1,2\n".to_vec()).with_filename("Report.CSV");
        assert!(ingestor().ingest(&upload).is_ok());
    }
    #[test]
    fn test_upload_digest_is_sha256() {
        let upload = Upload::new(b"abc".to_vec());
        assert_eq!(
            upload.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(upload.to_ref().byte_len, 3);
    }
}
