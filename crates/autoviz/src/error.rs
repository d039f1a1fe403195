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

use crate::session::SessionId;
use llm_contracts::CompletionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
/// Closed classification of every way a pipeline stage can fail. Recorded in
/// `SessionStatus::Failed` so persisted sessions stay independent of the
/// error types themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Empty,
    UnsupportedFormat,
    MalformedHeader,
    Encoding,
    TooLarge,
    ProfileMismatch,
    Timeout,
    RateLimited,
    Refused,
    Unparseable,
    TransportError,
    Cancelled,
}
impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Empty => "empty",
            FailureKind::UnsupportedFormat => "unsupported_format",
            FailureKind::MalformedHeader => "malformed_header",
            FailureKind::Encoding => "encoding",
            FailureKind::TooLarge => "too_large",
            FailureKind::ProfileMismatch => "profile_mismatch",
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Refused => "refused",
            FailureKind::Unparseable => "unparseable",
            FailureKind::TransportError => "transport_error",
            FailureKind::Cancelled => "cancelled",
        }
    }
}
impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitUnit {
    Bytes,
    Rows,
}
impl fmt::Display for LimitUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitUnit::Bytes => f.write_str("bytes"),
            LimitUnit::Rows => f.write_str("rows"),
        }
    }
}
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Upload is empty")]
    Empty,
    #[error("Unsupported file format: '{filename}' (expected delimited text)")]
    UnsupportedFormat { filename: String },
    #[error("Upload too large: {actual} {unit} exceeds limit of {limit} {unit}")]
    TooLarge {
        limit: u64,
        actual: u64,
        unit: LimitUnit,
    },
    #[error("Unable to decode upload; attempted encodings: {}", attempted.join(", "))]
    Encoding { attempted: Vec<String> },
    #[error("Malformed header: {reason}")]
    MalformedHeader { reason: String },
}
impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Empty => FailureKind::Empty,
            IngestError::UnsupportedFormat { .. } => FailureKind::UnsupportedFormat,
            IngestError::TooLarge { .. } => FailureKind::TooLarge,
            IngestError::Encoding { .. } => FailureKind::Encoding,
            IngestError::MalformedHeader { .. } => FailureKind::MalformedHeader,
        }
    }
}
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CleanError {
    #[error("Profiles do not match table columns: expected {expected:?}, found {found:?}")]
    ProfileMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}
impl CleanError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CleanError::ProfileMismatch { .. } => FailureKind::ProfileMismatch,
        }
    }
}
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InsightError {
    #[error("Completion timed out")]
    Timeout,
    #[error("Completion provider rate limit exceeded")]
    RateLimited,
    #[error("Completion refused: {0}")]
    Refused(String),
    #[error("Completion response could not be parsed into insights: {0}")]
    Unparseable(String),
    #[error("Completion transport error: {0}")]
    TransportError(String),
    #[error("Insight generation cancelled")]
    Cancelled,
}
impl InsightError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InsightError::Timeout => FailureKind::Timeout,
            InsightError::RateLimited => FailureKind::RateLimited,
            InsightError::Refused(_) => FailureKind::Refused,
            InsightError::Unparseable(_) => FailureKind::Unparseable,
            InsightError::TransportError(_) => FailureKind::TransportError,
            InsightError::Cancelled => FailureKind::Cancelled,
        }
    }
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InsightError::Timeout | InsightError::RateLimited | InsightError::TransportError(_)
        )
    }
}
impl From<CompletionError> for InsightError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Timeout => InsightError::Timeout,
            CompletionError::RateLimited => InsightError::RateLimited,
            CompletionError::Refused(reason) => InsightError::Refused(reason),
            CompletionError::TransportError(reason) => InsightError::TransportError(reason),
        }
    }
}
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session {id} is terminal ({status}); no further changes are accepted")]
    Terminal { id: SessionId, status: String },
    #[error("Illegal transition for session {id}: cannot move from {from} to {to}")]
    IllegalTransition {
        id: SessionId,
        from: String,
        to: String,
    },
    #[error("Session {id} has no {artifact} artifact")]
    MissingArtifact { id: SessionId, artifact: &'static str },
}
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session {0} not found")]
    NotFound(SessionId),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session serialisation failed: {0}")]
    Serialisation(#[from] serde_json::Error),
    #[error("Storage task failed: {0}")]
    Task(String),
}
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid environment override {var}='{value}'")]
    EnvOverride { var: String, value: String },
    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: String, reason: String },
}
impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
#[derive(Error, Debug)]
pub enum AutovizError {
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("Cleaning error: {0}")]
    Clean(#[from] CleanError),
    #[error("Insight error: {0}")]
    Insight(#[from] InsightError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
pub type Result<T> = std::result::Result<T, AutovizError>;
pub type IngestResult<T> = std::result::Result<T, IngestError>;
pub type InsightResult<T> = std::result::Result<T, InsightError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
impl AutovizError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            AutovizError::Insight(err) => err.is_transient(),
            AutovizError::Store(StoreError::NotFound(_)) => true,
            _ => false,
        }
    }
    pub fn category(&self) -> &'static str {
        match self {
            AutovizError::Ingest(_) => "Ingest",
            AutovizError::Clean(_) => "Clean",
            AutovizError::Insight(_) => "Insight",
            AutovizError::Session(_) => "Session",
            AutovizError::Store(_) => "Store",
            AutovizError::Config(_) => "Configuration",
            AutovizError::Io(_) => "I/O",
        }
    }
    pub fn user_message(&self) -> String {
        match self {
            AutovizError::Ingest(IngestError::Empty) => {
                "The uploaded file is empty. Please provide a file with a header row.".to_string()
            }
            AutovizError::Ingest(IngestError::UnsupportedFormat { .. }) => {
                "Only delimited text files (.csv, .tsv, .txt) are supported.".to_string()
            }
            AutovizError::Ingest(IngestError::TooLarge { .. }) => {
                "The uploaded file exceeds the configured size limit.".to_string()
            }
            AutovizError::Store(StoreError::NotFound(id)) => {
                format!("No analysis session with id {id} exists.")
            }
            _ => self.to_string(),
        }
    }
}
