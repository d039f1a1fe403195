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

pub mod chart_selector;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod ingest;
pub mod insight;
pub mod llm;
pub mod pipeline;
pub mod profiler;
pub mod session;
pub mod store;
pub mod table;
pub mod values;

pub use chart_selector::{ChartKind, ChartSelector, ChartSpec};
pub use cleaner::{ActionKind, Cleaner, CleaningAction, CleaningLog};
pub use config::{ChartOptions, IngestOptions, InsightOptions, PipelineConfig, ProfilingOptions};
pub use error::{
    AutovizError, CleanError, ConfigError, FailureKind, IngestError, InsightError, Result,
    SessionError, StoreError,
};
pub use ingest::{Ingestor, Upload, UploadRef};
pub use insight::{InsightGenerator, InsightStatement};
pub use llm::OpenAIClient;
pub use pipeline::AnalysisPipeline;
pub use profiler::{ColumnProfile, ColumnType, Correlation, DatasetSummary, Profiler};
pub use session::{
    AnalysisSession, InsightOutcome, SessionId, SessionStatus, SessionSummary, Stage,
};
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};
pub use table::{CleanTable, RawTable, Tabular};
