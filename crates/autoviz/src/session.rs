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

//! The analysis session: one upload, its artifacts and a forward-only
//! lifecycle.

use crate::chart_selector::ChartSpec;
use crate::cleaner::CleaningLog;
use crate::config::PipelineConfig;
use crate::error::{FailureKind, SessionError};
use crate::ingest::UploadRef;
use crate::insight::InsightStatement;
use crate::profiler::{ColumnProfile, Correlation, DatasetSummary};
use crate::table::{CleanTable, RawTable, Tabular};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Profile,
    Clean,
    Visualize,
    Insight,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Profile => "profile",
            Stage::Clean => "clean",
            Stage::Visualize => "visualize",
            Stage::Insight => "insight",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle position. Success states advance one step at a time;
/// `Failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Ingested,
    Profiled,
    Cleaned,
    Visualized,
    Insighted,
    Failed {
        stage: Stage,
        kind: FailureKind,
        message: String,
    },
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Insighted | SessionStatus::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Ingested => "ingested",
            SessionStatus::Profiled => "profiled",
            SessionStatus::Cleaned => "cleaned",
            SessionStatus::Visualized => "visualized",
            SessionStatus::Insighted => "insighted",
            SessionStatus::Failed { .. } => "failed",
        }
    }

    /// The stage that moves a session out of this state.
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            SessionStatus::Created => Some(Stage::Ingest),
            SessionStatus::Ingested => Some(Stage::Profile),
            SessionStatus::Profiled => Some(Stage::Clean),
            SessionStatus::Cleaned => Some(Stage::Visualize),
            SessionStatus::Visualized => Some(Stage::Insight),
            SessionStatus::Insighted | SessionStatus::Failed { .. } => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Failed { stage, kind, .. } => write!(f, "failed({stage}, {kind})"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub at: DateTime<Utc>,
}

/// Result of the insight stage. `Skipped` means no insight was requested,
/// which is not a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "statements", rename_all = "snake_case")]
pub enum InsightOutcome {
    Generated(Vec<InsightStatement>),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSession {
    id: SessionId,
    upload: UploadRef,
    supersedes: Option<SessionId>,
    created_at: DateTime<Utc>,
    config: PipelineConfig,
    status: SessionStatus,
    history: Vec<Transition>,
    raw_table: Option<RawTable>,
    raw_profiles: Option<Vec<ColumnProfile>>,
    cleaning_log: Option<CleaningLog>,
    clean_table: Option<CleanTable>,
    clean_profiles: Option<Vec<ColumnProfile>>,
    correlations: Option<Vec<Correlation>>,
    summary: Option<DatasetSummary>,
    charts: Option<Vec<ChartSpec>>,
    insights: Option<InsightOutcome>,
}

impl AnalysisSession {
    pub fn new(upload: UploadRef, config: PipelineConfig) -> Self {
        Self {
            id: SessionId::new(),
            upload,
            supersedes: None,
            created_at: Utc::now(),
            config,
            status: SessionStatus::Created,
            history: Vec::new(),
            raw_table: None,
            raw_profiles: None,
            cleaning_log: None,
            clean_table: None,
            clean_profiles: None,
            correlations: None,
            summary: None,
            charts: None,
            insights: None,
        }
    }

    /// A fresh session over the same upload. The previous session is left
    /// untouched.
    pub fn superseding(previous: &AnalysisSession, config: PipelineConfig) -> Self {
        let mut session = Self::new(previous.upload.clone(), config);
        session.supersedes = Some(previous.id);
        session
    }

    pub fn record_ingest(&mut self, raw_table: RawTable) -> Result<(), SessionError> {
        self.advance(&SessionStatus::Created, SessionStatus::Ingested)?;
        self.raw_table = Some(raw_table);
        Ok(())
    }

    pub fn record_profile(&mut self, profiles: Vec<ColumnProfile>) -> Result<(), SessionError> {
        self.advance(&SessionStatus::Ingested, SessionStatus::Profiled)?;
        self.raw_profiles = Some(profiles);
        Ok(())
    }

    pub fn record_clean(
        &mut self,
        clean_table: CleanTable,
        log: CleaningLog,
        clean_profiles: Vec<ColumnProfile>,
        correlations: Vec<Correlation>,
        summary: DatasetSummary,
    ) -> Result<(), SessionError> {
        self.advance(&SessionStatus::Profiled, SessionStatus::Cleaned)?;
        self.clean_table = Some(clean_table);
        self.cleaning_log = Some(log);
        self.clean_profiles = Some(clean_profiles);
        self.correlations = Some(correlations);
        self.summary = Some(summary);
        Ok(())
    }

    pub fn record_charts(&mut self, charts: Vec<ChartSpec>) -> Result<(), SessionError> {
        self.advance(&SessionStatus::Cleaned, SessionStatus::Visualized)?;
        self.charts = Some(charts);
        Ok(())
    }

    pub fn record_insights(&mut self, outcome: InsightOutcome) -> Result<(), SessionError> {
        self.advance(&SessionStatus::Visualized, SessionStatus::Insighted)?;
        self.insights = Some(outcome);
        Ok(())
    }

    /// Moves to `Failed`, keeping every artifact already recorded.
    pub fn fail(
        &mut self,
        stage: Stage,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let failed = SessionStatus::Failed {
            stage,
            kind,
            message: message.into(),
        };
        self.transition_to(failed);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::Terminal {
                id: self.id,
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    fn advance(&mut self, expected: &SessionStatus, to: SessionStatus) -> Result<(), SessionError> {
        self.ensure_open()?;
        if &self.status != expected {
            return Err(SessionError::IllegalTransition {
                id: self.id,
                from: self.status.name().to_string(),
                to: to.name().to_string(),
            });
        }
        self.transition_to(to);
        Ok(())
    }

    fn transition_to(&mut self, to: SessionStatus) {
        self.history.push(Transition {
            from: self.status.name().to_string(),
            to: to.name().to_string(),
            at: Utc::now(),
        });
        self.status = to;
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn upload(&self) -> &UploadRef {
        &self.upload
    }

    pub fn supersedes(&self) -> Option<SessionId> {
        self.supersedes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SessionStatus::Failed { .. })
    }

    /// Stage and kind of the failure, if the session failed.
    pub fn failure(&self) -> Option<(Stage, FailureKind, &str)> {
        match &self.status {
            SessionStatus::Failed {
                stage,
                kind,
                message,
            } => Some((*stage, *kind, message.as_str())),
            _ => None,
        }
    }

    pub fn raw_table(&self) -> Option<&RawTable> {
        self.raw_table.as_ref()
    }

    pub fn raw_profiles(&self) -> Option<&[ColumnProfile]> {
        self.raw_profiles.as_deref()
    }

    pub fn cleaning_log(&self) -> Option<&CleaningLog> {
        self.cleaning_log.as_ref()
    }

    pub fn clean_table(&self) -> Option<&CleanTable> {
        self.clean_table.as_ref()
    }

    pub fn clean_profiles(&self) -> Option<&[ColumnProfile]> {
        self.clean_profiles.as_deref()
    }

    pub fn correlations(&self) -> Option<&[Correlation]> {
        self.correlations.as_deref()
    }

    pub fn summary(&self) -> Option<&DatasetSummary> {
        self.summary.as_ref()
    }

    pub fn charts(&self) -> Option<&[ChartSpec]> {
        self.charts.as_deref()
    }

    pub fn insight_outcome(&self) -> Option<&InsightOutcome> {
        self.insights.as_ref()
    }

    /// Generated statements; `None` when the stage was skipped, failed or
    /// not reached.
    pub fn insights(&self) -> Option<&[InsightStatement]> {
        match &self.insights {
            Some(InsightOutcome::Generated(statements)) => Some(statements),
            _ => None,
        }
    }

    pub fn require_raw_table(&self) -> Result<&RawTable, SessionError> {
        self.raw_table().ok_or(SessionError::MissingArtifact {
            id: self.id,
            artifact: "raw_table",
        })
    }

    pub fn require_raw_profiles(&self) -> Result<&[ColumnProfile], SessionError> {
        self.raw_profiles().ok_or(SessionError::MissingArtifact {
            id: self.id,
            artifact: "raw_profiles",
        })
    }

    pub fn require_clean_profiles(&self) -> Result<&[ColumnProfile], SessionError> {
        self.clean_profiles().ok_or(SessionError::MissingArtifact {
            id: self.id,
            artifact: "clean_profiles",
        })
    }

    pub fn require_charts(&self) -> Result<&[ChartSpec], SessionError> {
        self.charts().ok_or(SessionError::MissingArtifact {
            id: self.id,
            artifact: "charts",
        })
    }

    pub fn to_summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            filename: self.upload.filename.clone(),
            created_at: self.created_at,
            status: self.status.to_string(),
            supersedes: self.supersedes,
            rows: self.clean_table.as_ref().map(Tabular::row_count),
            columns: self.clean_table.as_ref().map(Tabular::column_count),
            chart_count: self.charts.as_ref().map_or(0, Vec::len),
            insight_count: self.insights().map_or(0, <[InsightStatement]>::len),
        }
    }
}

/// History row, as listed by a session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub supersedes: Option<SessionId>,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub chart_count: usize,
    pub insight_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Upload;

    fn session() -> AnalysisSession {
        let upload = Upload::new(b"a,b\n1,2\n".to_vec()).with_filename("t.csv");
        AnalysisSession::new(upload.to_ref(), PipelineConfig::default())
    }

    fn raw() -> RawTable {
        RawTable::new(
            vec!["a".into(), "b".into()],
            vec![vec![Some("1".into()), Some("2".into())]],
        )
    }

    #[test]
    fn test_session_id_round_trips_through_display() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_forward_transitions_are_recorded() {
        let mut s = session();
        assert_eq!(s.status(), &SessionStatus::Created);
        s.record_ingest(raw()).unwrap();
        s.record_profile(Vec::new()).unwrap();
        assert_eq!(s.status(), &SessionStatus::Profiled);
        let names: Vec<(&str, &str)> = s
            .history()
            .iter()
            .map(|t| (t.from.as_str(), t.to.as_str()))
            .collect();
        assert_eq!(names, vec![("created", "ingested"), ("ingested", "profiled")]);
    }

    #[test]
    fn test_skipping_a_stage_is_illegal() {
        let mut s = session();
        let err = s.record_profile(Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::IllegalTransition { ref from, ref to, .. } if from == "created" && to == "profiled"
        ));
        assert_eq!(s.status(), &SessionStatus::Created);
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_stage_cannot_be_revisited() {
        let mut s = session();
        s.record_ingest(raw()).unwrap();
        assert!(matches!(
            s.record_ingest(raw()),
            Err(SessionError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_failure_keeps_prior_artifacts_and_is_terminal() {
        let mut s = session();
        s.record_ingest(raw()).unwrap();
        s.fail(Stage::Profile, FailureKind::ProfileMismatch, "boom")
            .unwrap();
        assert!(s.status().is_terminal());
        assert!(s.raw_table().is_some());
        assert_eq!(
            s.failure(),
            Some((Stage::Profile, FailureKind::ProfileMismatch, "boom"))
        );
        assert!(matches!(
            s.fail(Stage::Profile, FailureKind::Timeout, "again"),
            Err(SessionError::Terminal { .. })
        ));
        assert!(matches!(
            s.record_profile(Vec::new()),
            Err(SessionError::Terminal { .. })
        ));
        assert_eq!(s.status().to_string(), "failed(profile, profile_mismatch)");
    }

    #[test]
    fn test_skipped_insights_differ_from_not_reached() {
        let mut s = session();
        assert!(s.insight_outcome().is_none());
        s.record_ingest(raw()).unwrap();
        s.record_profile(Vec::new()).unwrap();
        assert!(s.require_charts().is_err());
        s.status = SessionStatus::Visualized;
        s.record_insights(InsightOutcome::Skipped).unwrap();
        assert_eq!(s.insight_outcome(), Some(&InsightOutcome::Skipped));
        assert!(s.insights().is_none());
        assert_eq!(s.status(), &SessionStatus::Insighted);
    }

    #[test]
    fn test_superseding_session_shares_upload() {
        let first = session();
        let second = AnalysisSession::superseding(&first, PipelineConfig::default());
        assert_ne!(first.id(), second.id());
        assert_eq!(second.supersedes(), Some(first.id()));
        assert_eq!(second.upload(), first.upload());
        assert_eq!(second.status(), &SessionStatus::Created);
    }

    #[test]
    fn test_session_serialises_status_tag() {
        let mut s = session();
        s.fail(Stage::Ingest, FailureKind::Encoding, "bad bytes")
            .unwrap();
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["status"]["state"], "failed");
        assert_eq!(value["status"]["kind"], "encoding");
        let back: AnalysisSession = serde_json::from_value(value).unwrap();
        assert_eq!(back, s);
    }
}
