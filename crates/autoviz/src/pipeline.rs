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

//! Runs the stages in order and records each artifact on the session.

use crate::chart_selector::ChartSelector;
use crate::cleaner::Cleaner;
use crate::config::PipelineConfig;
use crate::error::{ConfigError, SessionError};
use crate::ingest::{Ingestor, Upload};
use crate::insight::InsightGenerator;
use crate::profiler::{correlate, summarize, Profiler};
use crate::session::{AnalysisSession, InsightOutcome, Stage};
use crate::table::Tabular;
use llm_contracts::TextCompletion;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stage failures end up on the returned session as `Failed`; an `Err` here
/// means the session itself was driven out of order.
pub struct AnalysisPipeline {
    config: PipelineConfig,
    ingestor: Ingestor,
    profiler: Profiler,
    cleaner: Cleaner,
    selector: ChartSelector,
    insights: Option<InsightGenerator>,
}

impl AnalysisPipeline {
    pub fn new(
        config: PipelineConfig,
        client: Option<Arc<dyn TextCompletion>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let insights = if config.insight.enabled {
            client.map(|client| InsightGenerator::new(client, &config))
        } else {
            None
        };
        Ok(Self {
            ingestor: Ingestor::new(&config),
            profiler: Profiler::new(&config)?,
            cleaner: Cleaner::new(&config),
            selector: ChartSelector::new(&config),
            insights,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn insights_enabled(&self) -> bool {
        self.insights.is_some()
    }

    pub async fn analyze(
        &self,
        upload: &Upload,
        cancel: &CancellationToken,
    ) -> Result<AnalysisSession, SessionError> {
        let mut session = AnalysisSession::new(upload.to_ref(), self.config.clone());
        let session_id = session.id();
        info!(
            session_id = %session_id,
            filename = upload.filename.as_deref().unwrap_or("<unnamed>"),
            bytes = upload.bytes.len(),
            "Starting analysis"
        );

        let started = Instant::now();
        match self.ingestor.ingest(upload) {
            Ok(raw) => {
                info!(
                    session_id = %session_id,
                    stage = %Stage::Ingest,
                    rows = raw.row_count(),
                    columns = raw.column_count(),
                    rejected = raw.rejected_rows().len(),
                    elapsed_ms = elapsed_ms(started),
                    "Stage complete"
                );
                session.record_ingest(raw)?;
            }
            Err(err) => {
                warn!(session_id = %session_id, stage = %Stage::Ingest, error = %err, "Stage failed");
                session.fail(Stage::Ingest, err.kind(), err.to_string())?;
                return Ok(session);
            }
        }

        self.run_after_ingest(session, cancel).await
    }

    /// New session over the same upload, reusing the previous raw table and
    /// running every later stage under this pipeline's configuration.
    pub async fn reanalyze(
        &self,
        previous: &AnalysisSession,
        cancel: &CancellationToken,
    ) -> Result<AnalysisSession, SessionError> {
        let raw = previous.require_raw_table()?.clone();
        let mut session = AnalysisSession::superseding(previous, self.config.clone());
        info!(
            session_id = %session.id(),
            supersedes = %previous.id(),
            "Re-analysing upload"
        );
        session.record_ingest(raw)?;
        self.run_after_ingest(session, cancel).await
    }

    async fn run_after_ingest(
        &self,
        mut session: AnalysisSession,
        cancel: &CancellationToken,
    ) -> Result<AnalysisSession, SessionError> {
        let session_id = session.id();

        let started = Instant::now();
        let raw_profiles = self.profiler.profile(session.require_raw_table()?);
        info!(
            session_id = %session_id,
            stage = %Stage::Profile,
            columns = raw_profiles.len(),
            elapsed_ms = elapsed_ms(started),
            "Stage complete"
        );
        session.record_profile(raw_profiles)?;

        let started = Instant::now();
        let raw = session.require_raw_table()?;
        let rejected_rows = raw.rejected_rows().len();
        let cleaned = self.cleaner.clean(raw, session.require_raw_profiles()?);
        let (clean_table, log) = match cleaned {
            Ok(result) => result,
            Err(err) => {
                warn!(session_id = %session_id, stage = %Stage::Clean, error = %err, "Stage failed");
                session.fail(Stage::Clean, err.kind(), err.to_string())?;
                return Ok(session);
            }
        };
        let clean_profiles = self
            .profiler
            .profile_pinned(&clean_table, session.require_raw_profiles()?);
        let correlations = correlate(&clean_table, &clean_profiles);
        let mut summary = summarize(&clean_profiles, &clean_table);
        summary.rejected_rows = rejected_rows;
        info!(
            session_id = %session_id,
            stage = %Stage::Clean,
            actions = log.len(),
            rows = clean_table.row_count(),
            columns = clean_table.column_count(),
            elapsed_ms = elapsed_ms(started),
            "Stage complete"
        );
        session.record_clean(clean_table, log, clean_profiles, correlations, summary)?;

        let charts = self.selector.select(
            session.require_clean_profiles()?,
            session.correlations().unwrap_or_default(),
        );
        info!(
            session_id = %session_id,
            stage = %Stage::Visualize,
            charts = charts.len(),
            "Stage complete"
        );
        session.record_charts(charts)?;

        let generator = match &self.insights {
            Some(generator) if !session.require_clean_profiles()?.is_empty() => generator,
            _ => {
                debug!(session_id = %session_id, stage = %Stage::Insight, "Insight stage skipped");
                session.record_insights(InsightOutcome::Skipped)?;
                return Ok(session);
            }
        };

        let started = Instant::now();
        let result = generator
            .generate(
                session.require_clean_profiles()?,
                session.require_charts()?,
                cancel,
            )
            .await;
        match result {
            Ok(statements) => {
                info!(
                    session_id = %session_id,
                    stage = %Stage::Insight,
                    provider = generator.provider_name(),
                    statements = statements.len(),
                    elapsed_ms = elapsed_ms(started),
                    "Stage complete"
                );
                session.record_insights(InsightOutcome::Generated(statements))?;
            }
            Err(err) => {
                warn!(
                    session_id = %session_id,
                    stage = %Stage::Insight,
                    kind = %err.kind(),
                    error = %err,
                    "Stage failed; earlier artifacts kept"
                );
                session.fail(Stage::Insight, err.kind(), err.to_string())?;
            }
        }
        Ok(session)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::session::SessionStatus;

    fn pipeline() -> AnalysisPipeline {
        AnalysisPipeline::new(PipelineConfig::default(), None).unwrap()
    }

    #[tokio::test]
    async fn test_analysis_without_client_skips_insights() {
        let upload = Upload::new(b"age,city\n25,NYC\n,NYC\n30,\n".to_vec()).with_filename("a.csv");
        let session = pipeline()
            .analyze(&upload, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(session.status(), &SessionStatus::Insighted);
        assert_eq!(session.insight_outcome(), Some(&InsightOutcome::Skipped));
        assert!(session.clean_table().is_some());
        assert_eq!(session.history().len(), 5);
    }

    #[tokio::test]
    async fn test_ingest_failure_ends_session() {
        let upload = Upload::new(Vec::new());
        let session = pipeline()
            .analyze(&upload, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            session.failure().map(|(stage, kind, _)| (stage, kind)),
            Some((Stage::Ingest, FailureKind::Empty))
        );
        assert!(session.raw_table().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            null_drop_threshold: 1.5,
            ..Default::default()
        };
        assert!(AnalysisPipeline::new(config, None).is_err());
    }
}
