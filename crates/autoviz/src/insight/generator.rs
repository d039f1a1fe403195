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

use super::{InsightStatement, PromptBuilder, ResponseParser};
use crate::chart_selector::ChartSpec;
use crate::config::PipelineConfig;
use crate::error::{InsightError, InsightResult};
use crate::profiler::ColumnProfile;
use llm_contracts::{CompletionRequest, FinishReason, TextCompletion};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives one insight request against a completion service. Each attempt is
/// bounded by a timeout and transient failures back off exponentially.
pub struct InsightGenerator {
    client: Arc<dyn TextCompletion>,
    prompts: PromptBuilder,
    max_tokens: u32,
    temperature: f32,
    max_statements: usize,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl InsightGenerator {
    pub fn new(client: Arc<dyn TextCompletion>, config: &PipelineConfig) -> Self {
        Self {
            client,
            prompts: PromptBuilder::new(&config.insight),
            max_tokens: config.insight.max_tokens,
            temperature: config.insight.temperature,
            max_statements: config.insight.max_statements,
            timeout: config.completion_timeout(),
            max_retries: config.completion_max_retries,
            backoff_base: config.backoff_base(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    pub async fn generate(
        &self,
        profiles: &[ColumnProfile],
        charts: &[ChartSpec],
        cancel: &CancellationToken,
    ) -> InsightResult<Vec<InsightStatement>> {
        let prompt = self.prompts.build(profiles, charts);
        let request = CompletionRequest::new(prompt.user, self.max_tokens, self.temperature)
            .with_system_prompt(prompt.system);
        let parser = ResponseParser::new(
            profiles.iter().map(|p| p.name.clone()).collect(),
            self.max_statements,
        );

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(InsightError::Cancelled);
            }
            debug!(
                provider = self.client.provider_name(),
                attempt,
                request_id = %request.id,
                "Requesting insights"
            );

            // An in-flight call is never interrupted; the token is honoured
            // before each attempt and while backing off.
            let outcome =
                tokio::time::timeout(self.timeout, self.client.complete(request.clone())).await;

            let error = match outcome {
                Ok(Ok(response)) => {
                    if response.finish_reason == Some(FinishReason::ContentFilter) {
                        warn!(request_id = %request.id, "Completion stopped by content filter");
                        return Err(InsightError::Refused(
                            "response withheld by content filter".to_string(),
                        ));
                    }
                    let statements = parser.parse(&response.content)?;
                    info!(
                        statements = statements.len(),
                        attempts = attempt + 1,
                        total_tokens = response.usage.total_tokens,
                        "Insights generated"
                    );
                    return Ok(statements);
                }
                Ok(Err(err)) => InsightError::from(err),
                Err(_) => InsightError::Timeout,
            };

            if !error.is_transient() || attempt >= self.max_retries {
                warn!(attempt, error = %error, "Insight generation failed");
                return Err(error);
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                attempt,
                error = %error,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Transient completion failure, retrying"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(InsightError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2_u32.saturating_pow(attempt.min(16)))
    }
}
