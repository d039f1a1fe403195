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

#![allow(dead_code)]

use async_trait::async_trait;
use autoviz::config::PipelineConfig;
use llm_contracts::{
    CompletionError, CompletionRequest, CompletionResponse, CompletionResult, TextCompletion,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const INSIGHTS_JSON: &str = r#"[
  {"text": "Ages cluster in the late twenties.", "columns": ["age"], "confidence": 0.7},
  {"text": "Every customer is based in NYC.", "columns": ["city"], "confidence": 0.9}
]"#;

/// Replays a fixed script of completion outcomes, one per call.
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<CompletionResult<String>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<CompletionResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::TransportError("script exhausted".into())));
        next.map(|content| CompletionResponse::new(request.id, content, "scripted"))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Defaults with no backoff delay worth waiting for.
pub fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.insight.backoff_base_ms = 1;
    config
}
