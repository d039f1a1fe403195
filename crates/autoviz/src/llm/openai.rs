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

use crate::error::ConfigError;
use async_trait::async_trait;
use llm_contracts::{
    CompletionError, CompletionRequest, CompletionResponse, CompletionResult, FinishReason,
    ProviderConfig, TextCompletion, Usage,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Chat-completions client. One HTTP request per `complete` call; retries
/// are left to the caller.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl OpenAIClient {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::invalid("provider", e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.resolve_api_key(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_payload(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.model,
            "messages": request.messages().iter().map(|msg| {
                json!({
                    "role": msg.role.as_str(),
                    "content": msg.content
                })
            }).collect::<Vec<_>>(),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }

    fn parse_response(
        &self,
        request: &CompletionRequest,
        response_data: &Value,
    ) -> CompletionResult<CompletionResponse> {
        let choice = &response_data["choices"][0];
        let finish_reason = choice["finish_reason"].as_str().map(FinishReason::from);
        if finish_reason == Some(FinishReason::ContentFilter) {
            return Err(CompletionError::Refused(
                "response withheld by content filter".to_string(),
            ));
        }
        let content = choice["message"]["content"].as_str().ok_or_else(|| {
            CompletionError::TransportError("response carried no message content".to_string())
        })?;

        let usage = response_data.get("usage").map_or_else(Usage::default, |usage| Usage {
            prompt_tokens: token_count(&usage["prompt_tokens"]),
            completion_tokens: token_count(&usage["completion_tokens"]),
            total_tokens: token_count(&usage["total_tokens"]),
        });
        let model = response_data["model"]
            .as_str()
            .unwrap_or(self.model.as_str())
            .to_string();

        let mut response = CompletionResponse::new(request.id, content, model);
        response.usage = usage;
        response.finish_reason = finish_reason;
        Ok(response)
    }
}

fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn classify_status(status: StatusCode, body: &str) -> CompletionError {
    let detail: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => CompletionError::Timeout,
        s if s.is_server_error() => CompletionError::TransportError(format!("{s}: {detail}")),
        s => CompletionError::Refused(format!("{s}: {detail}")),
    }
}

fn classify_transport(err: &reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::TransportError(err.to_string())
    }
}

#[async_trait]
impl TextCompletion for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<CompletionResponse> {
        let payload = self.build_payload(&request);
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = builder.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        debug!(status = status.as_u16(), request_id = %request.id, "Completion response received");
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, &body));
        }

        let response_data: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::TransportError(format!("Failed to parse response: {e}")))?;
        self.parse_response(&request, &response_data)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAIClient {
        OpenAIClient::new(&ProviderConfig::default(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_payload_shape() {
        let request = CompletionRequest::new("hello", 120, 0.5).with_system_prompt("be brief");
        let payload = client().build_payload(&request);
        assert_eq!(payload["model"], "gpt-3.5-turbo");
        assert_eq!(payload["max_tokens"], 120);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            CompletionError::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::GATEWAY_TIMEOUT, ""),
            CompletionError::Timeout
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream"),
            CompletionError::TransportError(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            CompletionError::Refused(_)
        ));
    }

    #[test]
    fn test_parse_response_reads_usage_and_finish_reason() {
        let request = CompletionRequest::new("hi", 10, 0.0);
        let body = json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"content": "[]"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
        });
        let response = client().parse_response(&request, &body).unwrap();
        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.usage.total_tokens, 10);
        assert_eq!(response.finish_reason, Some(FinishReason::Length));
        assert_eq!(response.request_id, request.id);
    }

    #[test]
    fn test_parse_response_content_filter_is_refused() {
        let request = CompletionRequest::new("hi", 10, 0.0);
        let body = json!({"choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]});
        assert!(matches!(
            client().parse_response(&request, &body),
            Err(CompletionError::Refused(_))
        ));
    }
}
