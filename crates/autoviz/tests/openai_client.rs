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

use autoviz::llm::OpenAIClient;
use llm_contracts::{CompletionError, CompletionRequest, FinishReason, ProviderConfig, TextCompletion};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> OpenAIClient {
    let config = ProviderConfig {
        endpoint: format!("{}/v1/chat/completions", server.uri()),
        model: "gpt-4o-mini".to_string(),
        api_key_env: "AUTOVIZ_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
    };
    OpenAIClient::new(&config, Duration::from_secs(5))
        .unwrap()
        .with_api_key("test-key")
}

fn request() -> CompletionRequest {
    CompletionRequest::new("Summarise the columns", 300, 0.7)
        .with_system_prompt("You are a helpful data analysis assistant.")
}

async fn respond_with_status(status: u16) -> CompletionError {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_string("upstream says no"))
        .mount(&server)
        .await;
    client_for(&server)
        .await
        .complete(request())
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_successful_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 300,
            "messages": [
                {"role": "system", "content": "You are a helpful data analysis assistant."},
                {"role": "user", "content": "Summarise the columns"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {"role": "assistant", "content": "[\"Ages skew young.\"]"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 42, "completion_tokens": 8, "total_tokens": 50}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let req = request();
    let response = client_for(&server).await.complete(req.clone()).await.unwrap();
    assert_eq!(response.content, "[\"Ages skew young.\"]");
    assert_eq!(response.request_id, req.id);
    assert_eq!(response.usage.total_tokens, 50);
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn test_rate_limit_status() {
    assert_eq!(respond_with_status(429).await, CompletionError::RateLimited);
}

#[tokio::test]
async fn test_gateway_timeout_status() {
    assert_eq!(respond_with_status(504).await, CompletionError::Timeout);
}

#[tokio::test]
async fn test_server_error_is_transport() {
    assert!(matches!(
        respond_with_status(503).await,
        CompletionError::TransportError(_)
    ));
}

#[tokio::test]
async fn test_client_error_is_refusal() {
    let err = respond_with_status(400).await;
    assert!(matches!(err, CompletionError::Refused(ref detail) if detail.contains("upstream says no")));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_content_filter_is_refusal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": ""}, "finish_reason": "content_filter"}]
        })))
        .mount(&server)
        .await;
    let err = client_for(&server).await.complete(request()).await.unwrap_err();
    assert!(matches!(err, CompletionError::Refused(_)));
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    let config = ProviderConfig {
        endpoint: server.uri(),
        ..Default::default()
    };
    let client = OpenAIClient::new(&config, Duration::from_millis(200)).unwrap();
    assert_eq!(
        client.complete(request()).await.unwrap_err(),
        CompletionError::Timeout
    );
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let config = ProviderConfig {
        endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
        ..Default::default()
    };
    let client = OpenAIClient::new(&config, Duration::from_secs(2)).unwrap();
    assert!(matches!(
        client.complete(request()).await.unwrap_err(),
        CompletionError::TransportError(_) | CompletionError::Timeout
    ));
}
