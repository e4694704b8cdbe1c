// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Integration tests
//
// End-to-end tests exercising the full pipeline:
// request -> classify (LLM extraction or rules) -> execute or forward -> response
//
// Uses wiremock as the upstream provider, tower::ServiceExt::oneshot for
// in-process HTTP, and the real components wired from YAML config.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use serde_json::{json, Value};
use std::time::Duration;
use toolmux::config::{self, StringSource};
use toolmux::server::{self, AppState};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Infrastructure
// ---------------------------------------------------------------------------

const PROVIDER_PATH: &str = "/v1/chat/completions";

fn test_yaml(mock_url: &str, llm_extraction: bool, provider_timeout_ms: u64) -> String {
    format!(
        r#"toolmux: v1
environment: test

tools:
  timeout_ms: 2000

cache:
  max_size: 50
  ttl_secs: 60

classifier:
  llm_extraction: {llm_extraction}
  extractor_model: extractor-test
  timeout_ms: 1000

provider:
  base_url: "{mock_url}{PROVIDER_PATH}"
  api_key: test-key
  timeout_ms: {provider_timeout_ms}
  temperature: 0.2
"#
    )
}

/// Build the real application state, provider pointed at wiremock.
fn build_app(mock_url: &str, llm_extraction: bool) -> (axum::Router, AppState) {
    build_app_with_timeout(mock_url, llm_extraction, 2000)
}

fn build_app_with_timeout(
    mock_url: &str,
    llm_extraction: bool,
    provider_timeout_ms: u64,
) -> (axum::Router, AppState) {
    let source = StringSource::new(test_yaml(mock_url, llm_extraction, provider_timeout_ms));
    let config = config::load_config(&source).expect("test config should parse");
    let state = AppState::from_config(&config, reqwest::Client::new());
    (server::build_router(state.clone()), state)
}

fn json_request(path_str: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path_str)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Bytes {
    axum::body::to_bytes(resp.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

fn provider_reply(content: &str) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14},
    })
}

fn weather_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": "weather",
            "description": "Look up current weather for a city",
            "parameters": {"type": "object", "properties": {"city": {"type": "string"}}},
        },
    })
}

// ---------------------------------------------------------------------------
// Test 1: Plain conversation is forwarded with model, messages and auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conversation_forwarded_to_provider() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PROVIDER_PATH))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "stream": false,
            "temperature": 0.2,
            "messages": [{"role": "user", "content": "hello"}],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_reply("Hi there!")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (app, _) = build_app(&mock_server.uri(), true);
    let req = json_request(
        "/v1/chat/completions",
        &json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hello"}]}),
    );
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["id"], "chatcmpl-mock");
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi there!");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 14);
}

#[tokio::test]
async fn request_sampling_overrides_reach_provider() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PROVIDER_PATH))
        .and(body_partial_json(json!({"temperature": 0.9, "max_tokens": 64})))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_reply("ok")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (app, _) = build_app(&mock_server.uri(), false);
    let req = json_request(
        "/v1/chat/completions",
        &json!({
            "model": "gpt-4o",
            "temperature": 0.9,
            "max_tokens": 64,
            "messages": [{"role": "user", "content": "hello"}],
        }),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Test 2: LLM extraction selects the tool and its parameters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn llm_extraction_drives_tool_call() {
    let mock_server = MockServer::start().await;

    let extraction = "```json\n{\"tool\": \"weather\", \"parameters\": {\"city\": \"深圳\", \"country\": \"CN\", \"units\": \"imperial\"}}\n```";
    Mock::given(method("POST"))
        .and(path(PROVIDER_PATH))
        .and(body_partial_json(json!({"model": "extractor-test"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_reply(extraction)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (app, _) = build_app(&mock_server.uri(), true);
    let req = json_request(
        "/v1/chat/completions",
        &json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "深圳出门要带伞吗"}],
            "tools": [weather_tool()],
        }),
    );
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let message = &body["choices"][0]["message"];
    assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
    assert_eq!(message["tool_calls"][0]["function"]["name"], "weather");

    let data = &message["tool_results"][0]["result"]["data"];
    assert_eq!(data["city"], "深圳");
    assert_eq!(data["units"], "fahrenheit");
}

// ---------------------------------------------------------------------------
// Test 3: Extraction failure falls back to keyword rules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn extraction_failure_falls_back_to_rules() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PROVIDER_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (app, _) = build_app(&mock_server.uri(), true);
    let req = json_request(
        "/v1/chat/completions",
        &json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "北京天气怎么样"}],
            "tools": [weather_tool()],
        }),
    );
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let call = &body["choices"][0]["message"]["tool_calls"][0];
    assert!(call["id"].as_str().unwrap().starts_with("call_"));
    let arguments: Value =
        serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(arguments, json!({"city": "北京", "country": "CN"}));
}

// ---------------------------------------------------------------------------
// Test 4: Upstream failures map to gateway statuses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upstream_5xx_returns_502() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PROVIDER_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let (app, _) = build_app(&mock_server.uri(), false);
    let req = json_request(
        "/v1/chat/completions",
        &json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hello"}]}),
    );
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["type"], "upstream_error");
    assert_eq!(body["error"]["message"], "upstream request failed");
}

#[tokio::test]
async fn slow_upstream_returns_504() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PROVIDER_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(provider_reply("too late"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let (app, _) = build_app_with_timeout(&mock_server.uri(), false, 200);
    let req = json_request(
        "/v1/chat/completions",
        &json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hello"}]}),
    );
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
}

// ---------------------------------------------------------------------------
// Test 5: Repeated tool calls are served from the cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_tool_call_is_cached() {
    let mock_server = MockServer::start().await;
    let (app, state) = build_app(&mock_server.uri(), false);

    let request = json!({
        "model": "gpt-4o",
        "messages": [{
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": {"name": "weather", "arguments": "{\"city\": \"杭州\"}"},
            }],
        }],
    });

    let first = body_json(
        app.clone()
            .oneshot(json_request("/v1/chat/completions", &request))
            .await
            .unwrap(),
    )
    .await;
    let second = body_json(
        app.oneshot(json_request("/v1/chat/completions", &request))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(first["choices"][0]["message"]["tool_results"][0]["cached"], false);
    assert_eq!(second["choices"][0]["message"]["tool_results"][0]["cached"], true);
    assert_eq!(
        first["choices"][0]["message"]["tool_results"][0]["result"],
        second["choices"][0]["message"]["tool_results"][0]["result"]
    );

    let stats = state.cache.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.max_size, 50);
}

// ---------------------------------------------------------------------------
// Test 6: Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streaming_conversation_wraps_provider_reply() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PROVIDER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_reply("streamed reply")))
        .mount(&mock_server)
        .await;

    let (app, _) = build_app(&mock_server.uri(), false);
    let req = json_request(
        "/v1/chat/completions",
        &json!({
            "model": "gpt-4o",
            "stream": true,
            "messages": [{"role": "user", "content": "hello"}],
        }),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.headers()["content-type"], "text/event-stream");

    let text = String::from_utf8(body_bytes(resp).await.to_vec()).unwrap();
    let frames: Vec<&str> = text.split_terminator("\n\n").collect();
    assert_eq!(frames.len(), 3);

    let data: Value = serde_json::from_str(frames[0].trim_start_matches("event: message\ndata: ")).unwrap();
    assert_eq!(data["object"], "chat.completion.chunk");
    assert_eq!(data["choices"][0]["delta"]["content"], "streamed reply");
    assert_eq!(frames[2], "event: done\ndata: {}");
}

#[tokio::test]
async fn auto_policy_streams_one_combined_message() {
    let mock_server = MockServer::start().await;
    let (app, _) = build_app(&mock_server.uri(), false);

    let request = json!({
        "model": "gpt-4o",
        "stream": true,
        "messages": [{
            "role": "assistant",
            "content": null,
            "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "echo", "arguments": "{\"message\": \"one\"}"}},
                {"id": "c2", "type": "function", "function": {"name": "echo", "arguments": "{\"message\": \"two\"}"}},
            ],
        }],
    });
    let mut req = json_request("/v1/chat/completions", &request);
    req.headers_mut()
        .insert(server::POLICY_HEADER, "auto".parse().unwrap());
    req.headers_mut()
        .insert(server::FORMAT_HEADER, "text".parse().unwrap());
    let resp = app.oneshot(req).await.unwrap();

    let text = String::from_utf8(body_bytes(resp).await.to_vec()).unwrap();
    assert!(!text.contains("\"tool_calls\":[{"), "auto policy must not announce calls");
    assert!(text.contains("processed_message: one"));
    assert!(text.contains("processed_message: two"));
    assert!(text.ends_with("event: done\ndata: {}\n\n"));
}
