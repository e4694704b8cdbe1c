// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// OpenAI-compatible chat completions plus direct tool invocation and cache
// administration. Every component is injected through AppState; handlers
// never construct clients or stores themselves.

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::cache::ResultCache;
use crate::classifier::{new_call_id, IntentClassifier, LlmIntentExtractor, Mode};
use crate::config::Config;
use crate::executor::ToolExecutor;
use crate::format::OutputFormat;
use crate::message::{ChatCompletionRequest, ToolCall, ToolCallRequest};
use crate::provider::{
    chat_completion, completion_id, reply_completion, HttpProvider, LlmProvider, ProviderError,
    Sampling,
};
use crate::session::{Session, SessionStore};
use crate::stream::{StreamEmitter, StreamPolicy};
use crate::tool::{Arguments, ToolRegistry};

pub const SESSION_HEADER: &str = "x-session-id";
pub const FORMAT_HEADER: &str = "x-output-format";
pub const POLICY_HEADER: &str = "x-stream-policy";

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to HTTP callers as `{"error": {"message", "type"}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("request body is not valid: {0}")]
    MalformedBody(String),

    #[error("request has no messages")]
    NoMessages,

    #[error("tool name '{body}' in body does not match '{path}' in path")]
    NameMismatch { path: String, body: String },

    #[error("tool '{0}' does not exist")]
    ToolNotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::EmptyBody
            | ApiError::MalformedBody(_)
            | ApiError::NoMessages
            | ApiError::NameMismatch { .. } => StatusCode::BAD_REQUEST,
            ApiError::ToolNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Provider(ProviderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message safe to show callers. Provider details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Provider(ProviderError::Timeout(_)) => "upstream request timed out".to_string(),
            ApiError::Provider(_) => "upstream request failed".to_string(),
            other => other.to_string(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::ToolNotFound(_) => "not_found_error",
            ApiError::Provider(ProviderError::Timeout(_)) => "upstream_timeout",
            ApiError::Provider(_) => "upstream_error",
            _ => "invalid_request_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"error": {"message": self.public_message(), "type": self.kind()}});
        (self.status(), Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub cache: Arc<ResultCache>,
    pub sessions: Arc<SessionStore>,
    pub classifier: Arc<IntentClassifier>,
    pub executor: Arc<ToolExecutor>,
    pub provider: Arc<dyn LlmProvider>,
}

impl AppState {
    /// Wire every component from configuration. The provider is an
    /// HttpProvider over `client`; the same provider backs intent extraction
    /// when it is enabled.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let registry = Arc::new(ToolRegistry::with_builtin());
        let cache = Arc::new(ResultCache::new(config.cache.max_size, config.cache.ttl));
        let sessions = Arc::new(SessionStore::new(config.sessions.ttl));
        let provider: Arc<dyn LlmProvider> = Arc::new(HttpProvider::new(client, &config.provider));

        let mut classifier = IntentClassifier::new(Arc::clone(&registry));
        if config.classifier.llm_extraction {
            let extractor = LlmIntentExtractor::new(
                Arc::clone(&provider),
                config.classifier.extractor_model.clone(),
            );
            classifier = classifier.with_extractor(Arc::new(extractor), config.classifier.timeout);
        }

        let executor = Arc::new(ToolExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            config.tools.timeout,
        ));

        Self {
            registry,
            cache,
            sessions,
            classifier: Arc::new(classifier),
            executor,
            provider,
        }
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn session_for(state: &AppState, headers: &HeaderMap) -> Option<Arc<Session>> {
    header_str(headers, SESSION_HEADER).map(|id| state.sessions.get_or_create(Some(id), None))
}

fn sse_response(stream: ReceiverStream<Bytes>) -> Response {
    let body = Body::from_stream(stream.map(Ok::<Bytes, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// POST /v1/chat/completions
///
/// Classifies the conversation, then either executes tool calls locally or
/// forwards to the upstream provider. Honors `stream` and the session,
/// format and stream-policy headers.
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError::EmptyBody);
    }
    let request: ChatCompletionRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::MalformedBody(e.to_string()))?;
    if request.messages.is_empty() {
        return Err(ApiError::NoMessages);
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    let session = session_for(&state, &headers);
    let format = header_str(&headers, FORMAT_HEADER)
        .map(OutputFormat::parse)
        .unwrap_or_default();
    let policy = header_str(&headers, POLICY_HEADER)
        .map(StreamPolicy::parse)
        .unwrap_or_default();

    let available_tools = request.available_tools().to_vec();
    let (mode, messages) = state
        .classifier
        .classify(request.messages.clone(), &available_tools)
        .await;

    tracing::info!(
        request_id = %request_id,
        model = %request.model,
        mode = mode.as_str(),
        session_id = session.as_ref().map(|s| s.id()).unwrap_or_default(),
        stream = request.stream,
        "chat completion classified"
    );

    if mode == Mode::ToolCall {
        let calls: Vec<ToolCallRequest> = messages
            .last()
            .map(|m| m.tool_calls.iter().map(ToolCallRequest::from).collect())
            .unwrap_or_default();

        if request.stream {
            let emitter = StreamEmitter::new(Arc::clone(&state.executor), &request.model)
                .with_session(session)
                .with_format(format);
            return Ok(sse_response(emitter.spawn_tool_calls(calls, policy)));
        }

        let outcomes = state
            .executor
            .execute(&calls, session.as_deref(), format)
            .await;
        let content = outcomes
            .iter()
            .map(|o| o.output.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let tool_calls = messages.last().map(|m| m.tool_calls.clone()).unwrap_or_default();
        let message = json!({
            "role": "assistant",
            "content": content,
            "tool_calls": tool_calls,
            "tool_results": outcomes,
        });
        let completion = chat_completion(&completion_id(), &request.model, message, "tool_calls", None);
        return Ok(Json(completion).into_response());
    }

    let started = std::time::Instant::now();
    let forwarded = state
        .provider
        .forward(&request.model, &messages, request.sampling())
        .await;
    let response = match forwarded {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "provider request failed");
            if request.stream {
                let emitter = StreamEmitter::new(Arc::clone(&state.executor), &request.model);
                return Ok(sse_response(emitter.spawn_error(ApiError::from(e).public_message())));
            }
            return Err(e.into());
        }
    };
    tracing::debug!(
        request_id = %request_id,
        latency_ms = started.elapsed().as_millis() as u64,
        "provider replied"
    );

    let mut completion = reply_completion(&response, &request.model);
    if mode == Mode::Hybrid {
        state
            .classifier
            .refine_hybrid(&mut completion, &available_tools)
            .await;
    }

    if request.stream {
        let content = completion
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tool_calls: Vec<ToolCall> = completion
            .pointer("/choices/0/message/tool_calls")
            .and_then(|calls| serde_json::from_value(calls.clone()).ok())
            .unwrap_or_default();
        let emitter = StreamEmitter::new(Arc::clone(&state.executor), &request.model);
        return Ok(sse_response(emitter.spawn_reply(content, tool_calls)));
    }
    Ok(Json(completion).into_response())
}

/// GET /v1/tools
pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "tools": state.registry.list() }))
}

#[derive(Debug, Default, Deserialize)]
struct ToolInvocation {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parameters: Arguments,
}

/// POST /v1/tools/:name
///
/// Runs one tool through the executor. An empty body means no parameters.
pub async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if !state.registry.contains(&name) {
        return Err(ApiError::ToolNotFound(name));
    }

    let invocation = if body.is_empty() {
        ToolInvocation::default()
    } else {
        serde_json::from_slice::<ToolInvocation>(&body)
            .map_err(|e| ApiError::MalformedBody(e.to_string()))?
    };
    if let Some(body_name) = invocation.name.filter(|n| *n != name) {
        return Err(ApiError::NameMismatch {
            path: name,
            body: body_name,
        });
    }

    let session = session_for(&state, &headers);
    let call = ToolCallRequest::new(
        new_call_id(),
        name.as_str(),
        Value::Object(invocation.parameters).to_string(),
    );
    let outcome = state
        .executor
        .execute_one(&call, session.as_deref(), OutputFormat::Json)
        .await;

    Ok(Json(json!({
        "name": name,
        "success": outcome.result.success,
        "data": outcome.result.data,
        "error": outcome.result.error,
    })))
}

/// GET /v1/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.cache.stats())
}

/// DELETE /v1/cache
pub async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.cache.clear();
    StatusCode::NO_CONTENT
}

/// GET /v1/sessions/stats
pub async fn session_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sessions.stats())
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with every route bound to `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/tools", get(list_tools))
        .route("/v1/tools/:name", post(call_tool))
        .route("/v1/cache/stats", get(cache_stats))
        .route("/v1/cache", delete(clear_cache))
        .route("/v1/sessions/stats", get(session_stats))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
