// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Upstream LLM provider
//
// The provider is a black box: messages and a model go in, a provider JSON
// document comes out. Handlers and the classifier only ever see the
// `LlmProvider` trait; `HttpProvider` is the reqwest-backed implementation
// wired up by the binary.
//
// Provider response shapes vary, so reply text is pulled out by
// `extract_reply_text`, and completions returned to clients are always
// rebuilt in OpenAI chat.completion shape.

mod http;

pub use http::HttpProvider;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::message::Message;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from forwarding a conversation upstream.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request timed out: {0}")]
    Timeout(String),

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider response is not valid JSON: {0}")]
    InvalidResponse(String),
}

// ---------------------------------------------------------------------------
// Trait: LlmProvider (dependency injection point)
// ---------------------------------------------------------------------------

/// Sampling settings a caller put on its request. Unset fields fall back to
/// the provider configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sampling {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Abstraction over the outbound LLM call.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn forward(
        &self,
        model: &str,
        messages: &[Message],
        sampling: Sampling,
    ) -> Result<Value, ProviderError>;
}

// ---------------------------------------------------------------------------
// Reply extraction
// ---------------------------------------------------------------------------

/// Pull the assistant reply text out of a provider response.
///
/// Tried in order: `choices[0].message.content`, `output.text`,
/// `choices[0].text`, then the first top-level object (or object inside a
/// top-level array) carrying a string `content`. Anything else falls back to
/// the raw JSON text.
pub fn extract_reply_text(response: &Value) -> String {
    let first_choice = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first());

    if let Some(message) = first_choice.and_then(|c| c.get("message")) {
        return message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }

    if let Some(text) = response.pointer("/output/text").and_then(Value::as_str) {
        return text.to_string();
    }

    if let Some(text) = first_choice.and_then(|c| c.get("text")).and_then(Value::as_str) {
        return text.to_string();
    }

    if let Some(map) = response.as_object() {
        for value in map.values() {
            let candidates: Vec<&Value> = match value {
                Value::Object(_) => vec![value],
                Value::Array(items) => items.iter().collect(),
                _ => Vec::new(),
            };
            if let Some(content) = candidates
                .into_iter()
                .find_map(|v| v.get("content").and_then(Value::as_str))
            {
                return content.to_string();
            }
        }
    }

    tracing::warn!("could not locate reply text in provider response, returning it raw");
    response.to_string()
}

// ---------------------------------------------------------------------------
// Response builders
// ---------------------------------------------------------------------------

/// A fresh `chatcmpl-` completion id.
pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn empty_usage() -> Value {
    json!({"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0})
}

/// Build an OpenAI `chat.completion` with a single choice.
pub fn chat_completion(
    id: &str,
    model: &str,
    message: Value,
    finish_reason: &str,
    usage: Option<Value>,
) -> Value {
    json!({
        "id": id,
        "object": "chat.completion",
        "created": unix_now(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason,
        }],
        "usage": usage.unwrap_or_else(empty_usage),
    })
}

/// Rebuild a provider response as a plain assistant completion, keeping
/// the provider's id and usage when present.
pub fn reply_completion(response: &Value, model: &str) -> Value {
    let id = response
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(completion_id);
    let content = extract_reply_text(response);
    chat_completion(
        &id,
        model,
        json!({"role": "assistant", "content": content}),
        "stop",
        response.get("usage").cloned(),
    )
}
