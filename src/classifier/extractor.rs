// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// LLM-assisted intent extraction
//
// Asks a model to name the tool and parameters a user message calls for.
// The model is expected to answer with strict `{"tool", "parameters"}` JSON,
// optionally wrapped in a ```json fence. Every failure is reported as an
// ExtractionError so the classifier can fall back to the keyword rules.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::Intent;
use crate::message::{Message, Role};
use crate::provider::{extract_reply_text, LlmProvider, ProviderError, Sampling};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("extraction timed out")]
    Timeout,

    #[error("extractor reply is not valid JSON: {0}")]
    Malformed(String),

    #[error("extractor reply is missing '{0}'")]
    MissingField(&'static str),

    #[error("extractor found no tool intent")]
    NoIntent,
}

/// Extracts a concrete tool intent from user text.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(&self, user_text: &str, tools: &[Value]) -> Result<Intent, ExtractionError>;
}

const SYSTEM_PROMPT: &str =
    "You extract tool calls from user messages. Given a user message, name the tool to use and its parameters.";

/// Extractor backed by an upstream chat model.
pub struct LlmIntentExtractor {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmIntentExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

fn build_prompt(user_text: &str, tools: &[Value]) -> String {
    let definitions = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Available tools:\n{definitions}\n\n\
         User message: \"{user_text}\"\n\n\
         Decide whether the user wants one of these tools. If so, return the tool name and its parameters.\n\
         Answer with strict JSON containing 'tool' and 'parameters', for example:\n\
         {{\"tool\": \"weather\", \"parameters\": {{\"city\": \"北京\", \"country\": \"CN\"}}}}\n\
         If no tool applies, answer: {{\"tool\": null, \"parameters\": null}}\n\
         Return only the JSON, with no other text."
    )
}

#[async_trait]
impl IntentExtractor for LlmIntentExtractor {
    async fn extract(&self, user_text: &str, tools: &[Value]) -> Result<Intent, ExtractionError> {
        let messages = [
            Message::new(Role::System, SYSTEM_PROMPT),
            Message::new(Role::User, build_prompt(user_text, tools)),
        ];
        let response = self
            .provider
            .forward(&self.model, &messages, Sampling::default())
            .await?;
        parse_extraction(&extract_reply_text(&response))
    }
}

/// Strip a surrounding ``` or ```json fence, if any.
fn strip_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse an extractor reply into an intent.
///
/// A null `tool` means the model saw no intent. `parameters` must be a
/// non-empty object.
pub fn parse_extraction(content: &str) -> Result<Intent, ExtractionError> {
    let value: Value = serde_json::from_str(strip_fence(content))
        .map_err(|e| ExtractionError::Malformed(e.to_string()))?;

    let tool = match value.get("tool") {
        None => return Err(ExtractionError::MissingField("tool")),
        Some(Value::Null) => return Err(ExtractionError::NoIntent),
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(_) => return Err(ExtractionError::MissingField("tool")),
    };

    let parameters = match value.get("parameters") {
        Some(Value::Object(map)) if !map.is_empty() => map.clone(),
        _ => return Err(ExtractionError::MissingField("parameters")),
    };

    Ok(Intent { tool, parameters })
}
