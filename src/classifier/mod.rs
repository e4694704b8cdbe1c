// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Request-mode classifier
//
// Decides whether a message list is plain conversation, an explicit tool
// call, or hybrid (an intent was found for a tool this process does not
// have). Detection runs the LLM extractor first when one is configured and
// falls back to the keyword rules on any failure. Classification itself
// never fails.

mod extractor;
mod rules;

pub use extractor::{parse_extraction, ExtractionError, IntentExtractor, LlmIntentExtractor};

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::message::{Message, Role, ToolCall};
use crate::tool::{Arguments, ToolRegistry};

/// Appended to a hybrid reply when a tool call is attached to it.
pub const HYBRID_NOTICE: &str = "[Tool call intent detected automatically; the tool call will be executed]";

/// How a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Conversation,
    ToolCall,
    Hybrid,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Conversation => "conversation",
            Mode::ToolCall => "tool_call",
            Mode::Hybrid => "hybrid",
        }
    }
}

/// A detected tool intent: which tool and with what parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub tool: String,
    pub parameters: Arguments,
}

/// A fresh tool call id: `call_` followed by 8 hex digits.
pub fn new_call_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..8])
}

pub struct IntentClassifier {
    registry: Arc<ToolRegistry>,
    extractor: Option<Arc<dyn IntentExtractor>>,
    extraction_timeout: Duration,
}

impl IntentClassifier {
    /// Classifier using only the keyword rules.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            extractor: None,
            extraction_timeout: Duration::from_secs(10),
        }
    }

    /// Run `extractor` before the keyword rules, bounded by `timeout`.
    pub fn with_extractor(mut self, extractor: Arc<dyn IntentExtractor>, timeout: Duration) -> Self {
        self.extractor = Some(extractor);
        self.extraction_timeout = timeout;
        self
    }

    /// Classify a request and return the (possibly extended) messages.
    ///
    /// In tool_call mode produced by detection, the returned messages end
    /// with a synthesized assistant message carrying one tool call.
    pub async fn classify(
        &self,
        mut messages: Vec<Message>,
        available_tools: &[Value],
    ) -> (Mode, Vec<Message>) {
        let Some(last) = messages.last() else {
            return (Mode::Conversation, messages);
        };

        if last.has_tool_calls() {
            return (Mode::ToolCall, messages);
        }

        if available_tools.is_empty() {
            return (Mode::Conversation, messages);
        }

        let user_text = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(Message::text)
            .unwrap_or_default();

        let Some(intent) = self.detect_intent(&user_text, available_tools).await else {
            return (Mode::Conversation, messages);
        };

        match self.tool_call_for(&intent) {
            Some(call) => {
                tracing::info!(tool = %intent.tool, call_id = %call.id, "tool intent detected");
                messages.push(Message::assistant_tool_calls(vec![call]));
                (Mode::ToolCall, messages)
            }
            None => {
                tracing::info!(tool = %intent.tool, "intent names an unregistered tool, using hybrid mode");
                (Mode::Hybrid, messages)
            }
        }
    }

    /// Detect a tool intent in `text`. LLM extraction first, keyword rules
    /// as fallback. Extraction failures are logged and never surfaced.
    pub async fn detect_intent(&self, text: &str, available_tools: &[Value]) -> Option<Intent> {
        if text.trim().is_empty() {
            return None;
        }

        if let Some(extractor) = &self.extractor {
            let outcome = tokio::time::timeout(
                self.extraction_timeout,
                extractor.extract(text, available_tools),
            )
            .await
            .unwrap_or(Err(ExtractionError::Timeout));

            match outcome {
                Ok(intent) => {
                    tracing::debug!(tool = %intent.tool, "intent extracted by model");
                    return Some(intent);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "intent extraction failed, falling back to rules");
                }
            }
        }

        rules::detect(text)
    }

    /// Build a tool call for an intent, if its tool is registered.
    pub fn tool_call_for(&self, intent: &Intent) -> Option<ToolCall> {
        if !self.registry.contains(&intent.tool) {
            return None;
        }
        let arguments = Value::Object(intent.parameters.clone()).to_string();
        Some(ToolCall::function(new_call_id(), &intent.tool, arguments))
    }

    /// Best-effort hybrid refinement of a conversational completion.
    ///
    /// Runs detection on the assistant's reply text. When it resolves to a
    /// registered tool the call is attached to the reply, a notice is
    /// appended to the content and `finish_reason` becomes `tool_calls`.
    /// Returns whether the completion was changed.
    pub async fn refine_hybrid(&self, completion: &mut Value, available_tools: &[Value]) -> bool {
        let reply = completion
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if reply.is_empty() {
            return false;
        }

        let Some(call) = self
            .detect_intent(&reply, available_tools)
            .await
            .and_then(|intent| self.tool_call_for(&intent))
        else {
            return false;
        };

        let Ok(call_value) = serde_json::to_value(&call) else {
            return false;
        };
        let Some(choice) = completion
            .pointer_mut("/choices/0")
            .and_then(Value::as_object_mut)
        else {
            return false;
        };

        if let Some(message) = choice.get_mut("message").and_then(Value::as_object_mut) {
            message.insert("tool_calls".into(), Value::Array(vec![call_value]));
            message.insert(
                "content".into(),
                Value::String(format!("{reply}\n\n{HYBRID_NOTICE}")),
            );
        }
        choice.insert("finish_reason".into(), Value::String("tool_calls".into()));
        tracing::info!(tool = %call.function.name, call_id = %call.id, "hybrid reply carries a tool call");
        true
    }
}
