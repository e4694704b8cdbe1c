// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Tool executor
//
// Runs tool call requests through the fixed pipeline:
//   parse + validate -> permission -> cache -> registry + timeout ->
//   cache store -> session record -> format
//
// Every failure becomes a failed ToolResult inside the outcome. Nothing in
// here returns an error to the caller, and one failing call never affects
// its siblings.

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResultCache;
use crate::format::{format_result, OutputFormat};
use crate::message::ToolCallRequest;
use crate::session::Session;
use crate::tool::{validate_arguments, Arguments, ToolError, ToolRegistry, ToolResult};

/// Result of one executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallOutcome {
    pub tool_call_id: String,
    pub tool_name: String,
    /// `result` rendered in `format`.
    pub output: String,
    pub result: ToolResult,
    pub cached: bool,
    pub format: OutputFormat,
    pub timestamp: DateTime<Utc>,
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    cache: Arc<ResultCache>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, cache: Arc<ResultCache>, timeout: Duration) -> Self {
        Self {
            registry,
            cache,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Execute calls one after another in submission order.
    pub async fn execute(
        &self,
        calls: &[ToolCallRequest],
        session: Option<&Session>,
        format: OutputFormat,
    ) -> Vec<ToolCallOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            outcomes.push(self.execute_one(call, session, format).await);
        }
        outcomes
    }

    /// Execute a single call through the full pipeline.
    pub async fn execute_one(
        &self,
        call: &ToolCallRequest,
        session: Option<&Session>,
        format: OutputFormat,
    ) -> ToolCallOutcome {
        let started = std::time::Instant::now();
        let (arguments, result, cached) = self.run(call, session).await;

        if let Some(session) = session {
            session.add_message(json!({
                "role": "tool",
                "tool_call_id": call.id,
                "name": call.name,
                "arguments": arguments.map(Value::Object).unwrap_or_else(|| Value::String(call.arguments.clone())),
                "result": result,
                "cached": cached,
                "timestamp": Utc::now(),
            }));
        }

        match &result.error_kind {
            None => tracing::info!(
                tool = %call.name,
                call_id = %call.id,
                cached,
                latency_ms = started.elapsed().as_millis() as u64,
                "tool call completed"
            ),
            Some(kind) => tracing::warn!(
                tool = %call.name,
                call_id = %call.id,
                kind = ?kind,
                error = result.error.as_deref().unwrap_or_default(),
                latency_ms = started.elapsed().as_millis() as u64,
                "tool call failed"
            ),
        }

        // JSON output keeps the full envelope; human formats render the data.
        let include_metadata = format == OutputFormat::Json;
        ToolCallOutcome {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: format_result(&result, format, false, include_metadata),
            result,
            cached,
            format,
            timestamp: Utc::now(),
        }
    }

    /// Steps 1-5. Returns the parsed arguments (when parsing succeeded), the
    /// result and whether it came from the cache.
    async fn run(
        &self,
        call: &ToolCallRequest,
        session: Option<&Session>,
    ) -> (Option<Arguments>, ToolResult, bool) {
        let arguments = match self.parse_arguments(call) {
            Ok(arguments) => arguments,
            Err(e) => return (None, ToolResult::failure(&e), false),
        };

        if let Some(session) = session {
            if !session.is_tool_allowed(&call.name) {
                let err = ToolError::PermissionDenied(call.name.clone());
                return (Some(arguments), ToolResult::failure(&err), false);
            }
        }

        if let Some(hit) = self.cache.get(&call.name, &arguments) {
            tracing::debug!(tool = %call.name, call_id = %call.id, "cache hit");
            return (Some(arguments), hit, true);
        }

        let result = match self.invoke(&call.name, &arguments).await {
            Ok(result) => result,
            Err(e) => ToolResult::failure(&e),
        };

        if result.success {
            self.cache.set(&call.name, &arguments, &result);
        }
        (Some(arguments), result, false)
    }

    /// Parse the raw argument text and, for registered tools, validate it
    /// against the declared parameters.
    fn parse_arguments(&self, call: &ToolCallRequest) -> Result<Arguments, ToolError> {
        let invalid = |reason: String| ToolError::Validation {
            tool: call.name.clone(),
            reason,
        };

        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            Arguments::new()
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(invalid("arguments must be a JSON object".to_string())),
                Err(e) => return Err(invalid(format!("arguments are not valid JSON: {e}"))),
            }
        };

        if let Some(tool) = self.registry.get(&call.name) {
            validate_arguments(tool.parameters(), &arguments).map_err(invalid)?;
        }
        Ok(arguments)
    }

    /// Resolve and run the tool under the timeout. Panics inside the tool
    /// are caught and reported as raised errors.
    async fn invoke(&self, name: &str, arguments: &Arguments) -> Result<ToolResult, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let guarded = AssertUnwindSafe(tool.execute(arguments)).catch_unwind();
        match tokio::time::timeout(self.timeout, guarded).await {
            Err(_) => Err(ToolError::Timeout {
                tool: name.to_string(),
                timeout: self.timeout,
            }),
            Ok(Err(panic)) => Err(ToolError::raised(name, panic_message(panic.as_ref()))),
            Ok(Ok(result)) => result,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("tool panicked: {s}")
    } else {
        "tool panicked".to_string()
    }
}
