// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Tool contract
//
// Every tool, built-in or external, is an opaque unit behind the `Tool`
// trait: a name, a description, an explicitly declared parameter list and
// an async execute operation. The registry owns them; the executor is the
// only caller of `execute`.

mod builtin;
mod registry;
mod schema;

pub use builtin::{EchoTool, WeatherTool};
pub use registry::{ToolInfo, ToolRegistry};
pub use schema::{parameters_schema, validate_arguments, ParamType, ToolParameter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parsed tool arguments: always a JSON object.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// Capability contract every registered tool satisfies.
///
/// Implementations must be Send + Sync; the registry hands out
/// `Arc<dyn Tool>` to concurrent request handlers.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Declared parameters. Arguments are validated against these before
    /// `execute` is ever called.
    fn parameters(&self) -> &[ToolParameter];

    /// Run the tool. The executor enforces the timeout; tools do not need to.
    async fn execute(&self, arguments: &Arguments) -> Result<ToolResult, ToolError>;

    /// OpenAI `{"type":"function","function":{...}}` representation.
    fn to_openai_function(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": parameters_schema(self.parameters()),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a single tool invocation.
///
/// On success `data` is meaningful, on failure `error` is. Both may be
/// absent only for a degenerate success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    /// Success with no payload.
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(err: &ToolError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Machine-readable tag carried by failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    ValidationError,
    PermissionDenied,
    ToolNotFound,
    Timeout,
    ToolRaised,
}

/// Tool-level failures. Never propagated past the executor: each one is
/// converted into a failed `ToolResult`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments for tool '{tool}': {reason}")]
    Validation { tool: String, reason: String },

    #[error("tool '{0}' is not permitted in this session")]
    PermissionDenied(String),

    #[error("tool '{0}' does not exist")]
    NotFound(String),

    #[error("tool '{tool}' timed out after {}ms", .timeout.as_millis())]
    Timeout { tool: String, timeout: Duration },

    #[error("tool '{tool}' failed: {reason}")]
    Raised { tool: String, reason: String },
}

impl ToolError {
    pub fn raised(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::Raised {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::Validation { .. } => ToolErrorKind::ValidationError,
            ToolError::PermissionDenied(_) => ToolErrorKind::PermissionDenied,
            ToolError::NotFound(_) => ToolErrorKind::ToolNotFound,
            ToolError::Timeout { .. } => ToolErrorKind::Timeout,
            ToolError::Raised { .. } => ToolErrorKind::ToolRaised,
        }
    }
}
