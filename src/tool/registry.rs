// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::{parameters_schema, EchoTool, Tool, WeatherTool};

/// Listing entry for `GET /v1/tools`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub parameters_schema: serde_json::Value,
}

/// Name → tool map, built once at startup and read-only afterwards.
///
/// Constructed with the builder-style `register`, then shared as
/// `Arc<ToolRegistry>`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the demo tools (`echo`, `weather`).
    pub fn with_builtin() -> Self {
        Self::new()
            .register(EchoTool::new())
            .register(WeatherTool::new())
    }

    /// Register a tool. A later registration under the same name replaces
    /// the earlier one.
    pub fn register<T: Tool + 'static>(self, tool: T) -> Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            tracing::warn!(tool = %name, "tool already registered, replacing");
        }
        tracing::debug!(tool = %name, "registered tool");
        self.tools.insert(name, tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list(&self) -> Vec<ToolInfo> {
        self.names()
            .into_iter()
            .filter_map(|name| self.tools.get(&name))
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                version: tool.version().to_string(),
                parameters_schema: parameters_schema(tool.parameters()),
            })
            .collect()
    }

    /// All tools in OpenAI function format, sorted by name.
    pub fn openai_functions(&self) -> Vec<serde_json::Value> {
        self.names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.to_openai_function())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
