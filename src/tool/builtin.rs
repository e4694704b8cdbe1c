// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Demo tools
//
// `echo` and `weather` ship with the binary so the rule fallback of the
// classifier resolves to something out of the box. The weather tool returns
// mock readings; it does not call any external service.

use async_trait::async_trait;
use serde_json::json;

use super::{Arguments, Tool, ToolError, ToolParameter, ToolResult};

fn str_arg<'a>(arguments: &'a Arguments, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// echo
// ---------------------------------------------------------------------------

/// Returns its input, optionally wrapped in a prefix and suffix.
pub struct EchoTool {
    parameters: Vec<ToolParameter>,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            parameters: vec![
                ToolParameter::new("message", "Message to return", true),
                ToolParameter::new("prefix", "Optional prefix", false),
                ToolParameter::new("suffix", "Optional suffix", false),
            ],
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the input message, for exercising tool calls"
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    async fn execute(&self, arguments: &Arguments) -> Result<ToolResult, ToolError> {
        let message = str_arg(arguments, "message")
            .ok_or_else(|| ToolError::raised(self.name(), "message is empty"))?;
        let prefix = str_arg(arguments, "prefix");
        let suffix = str_arg(arguments, "suffix");

        let mut processed = message.to_string();
        if let Some(prefix) = prefix {
            processed = format!("{prefix} {processed}");
        }
        if let Some(suffix) = suffix {
            processed = format!("{processed} {suffix}");
        }

        Ok(ToolResult::ok(json!({
            "original_message": message,
            "processed_message": processed,
            "prefix": prefix,
            "suffix": suffix,
        })))
    }
}

// ---------------------------------------------------------------------------
// weather
// ---------------------------------------------------------------------------

/// Mock weather lookup by city.
pub struct WeatherTool {
    parameters: Vec<ToolParameter>,
}

impl WeatherTool {
    pub fn new() -> Self {
        Self {
            parameters: vec![
                ToolParameter::new("city", "City to look up, e.g. 北京, 上海", true),
                ToolParameter::new("country", "Country code, e.g. CN, US, JP", false),
                ToolParameter::new("units", "metric, imperial or standard", false),
            ],
        }
    }
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Look up current weather for a city"
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    async fn execute(&self, arguments: &Arguments) -> Result<ToolResult, ToolError> {
        let city = str_arg(arguments, "city")
            .ok_or_else(|| ToolError::raised(self.name(), "city is empty"))?;
        let country = str_arg(arguments, "country").unwrap_or("CN");
        let units = match str_arg(arguments, "units").unwrap_or("metric") {
            "metric" => "celsius",
            "imperial" => "fahrenheit",
            "standard" => "kelvin",
            other => {
                return Err(ToolError::raised(
                    self.name(),
                    format!("unsupported units '{other}'"),
                ))
            }
        };

        Ok(ToolResult::ok(json!({
            "city": city,
            "country": country,
            "temperature": 23.5,
            "humidity": 65,
            "weather": "sunny",
            "wind_speed": 3.2,
            "units": units,
        })))
    }
}
