// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Declared parameter schemas and argument validation.

use serde::Serialize;

use super::Arguments;

/// JSON type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

/// A single declared tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

impl ToolParameter {
    /// A string parameter. Use `with_type` for anything else.
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::String,
            required,
            description: description.into(),
        }
    }

    pub fn with_type(mut self, param_type: ParamType) -> Self {
        self.param_type = param_type;
        self
    }
}

/// Render a parameter list as a JSON Schema object.
pub fn parameters_schema(params: &[ToolParameter]) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for param in params {
        properties.insert(
            param.name.clone(),
            serde_json::json!({
                "type": param.param_type.as_str(),
                "description": param.description,
            }),
        );
        if param.required {
            required.push(serde_json::Value::String(param.name.clone()));
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Check arguments against declared parameters.
///
/// Required parameters must be present and non-null, every present value
/// must match its declared type (null is accepted for optional ones), and
/// undeclared arguments are rejected.
pub fn validate_arguments(params: &[ToolParameter], args: &Arguments) -> Result<(), String> {
    for param in params {
        match args.get(&param.name) {
            None | Some(serde_json::Value::Null) if param.required => {
                return Err(format!("missing required parameter '{}'", param.name));
            }
            Some(serde_json::Value::Null) | None => {}
            Some(value) => {
                if !param.param_type.accepts(value) {
                    return Err(format!(
                        "parameter '{}' must be of type {}",
                        param.name,
                        param.param_type.as_str()
                    ));
                }
            }
        }
    }

    if let Some(unknown) = args
        .keys()
        .find(|key| !params.iter().any(|p| &p.name == *key))
    {
        return Err(format!("unknown parameter '{unknown}'"));
    }

    Ok(())
}
