// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Tool result formatter
//
// Renders a ToolResult as JSON, Markdown, plain text or HTML. Formatting
// never fails; anything that is not a mapping or a sequence is rendered as a
// scalar paragraph.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::ToolResult;

/// Output format for formatted tool results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
    Text,
    Html,
}

impl OutputFormat {
    /// Parse a format name case-insensitively. Unknown names map to JSON.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => OutputFormat::Markdown,
            "text" | "txt" => OutputFormat::Text,
            "html" => OutputFormat::Html,
            _ => OutputFormat::Json,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Text => "text",
            OutputFormat::Html => "html",
        }
    }
}

/// Render `result` in `format`.
///
/// Without metadata a success with data renders the data alone and anything
/// else renders `{"error": message}`. With metadata the whole
/// `{success, data, error}` object is rendered.
pub fn format_result(
    result: &ToolResult,
    format: OutputFormat,
    pretty: bool,
    include_metadata: bool,
) -> String {
    let error = result.error.as_deref().unwrap_or("Unknown error");

    let body = if include_metadata {
        serde_json::json!({
            "success": result.success,
            "data": result.data,
            "error": result.error,
        })
    } else {
        match (&result.data, result.success) {
            (Some(data), true) => data.clone(),
            _ => serde_json::json!({ "error": error }),
        }
    };

    match format {
        OutputFormat::Json => render_json(&body, pretty),
        OutputFormat::Markdown if !result.success => format!("## Error\n\n{error}"),
        OutputFormat::Markdown => render_markdown(&body),
        OutputFormat::Text if !result.success => format!("Error: {error}"),
        OutputFormat::Text => render_text(&body),
        OutputFormat::Html if !result.success => format!(
            r#"<div class="error-message"><h3>Error</h3><p>{}</p></div>"#,
            escape_html(error)
        ),
        OutputFormat::Html => render_html(&body),
    }
}

fn render_json(value: &Value, pretty: bool) -> String {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.unwrap_or_else(|_| value.to_string())
}

/// Scalars render bare: strings without quotes, everything else as JSON.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_markdown(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut out = String::from("## Result\n\n");
            for (key, value) in map {
                let rendered = match value {
                    Value::Object(_) | Value::Array(_) => {
                        format!("\n```json\n{}\n```", render_json(value, true))
                    }
                    other => scalar(other),
                };
                out.push_str(&format!("**{key}**: {rendered}\n\n"));
            }
            out
        }
        Value::Array(items) => {
            let items: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::Object(_) => format!("- {}", render_json(item, false)),
                    other => format!("- {}", scalar(other)),
                })
                .collect();
            format!("## Results\n\n{}", items.join("\n"))
        }
        other => format!("## Result\n\n{}", scalar(other)),
    }
}

fn render_text(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut out = String::from("Result:\n");
            for (key, value) in map {
                let rendered = match value {
                    Value::Object(_) | Value::Array(_) => render_json(value, false),
                    other => scalar(other),
                };
                out.push_str(&format!("{key}: {rendered}\n"));
            }
            out
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(|i| format!("- {}", scalar(i))).collect();
            format!("Results:\n{}", items.join("\n"))
        }
        other => format!("Result: {}", scalar(other)),
    }
}

fn render_html(value: &Value) -> String {
    fn cell(value: &Value) -> String {
        match value {
            Value::Object(_) | Value::Array(_) => {
                format!("<pre>{}</pre>", escape_html(&render_json(value, true)))
            }
            other => escape_html(&scalar(other)),
        }
    }

    match value {
        Value::Object(map) => {
            let rows: String = map
                .iter()
                .map(|(key, value)| {
                    format!("<tr><th>{}</th><td>{}</td></tr>", escape_html(key), cell(value))
                })
                .collect();
            format!(
                r#"<div class="result-container"><h3>Result</h3><table class="result-table">{rows}</table></div>"#
            )
        }
        Value::Array(items) => {
            let items: String = items.iter().map(|i| format!("<li>{}</li>", cell(i))).collect();
            format!(r#"<div class="result-list"><h3>Results</h3><ul>{items}</ul></div>"#)
        }
        other => format!(
            r#"<div class="result-text"><h3>Result</h3><p>{}</p></div>"#,
            cell(other)
        ),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
