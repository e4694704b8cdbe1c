// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{LlmProvider, ProviderError, Sampling};
use crate::config::ProviderConfig;
use crate::message::Message;

/// Reqwest-backed provider for any OpenAI-compatible chat completions URL.
pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    temperature: f64,
    timeout: Duration,
}

impl HttpProvider {
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            timeout: config.timeout,
        }
    }

    fn request_body(&self, model: &str, messages: &[Message], sampling: Sampling) -> Value {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": sampling.temperature.unwrap_or(self.temperature),
            "stream": false,
        });
        if let Some(max_tokens) = sampling.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn forward(
        &self,
        model: &str,
        messages: &[Message],
        sampling: Sampling,
    ) -> Result<Value, ProviderError> {
        let body = self.request_body(model, messages, sampling);

        let mut req = self.client.post(&self.url).json(&body).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let started = std::time::Instant::now();
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;

        tracing::debug!(
            model,
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "provider responded"
        );

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}
