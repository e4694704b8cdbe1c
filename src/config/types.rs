// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Default upstream endpoint when `provider.base_url` is not configured.
pub const DEFAULT_PROVIDER_URL: &str = "https://api.openai.com/v1/chat/completions";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Parsed and validated toolmux config.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Config schema version. Always "v1".
    pub version: String,
    /// Environment label (e.g. "development", "production").
    pub environment: String,
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub cache: CacheConfig,
    pub sessions: SessionConfig,
    pub classifier: ClassifierConfig,
    pub provider: ProviderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            environment: "development".to_string(),
            server: ServerConfig::default(),
            tools: ToolsConfig::default(),
            cache: CacheConfig::default(),
            sessions: SessionConfig::default(),
            classifier: ClassifierConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolsConfig {
    /// Hard limit on a single tool invocation.
    pub timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Idle time after which a sweep removes a session.
    pub ttl: Duration,
    /// How often the background sweep runs.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Ask the LLM to extract `{tool, parameters}` before the keyword rules.
    pub llm_extraction: bool,
    pub extractor_model: String,
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            llm_extraction: true,
            extractor_model: "gpt-3.5-turbo".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Bearer token; requests go out unauthenticated when absent.
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            temperature: 0.3,
        }
    }
}
