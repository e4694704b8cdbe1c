// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Every section and field is optional here; defaults, interpolation and
// range checks are applied by the loader when building the typed Config.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub toolmux: String,
    pub environment: Option<String>,
    pub server: Option<RawServerConfig>,
    pub tools: Option<RawToolsConfig>,
    pub cache: Option<RawCacheConfig>,
    pub sessions: Option<RawSessionConfig>,
    pub classifier: Option<RawClassifierConfig>,
    pub provider: Option<RawProviderConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RawServerConfig {
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct RawToolsConfig {
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawCacheConfig {
    pub max_size: Option<usize>,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawSessionConfig {
    pub ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawClassifierConfig {
    pub llm_extraction: Option<bool>,
    pub extractor_model: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawProviderConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: Option<u64>,
    pub temperature: Option<f64>,
}
