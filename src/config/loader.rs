// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a toolmux config from the given source.
///
/// Steps:
/// 1. Read raw YAML from the source
/// 2. Parse into raw deserialization types
/// 3. Check the version
/// 4. Apply defaults and range checks per section
/// 5. Resolve `${VAR}` references in provider strings
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.read()?;
    tracing::debug!(origin = %source.origin(), bytes = raw_yaml.len(), "config read");
    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.toolmux != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.toolmux
        )));
    }

    let defaults = Config::default();

    Ok(Config {
        version: raw.toolmux,
        environment: raw.environment.unwrap_or(defaults.environment),
        server: build_server_config(raw.server),
        tools: build_tools_config(raw.tools)?,
        cache: build_cache_config(raw.cache)?,
        sessions: build_session_config(raw.sessions)?,
        classifier: build_classifier_config(raw.classifier)?,
        provider: build_provider_config(raw.provider)?,
    })
}

fn millis(field: &str, value: Option<u64>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Validation(format!("{field} must be greater than 0"))),
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => Ok(default),
    }
}

fn secs(field: &str, value: Option<u64>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Validation(format!("{field} must be greater than 0"))),
        Some(s) => Ok(Duration::from_secs(s)),
        None => Ok(default),
    }
}

fn build_server_config(raw: Option<raw::RawServerConfig>) -> ServerConfig {
    let defaults = ServerConfig::default();
    ServerConfig {
        port: raw.and_then(|s| s.port).unwrap_or(defaults.port),
    }
}

fn build_tools_config(raw: Option<raw::RawToolsConfig>) -> Result<ToolsConfig, ConfigError> {
    let defaults = ToolsConfig::default();
    let timeout_ms = raw.and_then(|t| t.timeout_ms);
    Ok(ToolsConfig {
        timeout: millis("tools.timeout_ms", timeout_ms, defaults.timeout)?,
    })
}

fn build_cache_config(raw: Option<raw::RawCacheConfig>) -> Result<CacheConfig, ConfigError> {
    let defaults = CacheConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let max_size = match raw.max_size {
        Some(0) => {
            return Err(ConfigError::Validation(
                "cache.max_size must be greater than 0".to_string(),
            ))
        }
        Some(n) => n,
        None => defaults.max_size,
    };

    Ok(CacheConfig {
        max_size,
        ttl: secs("cache.ttl_secs", raw.ttl_secs, defaults.ttl)?,
    })
}

fn build_session_config(raw: Option<raw::RawSessionConfig>) -> Result<SessionConfig, ConfigError> {
    let defaults = SessionConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    Ok(SessionConfig {
        ttl: secs("sessions.ttl_secs", raw.ttl_secs, defaults.ttl)?,
        sweep_interval: secs(
            "sessions.sweep_interval_secs",
            raw.sweep_interval_secs,
            defaults.sweep_interval,
        )?,
    })
}

fn build_classifier_config(
    raw: Option<raw::RawClassifierConfig>,
) -> Result<ClassifierConfig, ConfigError> {
    let defaults = ClassifierConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let extractor_model = raw.extractor_model.unwrap_or(defaults.extractor_model);
    if extractor_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "classifier.extractor_model must not be empty".to_string(),
        ));
    }

    Ok(ClassifierConfig {
        llm_extraction: raw.llm_extraction.unwrap_or(defaults.llm_extraction),
        extractor_model,
        timeout: millis("classifier.timeout_ms", raw.timeout_ms, defaults.timeout)?,
    })
}

fn build_provider_config(
    raw: Option<raw::RawProviderConfig>,
) -> Result<ProviderConfig, ConfigError> {
    let defaults = ProviderConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let base_url = match raw.base_url {
        Some(url) => resolve_variables(&url)?,
        None => defaults.base_url,
    };
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "provider.base_url must be an http(s) URL, got \"{base_url}\""
        )));
    }

    let api_key = raw
        .api_key
        .map(|key| resolve_variables(&key))
        .transpose()?
        .filter(|key| !key.is_empty());

    let temperature = raw.temperature.unwrap_or(defaults.temperature);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::Validation(format!(
            "provider.temperature must be within 0.0..=2.0, got {temperature}"
        )));
    }

    Ok(ProviderConfig {
        base_url,
        api_key,
        timeout: millis("provider.timeout_ms", raw.timeout_ms, defaults.timeout)?,
        temperature,
    })
}
