// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads toolmux.yaml, applies per-section defaults, validates ranges and
// resolves `${VAR}` references in provider settings.

mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::load_config;
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::*;
