// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Something toolmux can read its YAML from.
pub trait ConfigSource {
    /// Label naming the source in log lines and read errors.
    fn origin(&self) -> String;

    fn read(&self) -> Result<String, ConfigError>;
}

/// A `toolmux.yaml` on disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileSource {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<String, ConfigError> {
        std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            origin: self.origin(),
            source,
        })
    }
}

/// Inline YAML, as built by integration tests.
pub struct StringSource {
    content: String,
}

impl StringSource {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl ConfigSource for StringSource {
    fn origin(&self) -> String {
        "<inline>".to_string()
    }

    fn read(&self) -> Result<String, ConfigError> {
        Ok(self.content.clone())
    }
}
