// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

pub mod cache;
pub mod classifier;
pub mod config;
pub mod executor;
pub mod format;
pub mod message;
pub mod provider;
pub mod server;
pub mod session;
pub mod stream;
pub mod tool;
