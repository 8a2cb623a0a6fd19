// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for configuration loading and ledger persistence

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// File exists but is not valid TOML for [`SecurityConfig`](super::SecurityConfig).
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// One or more values are out of range. Every problem is listed.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Generic I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the ban ledger's durable storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Atomic write operation failed.
    #[error("Atomic write failed: {0}")]
    WriteFailed(String),

    /// Snapshot could not be encoded or decoded.
    #[error("Malformed ledger snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
