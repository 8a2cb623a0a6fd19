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

//! Durable ledger snapshots
//!
//! The whole ledger is written as one JSON document on every change. Writes
//! go through a temporary file and an atomic rename, so a crash leaves
//! either the previous snapshot or the new one, never a torn file.

use atomic_write_file::AtomicWriteFile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{BanRecord, ViolationRecord};
use crate::config::StoreError;

/// Everything the ledger persists
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerSnapshot {
    pub banned: BTreeMap<String, BanRecord>,
    pub violations: BTreeMap<String, ViolationRecord>,
    /// `None` when the file predates whitelists; the ledger then uses its defaults
    pub whitelist: Option<BTreeSet<String>>,
    pub last_saved: Option<DateTime<Utc>>,
}

/// File holding the ledger snapshot
#[derive(Clone, Debug)]
pub struct BanStore {
    path: PathBuf,
}

impl BanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the directory the snapshot lives in
    pub fn ensure_parent_dir(&self) -> Result<(), StoreError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
                fs::create_dir_all(dir)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Reads the snapshot; `Ok(None)` if the file does not exist
    pub fn load(&self) -> Result<Option<LedgerSnapshot>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read(&self.path)?;
        let snapshot = serde_json::from_slice(&contents)?;
        Ok(Some(snapshot))
    }

    /// Replaces the snapshot atomically
    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(snapshot)?;

        let mut file = AtomicWriteFile::options()
            .open(&self.path)
            .map_err(|e| {
                StoreError::WriteFailed(format!("Failed to open for atomic write: {}", e))
            })?;

        file.write_all(&contents)
            .map_err(|e| StoreError::WriteFailed(format!("Failed to write snapshot: {}", e)))?;

        file.commit()
            .map_err(|e| StoreError::WriteFailed(format!("Failed to commit atomic write: {}", e)))?;

        Ok(())
    }
}
