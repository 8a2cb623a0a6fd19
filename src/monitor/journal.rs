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

//! Append-only security log
//!
//! Every event the monitor logs is also written to disk as one JSON line,
//! so the audit trail outlives the process. Once the current file has
//! covered the rotation period it is renamed to a dated archive
//! (`security.log` becomes `security_2026-10-18.log`) and the next event
//! starts a fresh file.

use chrono::{DateTime, Duration, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::SecurityEventRecord;
use crate::config::StoreError;

/// JSON-lines file behind the security event log
#[derive(Debug)]
pub struct EventJournal {
    path: PathBuf,
    /// Timestamp of the first entry in the current file
    started_at: Option<DateTime<Utc>>,
}

impl EventJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            started_at: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Reads the current file and remembers when it was started
    ///
    /// Malformed lines are skipped with a warning. A missing file is an
    /// empty journal.
    pub fn load(&mut self) -> Result<Vec<SecurityEventRecord>, StoreError> {
        let records = read_records(&self.path)?;
        self.started_at = records.first().map(|record| record.timestamp);
        Ok(records)
    }

    /// Appends one entry, creating the file and its directory on demand
    pub fn append(&mut self, record: &SecurityEventRecord) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        self.started_at.get_or_insert(record.timestamp);
        Ok(())
    }

    /// Whether the current file has covered `period`
    pub fn is_due(&self, now: DateTime<Utc>, period: Duration) -> bool {
        self.started_at.is_some_and(|started| now - started >= period)
    }

    /// Renames the current file to its dated archive name
    ///
    /// Returns the archive path, or `None` if there was no file to move.
    pub fn rotate(&mut self) -> Result<Option<PathBuf>, StoreError> {
        let Some(started_at) = self.started_at else {
            return Ok(None);
        };

        if !self.path.exists() {
            self.started_at = None;
            return Ok(None);
        }

        let archive = self.archive_path(started_at);
        fs::rename(&self.path, &archive)?;
        self.started_at = None;
        Ok(Some(archive))
    }

    /// First free `<stem>_<date>[_<n>].<ext>` next to the log
    fn archive_path(&self, started_at: DateTime<Utc>) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "security".to_string());
        let extension = self
            .path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let date = started_at.format("%Y-%m-%d");

        let mut candidate = self.path.with_file_name(format!("{stem}_{date}{extension}"));
        let mut suffix = 1;
        while candidate.exists() {
            candidate = self
                .path
                .with_file_name(format!("{stem}_{date}_{suffix}{extension}"));
            suffix += 1;
        }
        candidate
    }
}

/// Parses a security log file, oldest entry first
pub fn read_records(path: &Path) -> Result<Vec<SecurityEventRecord>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "Skipping malformed security log entry"
            ),
        }
    }

    Ok(records)
}
