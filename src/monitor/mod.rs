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

//! Per-user threat scoring and auto-block
//!
//! Every flagged command adds points to its user's record according to
//! [`SEVERITY_POINTS`](crate::filter::types::SEVERITY_POINTS). The score is
//! the sum over the trailing decay window (24 hours by default), recomputed
//! on each violation rather than accumulated. A user with
//! `auto_block_threshold` violations inside the auto-block window (5
//! minutes) is blocked until an administrator unblocks them.
//!
//! The monitor also keeps a bounded log of security events for statistics,
//! mirrored to an append-only file (see [`journal`]) when `log_file` is set.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod journal;

pub use journal::EventJournal;

use crate::clock::Clock;
use crate::config::ThreatConfig;
use crate::events::{EventBus, SecurityEvent};
use crate::filter::{RiskLevel, Severity};

/// Reason attached to blocks raised by the monitor itself
pub const AUTO_BLOCK_REASON: &str = "automatic block: repeated violations in short interval";

/// Score from which a user counts as high risk in [`MonitorStats`]
pub const HIGH_RISK_SCORE: u32 = 10;

/// One scored violation
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatViolation {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub points: u32,
}

#[derive(Debug, Default)]
struct ThreatRecord {
    score: u32,
    violations: Vec<ThreatViolation>,
    last_violation_at: Option<DateTime<Utc>>,
}

/// Public view of a user's record
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatScore {
    pub score: u32,
    pub violations: usize,
    pub risk_level: RiskLevel,
    pub last_violation_at: Option<DateTime<Utc>>,
}

/// What kind of entry sits in the event log
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityEventKind {
    DangerousCommand,
    RateLimited,
    UserBlocked,
    UserUnblocked,
}

impl SecurityEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DangerousCommand => "dangerous-command",
            Self::RateLimited => "rate-limited",
            Self::UserBlocked => "user-blocked",
            Self::UserUnblocked => "user-unblocked",
        }
    }
}

/// Event handed to [`ThreatMonitor::log_event`]
#[derive(Clone, Debug, PartialEq)]
pub struct NewSecurityEvent {
    pub kind: SecurityEventKind,
    pub user_id: String,
    pub user_name: Option<String>,
    pub address: Option<String>,
    pub command: Option<String>,
    pub reason: String,
    pub severity: Severity,
}

/// Stored event log entry
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEventRecord {
    pub id: String,
    pub kind: SecurityEventKind,
    pub user_id: String,
    pub user_name: Option<String>,
    pub address: Option<String>,
    pub command: Option<String>,
    pub reason: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counts for dashboards and the admin CLI
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub total_events: usize,
    /// Events in the last hour
    pub recent_events: usize,
    /// Events in the last 24 hours
    pub daily_events: usize,
    pub blocked_users: usize,
    pub high_risk_users: usize,
}

#[derive(Debug)]
struct BlockEntry {
    reason: String,
    at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MonitorState {
    records: HashMap<String, ThreatRecord>,
    blocked: HashMap<String, BlockEntry>,
    log: VecDeque<SecurityEventRecord>,
    next_id: u64,
    journal: Option<EventJournal>,
}

/// Threat score ledger, user blocks and event log
pub struct ThreatMonitor {
    settings: ThreatConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    state: Mutex<MonitorState>,
}

impl ThreatMonitor {
    /// Creates a monitor, reloading the event log from `log_file` if set
    pub fn new(settings: ThreatConfig, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        let mut state = MonitorState::default();

        if let Some(path) = settings.log_path() {
            let mut journal = EventJournal::new(path);
            match journal.load() {
                Ok(records) => {
                    state.next_id = records.len() as u64;
                    let skip = records.len().saturating_sub(settings.max_event_log);
                    state.log.extend(records.into_iter().skip(skip));
                }
                Err(e) => warn!(
                    path = %journal.path().display(),
                    error = %e,
                    "Security log unreadable, starting with an empty event log"
                ),
            }
            state.journal = Some(journal);
        }

        Self {
            settings,
            clock,
            events,
            state: Mutex::new(state),
        }
    }

    /// Scores one violation and applies the auto-block rule
    ///
    /// `Severity::None` and empty user ids are ignored. Returns `true` when
    /// this call blocked the user; a `UserBlocked` event has then been
    /// published.
    pub fn record(&self, user_id: &str, severity: Severity) -> bool {
        let user_id = user_id.trim();
        if user_id.is_empty() || severity == Severity::None {
            return false;
        }

        let now = self.clock.now();
        let event = {
            let mut state = self.state.lock();
            self.score_locked(&mut state, user_id, severity, now);
            self.auto_block_locked(&mut state, user_id, now)
        };

        match event {
            Some(event) => {
                self.events.publish(event);
                true
            }
            None => false,
        }
    }

    fn score_locked(
        &self,
        state: &mut MonitorState,
        user_id: &str,
        severity: Severity,
        now: DateTime<Utc>,
    ) {
        let decay = Duration::hours(i64::from(self.settings.score_decay_hours));
        let record = state.records.entry(user_id.to_string()).or_default();

        record.violations.push(ThreatViolation {
            timestamp: now,
            severity,
            points: severity.points(),
        });
        record.last_violation_at = Some(now);
        record.violations.retain(|v| now - v.timestamp < decay);
        record.score = record.violations.iter().map(|v| v.points).sum();
    }

    fn auto_block_locked(
        &self,
        state: &mut MonitorState,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Option<SecurityEvent> {
        if state.blocked.contains_key(user_id) {
            return None;
        }

        let window = Duration::minutes(i64::from(self.settings.auto_block_window_minutes));
        let recent = state
            .records
            .get(user_id)
            .map_or(0, |record| {
                record
                    .violations
                    .iter()
                    .filter(|v| now - v.timestamp < window)
                    .count()
            });

        if recent < self.settings.auto_block_threshold {
            return None;
        }

        Some(self.block_locked(state, user_id, AUTO_BLOCK_REASON, now))
    }

    fn block_locked(
        &self,
        state: &mut MonitorState,
        user_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> SecurityEvent {
        state.blocked.insert(
            user_id.to_string(),
            BlockEntry {
                reason: reason.to_string(),
                at: now,
            },
        );
        self.push_log_locked(
            state,
            NewSecurityEvent {
                kind: SecurityEventKind::UserBlocked,
                user_id: user_id.to_string(),
                user_name: None,
                address: None,
                command: None,
                reason: reason.to_string(),
                severity: Severity::None,
            },
            now,
        );
        warn!(user_id, reason, "User blocked");

        SecurityEvent::UserBlocked {
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            at: now,
        }
    }

    fn push_log_locked(
        &self,
        state: &mut MonitorState,
        event: NewSecurityEvent,
        now: DateTime<Utc>,
    ) {
        state.next_id += 1;
        let record = SecurityEventRecord {
            id: format!("sec_{}_{}", now.timestamp_millis(), state.next_id),
            kind: event.kind,
            user_id: event.user_id,
            user_name: event.user_name,
            address: event.address,
            command: event.command,
            reason: event.reason,
            severity: event.severity,
            timestamp: now,
        };

        if let Some(journal) = state.journal.as_mut() {
            if let Err(e) = journal.append(&record) {
                error!(
                    path = %journal.path().display(),
                    error = %e,
                    "Failed to write security log"
                );
            }
        }

        state.log.push_back(record);
        while state.log.len() > self.settings.max_event_log {
            state.log.pop_front();
        }
    }

    /// Appends to the event log, then scores the event's user
    ///
    /// Returns `true` when the user was blocked as a result.
    pub fn log_event(&self, event: NewSecurityEvent) -> bool {
        let now = self.clock.now();
        let user_id = event.user_id.trim().to_string();
        let severity = event.severity;

        info!(
            user_id = %user_id,
            user_name = event.user_name.as_deref().unwrap_or("-"),
            reason = %event.reason,
            %severity,
            "Security event"
        );

        let blocked = {
            let mut state = self.state.lock();
            self.push_log_locked(&mut state, event, now);

            if user_id.is_empty() || severity == Severity::None {
                None
            } else {
                self.score_locked(&mut state, &user_id, severity, now);
                self.auto_block_locked(&mut state, &user_id, now)
            }
        };

        match blocked {
            Some(event) => {
                self.events.publish(event);
                true
            }
            None => false,
        }
    }

    /// Blocks a user explicitly; `false` if already blocked
    pub fn block(&self, user_id: &str, reason: &str) -> bool {
        let now = self.clock.now();
        let event = {
            let mut state = self.state.lock();
            if state.blocked.contains_key(user_id) {
                return false;
            }
            self.block_locked(&mut state, user_id, reason, now)
        };

        self.events.publish(event);
        true
    }

    /// Lifts a block and forgets the user's score
    ///
    /// Returns `false` if the user was not blocked.
    pub fn unblock(&self, user_id: &str) -> bool {
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            if state.blocked.remove(user_id).is_none() {
                return false;
            }
            state.records.remove(user_id);
        }

        info!(user_id, "User unblocked");
        self.events.publish(SecurityEvent::UserUnblocked {
            user_id: user_id.to_string(),
            at: now,
        });
        true
    }

    pub fn is_blocked(&self, user_id: &str) -> bool {
        self.state.lock().blocked.contains_key(user_id)
    }

    /// Reason and time of an active block
    pub fn block_reason(&self, user_id: &str) -> Option<(String, DateTime<Utc>)> {
        self.state
            .lock()
            .blocked
            .get(user_id)
            .map(|entry| (entry.reason.clone(), entry.at))
    }

    /// Current score; unknown users score zero
    pub fn score(&self, user_id: &str) -> ThreatScore {
        let state = self.state.lock();

        match state.records.get(user_id) {
            Some(record) => ThreatScore {
                score: record.score,
                violations: record.violations.len(),
                risk_level: RiskLevel::from_score(record.score),
                last_violation_at: record.last_violation_at,
            },
            None => ThreatScore {
                score: 0,
                violations: 0,
                risk_level: RiskLevel::Low,
                last_violation_at: None,
            },
        }
    }

    /// Drops records whose last violation is older than the retention period
    ///
    /// Blocks are kept. Returns the number of records removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let retention = Duration::days(i64::from(self.settings.retention_days));
        let mut state = self.state.lock();

        let before = state.records.len();
        state.records.retain(|_, record| {
            record
                .last_violation_at
                .is_none_or(|last| now - last <= retention)
        });
        let removed = before - state.records.len();

        if removed > 0 {
            info!(removed, "Cleaned up expired threat scores");
        }
        removed
    }

    pub fn stats(&self) -> MonitorStats {
        let now = self.clock.now();
        let state = self.state.lock();

        let within = |span: Duration| {
            state
                .log
                .iter()
                .filter(|event| now - event.timestamp < span)
                .count()
        };

        MonitorStats {
            total_events: state.log.len(),
            recent_events: within(Duration::hours(1)),
            daily_events: within(Duration::hours(24)),
            blocked_users: state.blocked.len(),
            high_risk_users: state
                .records
                .values()
                .filter(|record| record.score >= HIGH_RISK_SCORE)
                .count(),
        }
    }

    /// Location of the on-disk security log, if enabled
    pub fn log_path(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .journal
            .as_ref()
            .map(|journal| journal.path().to_path_buf())
    }

    /// Archives the security log once it has covered `log_rotation_hours`
    ///
    /// Returns the archive path when a rotation happened. Failures are
    /// logged and the current file keeps growing.
    pub fn rotate_log(&self) -> Option<PathBuf> {
        let now = self.clock.now();
        let period = Duration::hours(i64::from(self.settings.log_rotation_hours));
        let mut state = self.state.lock();
        let journal = state.journal.as_mut()?;

        if !journal.is_due(now, period) {
            return None;
        }

        match journal.rotate() {
            Ok(Some(archive)) => {
                info!(archive = %archive.display(), "Security log rotated");
                Some(archive)
            }
            Ok(None) => None,
            Err(e) => {
                error!(
                    path = %journal.path().display(),
                    error = %e,
                    "Failed to rotate security log"
                );
                None
            }
        }
    }

    /// Newest `limit` log entries, newest first
    pub fn recent_events(&self, limit: usize) -> Vec<SecurityEventRecord> {
        self.state.lock().log.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests;
