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

//! Per-address violation and ban ledger
//!
//! Addresses collect violations; `max_violations` of them within 24 hours
//! ban the address for `ban_duration_hours`. Every ban raises the address's
//! cumulative ban count, and from `permanent_ban_threshold` on bans are
//! permanent. Whitelisted addresses are never recorded or banned.
//!
//! # Persistence
//!
//! The ledger is the durable source of truth: every mutating call writes a
//! full snapshot through [`BanStore`] while the ledger lock is held, so
//! concurrent callers cannot interleave writes. A failed write is logged
//! and the in-memory state stays authoritative. On startup the snapshot is
//! loaded wholesale; a missing or malformed file yields an empty ledger.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use shellwarden::bans::{BanLedger, ViolationDetail, ViolationOutcome};
//! use shellwarden::clock::SystemClock;
//! use shellwarden::config::BanConfig;
//! use shellwarden::events::EventBus;
//! use shellwarden::filter::Severity;
//!
//! let dir = tempfile::tempdir()?;
//! let settings = BanConfig {
//!     data_file: dir.path().join("ip-bans.json").display().to_string(),
//!     ..BanConfig::default()
//! };
//! let ledger = BanLedger::open(settings, Arc::new(SystemClock), EventBus::new());
//!
//! let detail = ViolationDetail::new("dangerous-command", "may destroy disk data", Severity::High);
//! for _ in 0..2 {
//!     ledger.record_violation("203.0.113.9", detail.clone());
//! }
//! let outcome = ledger.record_violation("203.0.113.9", detail);
//! assert!(matches!(outcome, ViolationOutcome::Banned(_)));
//! assert!(ledger.is_banned("203.0.113.9").is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod store;

pub use store::{BanStore, LedgerSnapshot};

use crate::clock::Clock;
use crate::config::{BanConfig, StoreError};
use crate::events::{EventBus, SecurityEvent};
use crate::filter::Severity;

/// Addresses whitelisted when the snapshot carries no whitelist
pub const DEFAULT_WHITELIST: [&str; 3] = ["127.0.0.1", "::1", "localhost"];

/// Reason used when violations trigger a ban
pub const VIOLATION_BAN_REASON: &str = "multiple security violations";

/// Appended to the reason when a ban is promoted to permanent
pub const PERMANENT_BAN_NOTE: &str = " (repeated violations, permanent ban)";

/// Span over which violations count toward a ban
const VIOLATION_WINDOW_HOURS: i64 = 24;

/// Idle span after which the sweeper forgets a violation record
const VIOLATION_RETENTION_DAYS: i64 = 7;

/// An address ban
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRecord {
    pub banned_at: DateTime<Utc>,
    /// `0` for permanent bans
    pub duration_hours: u32,
    pub reason: String,
    pub permanent: bool,
    /// Cumulative bans of this address, including this one
    pub ban_count: u32,
}

impl BanRecord {
    /// End of a temporary ban; `None` for permanent bans
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        (!self.permanent).then(|| self.banned_at + Duration::hours(i64::from(self.duration_hours)))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now > expiry)
    }
}

/// What the caller reports about a violation
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationDetail {
    /// Short category, e.g. `dangerous-command`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub reason: String,
    pub severity: Severity,
}

impl ViolationDetail {
    pub fn new(kind: impl Into<String>, reason: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind: kind.into(),
            command: None,
            reason: reason.into(),
            severity,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

/// A stored, timestamped violation
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ViolationEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: ViolationDetail,
}

/// Violation history of one address
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViolationRecord {
    pub violations: Vec<ViolationEntry>,
    pub ban_count: u32,
    pub last_ban_at: Option<DateTime<Utc>>,
}

/// Result of [`BanLedger::record_violation`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ViolationOutcome {
    /// Whitelisted or empty address; nothing stored
    Ignored,
    /// Stored; `count` violations within the window
    Recorded { count: usize },
    /// Stored, and the address is now banned
    Banned(BanRecord),
}

/// Everything known about one address
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressStats {
    pub address: String,
    pub violations: usize,
    pub ban_count: u32,
    pub last_ban_at: Option<DateTime<Utc>>,
    pub currently_banned: bool,
    pub ban: Option<BanRecord>,
    pub whitelisted: bool,
}

/// Ledger-wide counts
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BanStats {
    /// Stored ban records, expired or not
    pub total_banned: usize,
    pub active_bans: usize,
    pub permanent_bans: usize,
    /// Bans issued in the last 24 hours
    pub recent_bans: usize,
    pub whitelisted: usize,
    pub violating_addresses: usize,
}

/// What one [`BanLedger::cleanup`] removed
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub expired_bans: usize,
    pub stale_violation_records: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_bans == 0 && self.stale_violation_records == 0
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    banned: BTreeMap<String, BanRecord>,
    violations: BTreeMap<String, ViolationRecord>,
    whitelist: BTreeSet<String>,
}

impl LedgerState {
    fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            banned: snapshot.banned,
            violations: snapshot.violations,
            whitelist: snapshot.whitelist.unwrap_or_else(default_whitelist),
        }
    }

    fn snapshot(&self, now: DateTime<Utc>) -> LedgerSnapshot {
        LedgerSnapshot {
            banned: self.banned.clone(),
            violations: self.violations.clone(),
            whitelist: Some(self.whitelist.clone()),
            last_saved: Some(now),
        }
    }
}

fn default_whitelist() -> BTreeSet<String> {
    DEFAULT_WHITELIST.iter().map(|address| address.to_string()).collect()
}

/// Durable per-address ban ledger
pub struct BanLedger {
    settings: BanConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    store: BanStore,
    state: Mutex<LedgerState>,
}

impl BanLedger {
    /// Opens the ledger at `settings.data_file`, loading any saved snapshot
    ///
    /// Never fails: storage problems are logged and the ledger starts empty
    /// with the default whitelist.
    pub fn open(settings: BanConfig, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        let store = BanStore::new(settings.data_path());

        if let Err(e) = store.ensure_parent_dir() {
            error!(path = %store.path().display(), error = %e, "Failed to create ledger directory");
        }

        let state = match store.load() {
            Ok(Some(snapshot)) => {
                let state = LedgerState::from_snapshot(snapshot);
                info!(
                    banned = state.banned.len(),
                    violating = state.violations.len(),
                    whitelisted = state.whitelist.len(),
                    "Loaded ban ledger"
                );
                state
            }
            Ok(None) => LedgerState::from_snapshot(LedgerSnapshot::default()),
            Err(e) => {
                warn!(
                    path = %store.path().display(),
                    error = %e,
                    "Ban ledger unreadable, starting empty"
                );
                LedgerState::from_snapshot(LedgerSnapshot::default())
            }
        };

        Self {
            settings,
            clock,
            events,
            store,
            state: Mutex::new(state),
        }
    }

    pub fn store(&self) -> &BanStore {
        &self.store
    }

    fn persist_locked(&self, state: &LedgerState, now: DateTime<Utc>) {
        if let Err(e) = self.store.save(&state.snapshot(now)) {
            error!(path = %self.store.path().display(), error = %e, "Failed to save ban ledger");
        }
    }

    /// Writes the snapshot unconditionally
    pub fn flush(&self) -> Result<(), StoreError> {
        let now = self.clock.now();
        let state = self.state.lock();
        self.store.save(&state.snapshot(now))
    }

    /// Stores a violation and bans the address once the window fills up
    ///
    /// Earlier violations stay on record after a ban, so further violations
    /// within the window ban again (and raise the ban count).
    pub fn record_violation(&self, address: &str, detail: ViolationDetail) -> ViolationOutcome {
        let address = address.trim();
        if address.is_empty() {
            debug!("Violation without address ignored");
            return ViolationOutcome::Ignored;
        }

        let now = self.clock.now();
        let (outcome, event) = {
            let mut state = self.state.lock();
            if state.whitelist.contains(address) {
                info!(address, "Address is whitelisted, violation not recorded");
                return ViolationOutcome::Ignored;
            }

            let window = Duration::hours(VIOLATION_WINDOW_HOURS);
            let record = state.violations.entry(address.to_string()).or_default();
            record.violations.push(ViolationEntry {
                timestamp: now,
                detail,
            });
            record.violations.retain(|v| now - v.timestamp < window);
            let count = record.violations.len();

            info!(
                address,
                count,
                max = self.settings.max_violations,
                "Violation recorded"
            );

            let result = if count >= self.settings.max_violations {
                let ban = self.ban_locked(&mut state, address, VIOLATION_BAN_REASON, false, now);
                let event = ban_event(address, &ban);
                (ViolationOutcome::Banned(ban), event)
            } else {
                let event = SecurityEvent::ViolationRecorded {
                    address: address.to_string(),
                    violations: count,
                    threshold: self.settings.max_violations,
                };
                (ViolationOutcome::Recorded { count }, event)
            };

            self.persist_locked(&state, now);
            result
        };

        self.events.publish(event);
        outcome
    }

    /// Bans an address; `false` for whitelisted or empty addresses
    pub fn ban(&self, address: &str, reason: &str, permanent: bool) -> bool {
        let address = address.trim();
        if address.is_empty() {
            return false;
        }

        let now = self.clock.now();
        let event = {
            let mut state = self.state.lock();
            if state.whitelist.contains(address) {
                info!(address, "Address is whitelisted, ban refused");
                return false;
            }

            let ban = self.ban_locked(&mut state, address, reason, permanent, now);
            self.persist_locked(&state, now);
            ban_event(address, &ban)
        };

        self.events.publish(event);
        true
    }

    fn ban_locked(
        &self,
        state: &mut LedgerState,
        address: &str,
        reason: &str,
        permanent: bool,
        now: DateTime<Utc>,
    ) -> BanRecord {
        // A permanent ban is never downgraded by a later timed one
        let standing = state
            .banned
            .get(address)
            .filter(|ban| ban.permanent && !permanent)
            .map(|ban| ban.reason.clone());

        let record = state.violations.entry(address.to_string()).or_default();
        record.ban_count += 1;
        record.last_ban_at = Some(now);

        let mut permanent = permanent;
        let mut reason = reason.to_string();
        if let Some(standing_reason) = standing {
            permanent = true;
            reason = standing_reason;
        } else if !permanent && record.ban_count >= self.settings.permanent_ban_threshold {
            permanent = true;
            reason.push_str(PERMANENT_BAN_NOTE);
        }

        let ban = BanRecord {
            banned_at: now,
            duration_hours: if permanent { 0 } else { self.settings.ban_duration_hours },
            reason,
            permanent,
            ban_count: record.ban_count,
        };
        state.banned.insert(address.to_string(), ban.clone());

        if permanent {
            warn!(
                address,
                reason = %ban.reason,
                ban_count = ban.ban_count,
                "Address banned permanently"
            );
        } else {
            warn!(
                address,
                reason = %ban.reason,
                ban_count = ban.ban_count,
                hours = ban.duration_hours,
                "Address banned"
            );
        }
        ban
    }

    /// Active ban of `address`, evicting it first if it has expired
    pub fn is_banned(&self, address: &str) -> Option<BanRecord> {
        let address = address.trim();
        let now = self.clock.now();
        let mut state = self.state.lock();

        let ban = state.banned.get(address)?;
        if !ban.is_expired(now) {
            return Some(ban.clone());
        }

        state.banned.remove(address);
        debug!(address, "Expired ban evicted");
        self.persist_locked(&state, now);
        None
    }

    /// Lifts a ban; `false` if the address was not banned
    pub fn unban(&self, address: &str) -> bool {
        let address = address.trim();
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            if state.banned.remove(address).is_none() {
                return false;
            }
            self.persist_locked(&state, now);
        }

        info!(address, "Address unbanned");
        self.events.publish(SecurityEvent::IpUnbanned {
            address: address.to_string(),
            at: now,
        });
        true
    }

    /// Whitelists an address, lifting any ban on it
    ///
    /// Returns `false` if it was already whitelisted.
    pub fn add_to_whitelist(&self, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() {
            return false;
        }

        let now = self.clock.now();
        let (added, unbanned) = {
            let mut state = self.state.lock();
            let added = state.whitelist.insert(address.to_string());
            let unbanned = state.banned.remove(address).is_some();
            if added || unbanned {
                self.persist_locked(&state, now);
            }
            (added, unbanned)
        };

        if added {
            info!(address, "Address whitelisted");
        }
        if unbanned {
            self.events.publish(SecurityEvent::IpUnbanned {
                address: address.to_string(),
                at: now,
            });
        }
        added
    }

    pub fn remove_from_whitelist(&self, address: &str) -> bool {
        let address = address.trim();
        let now = self.clock.now();
        let mut state = self.state.lock();

        let removed = state.whitelist.remove(address);
        if removed {
            info!(address, "Address removed from whitelist");
            self.persist_locked(&state, now);
        }
        removed
    }

    pub fn is_whitelisted(&self, address: &str) -> bool {
        self.state.lock().whitelist.contains(address.trim())
    }

    pub fn whitelist(&self) -> Vec<String> {
        self.state.lock().whitelist.iter().cloned().collect()
    }

    pub fn address_stats(&self, address: &str) -> AddressStats {
        let address = address.trim();
        let now = self.clock.now();
        let state = self.state.lock();

        let record = state.violations.get(address);
        let ban = state.banned.get(address).cloned();

        AddressStats {
            address: address.to_string(),
            violations: record.map_or(0, |r| r.violations.len()),
            ban_count: record.map_or(0, |r| r.ban_count),
            last_ban_at: record.and_then(|r| r.last_ban_at),
            currently_banned: ban.as_ref().is_some_and(|b| !b.is_expired(now)),
            ban,
            whitelisted: state.whitelist.contains(address),
        }
    }

    /// Every stored ban, sorted by address
    pub fn list_bans(&self) -> Vec<(String, BanRecord)> {
        self.state
            .lock()
            .banned
            .iter()
            .map(|(address, ban)| (address.clone(), ban.clone()))
            .collect()
    }

    pub fn stats(&self) -> BanStats {
        let now = self.clock.now();
        let recent = Duration::hours(VIOLATION_WINDOW_HOURS);
        let state = self.state.lock();

        BanStats {
            total_banned: state.banned.len(),
            active_bans: state.banned.values().filter(|b| !b.is_expired(now)).count(),
            permanent_bans: state.banned.values().filter(|b| b.permanent).count(),
            recent_bans: state
                .banned
                .values()
                .filter(|b| now - b.banned_at < recent)
                .count(),
            whitelisted: state.whitelist.len(),
            violating_addresses: state.violations.len(),
        }
    }

    /// Removes expired bans and violation records idle for 7 days
    ///
    /// Saves only when something was removed.
    pub fn cleanup(&self) -> SweepReport {
        let now = self.clock.now();
        let retention = Duration::days(VIOLATION_RETENTION_DAYS);
        let mut state = self.state.lock();

        let bans_before = state.banned.len();
        state.banned.retain(|_, ban| !ban.is_expired(now));
        let expired_bans = bans_before - state.banned.len();

        let records_before = state.violations.len();
        state.violations.retain(|_, record| {
            record.violations.retain(|v| now - v.timestamp < retention);
            let recently_banned = record.last_ban_at.is_some_and(|at| now - at < retention);
            !record.violations.is_empty() || recently_banned
        });
        let stale_violation_records = records_before - state.violations.len();

        let report = SweepReport {
            expired_bans,
            stale_violation_records,
        };
        if !report.is_empty() {
            info!(
                expired_bans,
                stale_violation_records,
                "Cleaned up ban ledger"
            );
            self.persist_locked(&state, now);
        }
        report
    }
}

fn ban_event(address: &str, ban: &BanRecord) -> SecurityEvent {
    SecurityEvent::IpBanned {
        address: address.to_string(),
        reason: ban.reason.clone(),
        permanent: ban.permanent,
        ban_count: ban.ban_count,
        duration_hours: ban.duration_hours,
        banned_at: ban.banned_at,
    }
}

#[cfg(test)]
mod tests;
