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

//! Session boundary of the pipeline
//!
//! [`SecurityGuard`] is what a terminal server calls. It owns the filter,
//! the threat monitor and the ban ledger, and turns their answers into
//! what a session layer acts on:
//!
//! - [`admit`](SecurityGuard::admit) before a connection is accepted
//! - [`screen`](SecurityGuard::screen) for every chunk of input before it
//!   reaches the shell
//! - [`sweep`](SecurityGuard::sweep) periodically, see [`crate::sweeper`]
//!
//! The guard does no I/O of its own apart from the ledger's snapshot
//! writes. Forwarding bytes, closing connections and broadcasting alerts
//! stay with the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod render;

use crate::bans::{BanLedger, SweepReport, ViolationDetail, ViolationOutcome};
use crate::clock::Clock;
use crate::config::{NotificationConfig, SecurityConfig};
use crate::events::EventBus;
use crate::filter::{CommandFilter, CommandVerdict, Severity};
use crate::monitor::{NewSecurityEvent, SecurityEventKind, ThreatMonitor, AUTO_BLOCK_REASON};

/// One terminal session as the guard sees it
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionContext {
    pub terminal_id: String,
    /// Identity used for rate limiting and threat scoring
    pub owner_id: String,
    pub owner_name: String,
    /// Source address; sessions without one skip ban handling
    pub address: Option<String>,
    /// Re-rendered after a warning
    pub prompt: String,
}

impl SessionContext {
    pub fn new(
        terminal_id: impl Into<String>,
        owner_id: impl Into<String>,
        owner_name: impl Into<String>,
    ) -> Self {
        let owner_name = owner_name.into();
        Self {
            terminal_id: terminal_id.into(),
            owner_id: owner_id.into(),
            prompt: format!("{owner_name}@shellwarden:$ "),
            owner_name,
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Sent to a connecting client whose address is banned
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpBannedNotice {
    pub reason: String,
    pub banned_at: DateTime<Utc>,
    pub permanent: bool,
    pub duration_hours: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Admission {
    Allowed,
    /// Connection must be refused
    Rejected(IpBannedNotice),
}

/// Sent to every session for transparency when a command is rejected
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    pub message: String,
    pub severity: Severity,
    /// Cut to `alert_command_max_chars`
    pub command: String,
    pub timestamp: DateTime<Utc>,
    /// Redacted source address
    pub source: Option<String>,
}

/// Session must be closed
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceDisconnect {
    pub reason: String,
    pub details: String,
    pub permanent: bool,
    pub ban_count: u32,
}

/// A suppressed input line and what to do about it
#[derive(Clone, Debug, PartialEq)]
pub struct Rejection {
    pub verdict: CommandVerdict,
    /// Warning plus prompt, for the originating session only
    pub warning: String,
    pub alert: Option<SecurityAlert>,
    pub disconnect: Option<ForceDisconnect>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputOutcome {
    /// Pass the chunk to the shell unchanged
    Forward,
    Rejected(Box<Rejection>),
}

/// What one [`SecurityGuard::sweep`] removed
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub bans: SweepReport,
    pub threat_records: usize,
    pub idle_identities: usize,
    /// The security log file was archived
    pub log_rotated: bool,
}

/// Classifier, threat monitor and ban ledger wired together
pub struct SecurityGuard {
    filter: Arc<CommandFilter>,
    monitor: Arc<ThreatMonitor>,
    bans: Arc<BanLedger>,
    notifications: NotificationConfig,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl SecurityGuard {
    /// Builds every component from `config`; the ledger is loaded from disk
    pub fn new(config: &SecurityConfig, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        let filter = CommandFilter::new(
            config.filter.clone(),
            config.rate_limit.clone(),
            clock.clone(),
        );
        let monitor = ThreatMonitor::new(config.threat.clone(), clock.clone(), events.clone());
        let bans = BanLedger::open(config.bans.clone(), clock.clone(), events.clone());

        Self {
            filter: Arc::new(filter),
            monitor: Arc::new(monitor),
            bans: Arc::new(bans),
            notifications: config.notifications.clone(),
            events,
            clock,
        }
    }

    pub fn filter(&self) -> &Arc<CommandFilter> {
        &self.filter
    }

    pub fn monitor(&self) -> &Arc<ThreatMonitor> {
        &self.monitor
    }

    pub fn bans(&self) -> &Arc<BanLedger> {
        &self.bans
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Decides whether a new connection from `address` may proceed
    pub fn admit(&self, address: &str) -> Admission {
        match self.bans.is_banned(address) {
            Some(ban) => {
                warn!(address, reason = %ban.reason, "Connection from banned address refused");
                Admission::Rejected(IpBannedNotice {
                    reason: ban.reason,
                    banned_at: ban.banned_at,
                    permanent: ban.permanent,
                    duration_hours: ban.duration_hours,
                })
            }
            None => Admission::Allowed,
        }
    }

    /// Screens one chunk of session input
    ///
    /// Only chunks carrying `\r` or `\n` are inspected; keystrokes in between
    /// are forwarded as typed. On a dangerous verdict the threat score and the
    /// address violation are recorded before this returns.
    pub fn screen(&self, session: &SessionContext, data: &str) -> InputOutcome {
        if !data.contains(['\r', '\n']) {
            return InputOutcome::Forward;
        }

        let command = data.replace(['\r', '\n'], "");
        let command = command.trim();
        if command.is_empty() {
            return InputOutcome::Forward;
        }

        if let Some((reason, _)) = self.monitor.block_reason(&session.owner_id) {
            debug!(owner = %session.owner_id, "Input from blocked user refused");
            let verdict =
                CommandVerdict::dangerous(Severity::Critical, format!("user is blocked: {reason}"));
            return self.reject(
                session,
                command,
                verdict,
                false,
                Some(ForceDisconnect {
                    reason: "user blocked".to_string(),
                    details: reason,
                    permanent: false,
                    ban_count: 0,
                }),
            );
        }

        let verdict = self.filter.classify(command, Some(&session.owner_id));
        if !verdict.is_dangerous {
            debug!(owner = %session.owner_id, command, "Command forwarded");
            return InputOutcome::Forward;
        }

        warn!(
            terminal = %session.terminal_id,
            owner = %session.owner_id,
            name = %session.owner_name,
            command,
            reason = %verdict.reason,
            severity = %verdict.severity,
            "Dangerous command rejected"
        );

        let kind = if self.filter.rate_limit_status(&session.owner_id).blocked {
            SecurityEventKind::RateLimited
        } else {
            SecurityEventKind::DangerousCommand
        };

        let user_blocked = self.monitor.log_event(NewSecurityEvent {
            kind,
            user_id: session.owner_id.clone(),
            user_name: Some(session.owner_name.clone()),
            address: session.address.clone(),
            command: Some(command.to_string()),
            reason: verdict.reason.clone(),
            severity: verdict.severity,
        });

        let mut disconnect = None;
        if let Some(address) = &session.address {
            let detail =
                ViolationDetail::new(kind.as_str(), verdict.reason.clone(), verdict.severity)
                    .with_command(command);
            if let ViolationOutcome::Banned(ban) = self.bans.record_violation(address, detail) {
                disconnect = Some(ForceDisconnect {
                    reason: "address banned".to_string(),
                    details: ban.reason,
                    permanent: ban.permanent,
                    ban_count: ban.ban_count,
                });
            }
        }

        if disconnect.is_none() && user_blocked {
            disconnect = Some(ForceDisconnect {
                reason: "user blocked".to_string(),
                details: AUTO_BLOCK_REASON.to_string(),
                permanent: false,
                ban_count: 0,
            });
        }

        self.reject(session, command, verdict, true, disconnect)
    }

    fn reject(
        &self,
        session: &SessionContext,
        command: &str,
        verdict: CommandVerdict,
        broadcast: bool,
        disconnect: Option<ForceDisconnect>,
    ) -> InputOutcome {
        let mut warning = render::warning(command, &verdict);
        warning.push_str(&session.prompt);

        let alert = (broadcast && self.notifications.broadcast_security_events).then(|| {
            SecurityAlert {
                message: format!("user {} attempted a blocked command", session.owner_name),
                severity: verdict.severity,
                command: render::truncate_command(
                    command,
                    self.notifications.alert_command_max_chars,
                ),
                timestamp: self.clock.now(),
                source: session.address.as_deref().map(render::redact_address),
            }
        });

        InputOutcome::Rejected(Box::new(Rejection {
            verdict,
            warning,
            alert,
            disconnect,
        }))
    }

    /// Periodic cleanup of every ledger
    pub fn sweep(&self) -> SweepSummary {
        SweepSummary {
            bans: self.bans.cleanup(),
            threat_records: self.monitor.cleanup(),
            idle_identities: self.filter.prune_idle(self.filter.idle_expiry()),
            log_rotated: self.monitor.rotate_log().is_some(),
        }
    }
}

#[cfg(test)]
mod tests;
