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

use super::super::*;
use super::{rejection, session, Fixture};

// ========================================================================
// Newline Handling
// ========================================================================

#[test]
fn test_keystrokes_are_forwarded() {
    let fx = Fixture::new();
    let session = session("203.0.113.7");

    // Partial input is never inspected, even if it spells a dangerous command
    assert_eq!(fx.guard.screen(&session, "rm -rf /"), InputOutcome::Forward);
    assert_eq!(fx.guard.screen(&session, "\r"), InputOutcome::Forward);
    assert_eq!(fx.guard.screen(&session, "ls -la\r"), InputOutcome::Forward);
}

// ========================================================================
// Rejection Output
// ========================================================================

#[test]
fn test_rejection_carries_warning_and_prompt() {
    let fx = Fixture::new();
    let session = session("203.0.113.7");

    let rejected = rejection(fx.guard.screen(&session, "shutdown -h now\r\n"));

    assert_eq!(rejected.verdict.severity, Severity::High);
    assert!(rejected.warning.contains("\"shutdown -h now\""));
    assert!(rejected.warning.contains("will shut down or restart the system"));
    assert!(rejected.warning.ends_with("alice@shellwarden:$ "));
    assert_eq!(rejected.disconnect, None);
}

#[test]
fn test_alert_is_redacted_and_truncated() {
    let fx = Fixture::new();
    let session = session("203.0.113.7");
    let long = format!("rm -rf /{}", "x".repeat(80));

    let alert = rejection(fx.guard.screen(&session, &format!("{long}\n")))
        .alert
        .expect("Broadcast is on by default");

    assert_eq!(alert.source.as_deref(), Some("203.0.*.*"));
    assert_eq!(alert.command.chars().count(), 53);
    assert!(alert.command.ends_with("..."));
    assert!(alert.message.contains("alice"));
}

#[test]
fn test_broadcast_can_be_disabled() {
    let mut config = SecurityConfig::default();
    config.notifications.broadcast_security_events = false;
    let fx = Fixture::with_config(config);

    let rejected = rejection(fx.guard.screen(&session("203.0.113.7"), "reboot\n"));
    assert_eq!(rejected.alert, None);
}

#[test]
fn test_rejection_is_scored_and_recorded() {
    let fx = Fixture::new();

    fx.guard.screen(&session("203.0.113.8"), "mkfs.ext4 /dev/sda1\n");

    assert_eq!(fx.guard.monitor().score("user-1").score, 5);
    let stats = fx.guard.bans().address_stats("203.0.113.8");
    assert_eq!(stats.violations, 1);
    assert!(!stats.currently_banned);
}

#[test]
fn test_session_without_address_skips_ban_ledger() {
    let fx = Fixture::new();
    let session = SessionContext::new("term-2", "user-2", "bob");

    rejection(fx.guard.screen(&session, "rm -rf /\n"));
    assert_eq!(fx.guard.bans().stats().violating_addresses, 0);
    assert_eq!(fx.guard.monitor().score("user-2").violations, 1);
}
