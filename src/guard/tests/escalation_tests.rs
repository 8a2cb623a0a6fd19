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
use chrono::Duration;

// ========================================================================
// Escalation
// ========================================================================

#[test]
fn test_repeat_offender_is_banned_and_refused() {
    let fx = Fixture::new();
    let session = session("198.51.100.9");

    assert_eq!(fx.guard.admit("198.51.100.9"), Admission::Allowed);

    let first = rejection(fx.guard.screen(&session, "rm -rf /\n"));
    let second = rejection(fx.guard.screen(&session, "rm -rf /\n"));
    assert_eq!(first.disconnect, None);
    assert_eq!(second.disconnect, None);

    let third = rejection(fx.guard.screen(&session, "rm -rf /\n"));
    let disconnect = third.disconnect.expect("Third violation should disconnect");
    assert_eq!(disconnect.reason, "address banned");
    assert!(!disconnect.permanent);
    assert_eq!(disconnect.ban_count, 1);

    match fx.guard.admit("198.51.100.9") {
        Admission::Rejected(notice) => {
            assert_eq!(notice.duration_hours, 24);
            assert!(!notice.permanent);
        }
        Admission::Allowed => panic!("Banned address should be refused"),
    }
}

#[test]
fn test_blocked_user_input_is_refused() {
    let fx = Fixture::new();
    // Whitelisted address: only the user block applies
    let session = session("127.0.0.1");

    for _ in 0..2 {
        rejection(fx.guard.screen(&session, "reboot\n"));
    }
    let third = rejection(fx.guard.screen(&session, "reboot\n"));
    assert_eq!(
        third.disconnect.map(|d| d.reason),
        Some("user blocked".to_string())
    );
    assert!(fx.guard.monitor().is_blocked("user-1"));

    // Even harmless input is refused now
    let refused = rejection(fx.guard.screen(&session, "ls\n"));
    assert!(refused.verdict.reason.starts_with("user is blocked"));
    assert_eq!(
        refused.alert,
        None,
        "Refusals of blocked users are not broadcast"
    );

    assert!(fx.guard.monitor().unblock("user-1"));
    fx.guard.filter().clear_rate_limit("user-1");
    assert_eq!(fx.guard.screen(&session, "ls\n"), InputOutcome::Forward);
}

// ========================================================================
// Sweep
// ========================================================================

#[test]
fn test_sweep_cleans_every_ledger() {
    let fx = Fixture::new();

    fx.guard.bans().ban("192.0.2.30", "manual", false);
    fx.guard.screen(&session("192.0.2.31"), "reboot\n");
    fx.clock.advance(Duration::days(8));

    let summary = fx.guard.sweep();

    assert_eq!(summary.bans.expired_bans, 1);
    assert_eq!(summary.bans.stale_violation_records, 2);
    assert_eq!(summary.threat_records, 1);
    assert_eq!(summary.idle_identities, 1);
    assert!(
        summary.log_rotated,
        "Week-old security log should be archived"
    );
    assert!(!fx.dir.path().join("security.log").exists());
}

#[test]
fn test_rejections_reach_security_log() {
    let fx = Fixture::new();

    fx.guard.screen(&session("192.0.2.32"), "shutdown -h now\n");

    let path = fx.dir.path().join("security.log");
    let records = crate::monitor::journal::read_records(&path).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, SecurityEventKind::DangerousCommand);
    assert_eq!(records[0].command.as_deref(), Some("shutdown -h now"));
}
