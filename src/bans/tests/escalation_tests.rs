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
use super::{violation, Fixture};

// ========================================================================
// Violation Threshold
// ========================================================================

#[test]
fn test_third_violation_bans_temporarily() {
    let fx = Fixture::new();
    let rx = fx.events.channel();

    assert_eq!(
        fx.ledger.record_violation("203.0.113.5", violation()),
        ViolationOutcome::Recorded { count: 1 }
    );
    assert_eq!(
        fx.ledger.record_violation("203.0.113.5", violation()),
        ViolationOutcome::Recorded { count: 2 }
    );

    let ban = match fx.ledger.record_violation("203.0.113.5", violation()) {
        ViolationOutcome::Banned(ban) => ban,
        other => panic!("Third violation should ban, got {other:?}"),
    };
    assert!(!ban.permanent);
    assert_eq!(ban.duration_hours, 24);
    assert_eq!(ban.ban_count, 1);
    assert_eq!(ban.reason, VIOLATION_BAN_REASON);

    let received: Vec<SecurityEvent> = rx.try_iter().collect();
    assert_eq!(received.len(), 3);
    assert!(matches!(
        received[2],
        SecurityEvent::IpBanned { permanent: false, ban_count: 1, .. }
    ));
}

#[test]
fn test_old_violations_fall_out_of_window() {
    let fx = Fixture::new();

    fx.ledger.record_violation("203.0.113.6", violation());
    fx.ledger.record_violation("203.0.113.6", violation());
    fx.clock.advance(Duration::hours(25));

    assert_eq!(
        fx.ledger.record_violation("203.0.113.6", violation()),
        ViolationOutcome::Recorded { count: 1 }
    );
    assert!(fx.ledger.is_banned("203.0.113.6").is_none());
}

// ========================================================================
// Escalation to Permanent
// ========================================================================

#[test]
fn test_repeat_cycles_escalate_to_permanent() {
    let fx = Fixture::new();
    let address = "198.51.100.20";

    for cycle in 1..=3u32 {
        let mut last = ViolationOutcome::Ignored;
        for _ in 0..3 {
            last = fx.ledger.record_violation(address, violation());
        }

        let ban = match last {
            ViolationOutcome::Banned(ban) => ban,
            other => panic!("Cycle {cycle} should end in a ban, got {other:?}"),
        };
        assert_eq!(ban.ban_count, cycle);

        if cycle < 3 {
            assert!(!ban.permanent, "Cycle {cycle} should be temporary");
            assert_eq!(ban.duration_hours, 24);
        } else {
            assert!(ban.permanent, "Third ban should be permanent");
            assert_eq!(ban.duration_hours, 0);
            assert!(ban.reason.ends_with(PERMANENT_BAN_NOTE));
        }

        fx.clock.advance(Duration::hours(25));
    }

    // Permanent bans never expire
    fx.clock.advance(Duration::days(365));
    assert!(fx.ledger.is_banned(address).is_some());
}

#[test]
fn test_explicit_permanent_ban() {
    let fx = Fixture::new();

    assert!(fx.ledger.ban("192.0.2.50", "manual", true));
    let ban = fx.ledger.is_banned("192.0.2.50").unwrap();
    assert!(ban.permanent);
    assert_eq!(ban.duration_hours, 0);
    assert_eq!(
        ban.reason,
        "manual",
        "Explicit permanent bans keep their reason"
    );
    assert_eq!(ban.ban_count, 1);
}

#[test]
fn test_violations_do_not_downgrade_permanent_ban() {
    let fx = Fixture::new();
    let address = "192.0.2.51";

    assert!(fx.ledger.ban(address, "manual", true));
    fx.ledger.record_violation(address, violation());
    fx.ledger.record_violation(address, violation());
    let ban = match fx.ledger.record_violation(address, violation()) {
        ViolationOutcome::Banned(ban) => ban,
        other => panic!("Third violation should re-ban, got {other:?}"),
    };
    assert!(ban.permanent, "Re-ban must stay permanent");
    assert_eq!(ban.duration_hours, 0);
    assert_eq!(ban.reason, "manual");

    fx.clock.advance(Duration::hours(48));
    let ban = fx.ledger.is_banned(address).expect("Permanent ban should still hold");
    assert!(ban.permanent);
}

// ========================================================================
// Expiry
// ========================================================================

#[test]
fn test_temporary_ban_expires_lazily() {
    let fx = Fixture::new();

    fx.ledger.ban("192.0.2.60", "manual", false);
    fx.clock.advance(Duration::hours(23));
    assert!(fx.ledger.is_banned("192.0.2.60").is_some());

    fx.clock.advance(Duration::hours(2));
    assert!(fx.ledger.is_banned("192.0.2.60").is_none());
    assert!(
        fx.ledger.list_bans().is_empty(),
        "Lookup should evict the expired ban"
    );
}

#[test]
fn test_unban() {
    let fx = Fixture::new();

    fx.ledger.ban("192.0.2.70", "manual", false);
    assert!(fx.ledger.unban("192.0.2.70"));
    assert!(fx.ledger.is_banned("192.0.2.70").is_none());
    assert!(!fx.ledger.unban("192.0.2.70"));

    // Ban count survives the unban
    assert_eq!(fx.ledger.address_stats("192.0.2.70").ban_count, 1);
}

#[test]
fn test_stats() {
    let fx = Fixture::new();

    fx.ledger.ban("192.0.2.1", "a", false);
    fx.ledger.ban("192.0.2.2", "b", true);
    fx.ledger.record_violation("192.0.2.3", violation());
    fx.clock.advance(Duration::hours(30));

    let stats = fx.ledger.stats();
    assert_eq!(stats.total_banned, 2);
    assert_eq!(stats.active_bans, 1);
    assert_eq!(stats.permanent_bans, 1);
    assert_eq!(stats.recent_bans, 0);
    assert_eq!(stats.whitelisted, DEFAULT_WHITELIST.len());
    assert_eq!(stats.violating_addresses, 3);
}
