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
// Whitelist Precedence
// ========================================================================

#[test]
fn test_loopback_is_whitelisted_by_default() {
    let fx = Fixture::new();

    for address in DEFAULT_WHITELIST {
        assert!(
            fx.ledger.is_whitelisted(address),
            "{address} should be whitelisted"
        );
    }
}

#[test]
fn test_whitelisted_address_is_never_banned() {
    let fx = Fixture::new();

    for _ in 0..10 {
        assert_eq!(
            fx.ledger.record_violation("127.0.0.1", violation()),
            ViolationOutcome::Ignored
        );
    }
    assert!(!fx.ledger.ban("127.0.0.1", "manual", true));
    assert!(fx.ledger.is_banned("127.0.0.1").is_none());
    assert_eq!(fx.ledger.address_stats("127.0.0.1").violations, 0);
}

#[test]
fn test_whitelisting_lifts_existing_ban() {
    let fx = Fixture::new();
    let rx = fx.events.channel();

    fx.ledger.ban("192.0.2.80", "manual", false);
    assert!(fx.ledger.add_to_whitelist("192.0.2.80"));
    assert!(!fx.ledger.add_to_whitelist("192.0.2.80"));

    assert!(fx.ledger.is_banned("192.0.2.80").is_none());
    let received: Vec<SecurityEvent> = rx.try_iter().collect();
    assert!(matches!(received.last(), Some(SecurityEvent::IpUnbanned { .. })));
}

#[test]
fn test_removed_from_whitelist_can_be_banned() {
    let fx = Fixture::new();

    fx.ledger.add_to_whitelist("192.0.2.90");
    assert!(!fx.ledger.ban("192.0.2.90", "manual", false));

    assert!(fx.ledger.remove_from_whitelist("192.0.2.90"));
    assert!(!fx.ledger.remove_from_whitelist("192.0.2.90"));
    assert!(fx.ledger.ban("192.0.2.90", "manual", false));
}

#[test]
fn test_blank_address_is_ignored() {
    let fx = Fixture::new();

    assert_eq!(
        fx.ledger.record_violation("  ", violation()),
        ViolationOutcome::Ignored
    );
    assert!(!fx.ledger.ban("", "manual", false));
    assert_eq!(fx.ledger.stats().violating_addresses, 0);
}
