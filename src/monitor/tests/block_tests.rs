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
use super::memory_only;
use crate::clock::ManualClock;
use std::sync::mpsc::Receiver;

fn monitor() -> (Arc<ManualClock>, ThreatMonitor, Receiver<SecurityEvent>) {
    let clock = Arc::new(ManualClock::default());
    let events = EventBus::new();
    let rx = events.channel();
    let monitor = ThreatMonitor::new(memory_only(), clock.clone(), events);
    (clock, monitor, rx)
}

// ========================================================================
// Auto-block
// ========================================================================

#[test]
fn test_third_violation_in_window_blocks() {
    let (clock, monitor, rx) = monitor();

    assert!(!monitor.record("mallory", Severity::Low));
    clock.advance(Duration::minutes(1));
    assert!(!monitor.record("mallory", Severity::Low));
    clock.advance(Duration::minutes(1));
    assert!(
        monitor.record("mallory", Severity::Low),
        "Third violation should block"
    );

    assert!(monitor.is_blocked("mallory"));
    match rx.try_recv() {
        Ok(SecurityEvent::UserBlocked { user_id, reason, .. }) => {
            assert_eq!(user_id, "mallory");
            assert_eq!(reason, AUTO_BLOCK_REASON);
        }
        other => panic!("Expected UserBlocked, got {other:?}"),
    }

    // Further violations don't re-block or re-notify
    assert!(!monitor.record("mallory", Severity::High));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_spread_out_violations_do_not_block() {
    let (clock, monitor, _rx) = monitor();

    for _ in 0..5 {
        monitor.record("slow", Severity::High);
        clock.advance(Duration::minutes(3));
    }

    assert!(!monitor.is_blocked("slow"));
    assert_eq!(monitor.score("slow").score, 25);
}

// ========================================================================
// Manual Block and Unblock
// ========================================================================

#[test]
fn test_manual_block_and_unblock() {
    let (_clock, monitor, rx) = monitor();

    monitor.record("trent", Severity::Critical);
    assert!(monitor.block("trent", "abusive session"));
    assert!(
        !monitor.block("trent", "again"),
        "Second block should be a no-op"
    );
    assert_eq!(
        monitor.block_reason("trent").map(|(reason, _)| reason),
        Some("abusive session".to_string())
    );

    assert!(monitor.unblock("trent"));
    assert!(!monitor.is_blocked("trent"));
    assert_eq!(
        monitor.score("trent").score,
        0,
        "Unblock should clear the score"
    );
    assert!(!monitor.unblock("trent"));

    let received: Vec<SecurityEvent> = rx.try_iter().collect();
    assert_eq!(received.len(), 2);
    assert!(matches!(received[0], SecurityEvent::UserBlocked { .. }));
    assert!(matches!(received[1], SecurityEvent::UserUnblocked { .. }));
}

#[test]
fn test_unblock_of_unblocked_user_keeps_score() {
    let (_clock, monitor, rx) = monitor();

    monitor.record("victor", Severity::High);
    assert!(!monitor.is_blocked("victor"));

    assert!(!monitor.unblock("victor"), "Nothing to unblock");
    assert_eq!(
        monitor.score("victor").score,
        5,
        "Score should survive a no-op unblock"
    );
    assert_eq!(monitor.score("victor").violations, 1);
    assert_eq!(rx.try_iter().count(), 0, "No event for a no-op unblock");
}
