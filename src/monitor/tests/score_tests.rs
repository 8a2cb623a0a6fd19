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

fn monitor() -> (Arc<ManualClock>, ThreatMonitor) {
    let clock = Arc::new(ManualClock::default());
    let monitor = ThreatMonitor::new(memory_only(), clock.clone(), EventBus::new());
    (clock, monitor)
}

// ========================================================================
// Point Table
// ========================================================================

#[test]
fn test_severity_points() {
    assert_eq!(Severity::Critical.points(), 10);
    assert_eq!(Severity::High.points(), 5);
    assert_eq!(Severity::Medium.points(), 2);
    assert_eq!(Severity::Low.points(), 1);
    assert_eq!(Severity::from_str_lossy("catastrophic").points(), 1);
}

#[test]
fn test_score_sums_violations() {
    let (clock, monitor) = monitor();

    monitor.record("alice", Severity::High);
    clock.advance(Duration::minutes(10));
    monitor.record("alice", Severity::Medium);

    let score = monitor.score("alice");
    assert_eq!(score.score, 7);
    assert_eq!(score.violations, 2);
    assert_eq!(score.risk_level, RiskLevel::Medium);
    assert_eq!(score.last_violation_at, Some(clock.now()));
}

#[test]
fn test_none_severity_is_not_scored() {
    let (_clock, monitor) = monitor();

    assert!(!monitor.record("alice", Severity::None));
    assert!(!monitor.record("   ", Severity::Critical));
    assert_eq!(monitor.score("alice").violations, 0);
}

// ========================================================================
// Decay Window
// ========================================================================

#[test]
fn test_score_reflects_trailing_day_only() {
    let (clock, monitor) = monitor();

    monitor.record("bob", Severity::Critical);
    clock.advance(Duration::hours(25));
    monitor.record("bob", Severity::Low);

    let score = monitor.score("bob");
    assert_eq!(score.score, 1, "Day-old violation should no longer count");
    assert_eq!(score.violations, 1);
    assert_eq!(score.risk_level, RiskLevel::Low);
}

#[test]
fn test_risk_level_buckets() {
    assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
    assert_eq!(RiskLevel::from_score(4), RiskLevel::Low);
    assert_eq!(RiskLevel::from_score(5), RiskLevel::Medium);
    assert_eq!(RiskLevel::from_score(9), RiskLevel::Medium);
    assert_eq!(RiskLevel::from_score(10), RiskLevel::High);
    assert_eq!(RiskLevel::from_score(19), RiskLevel::High);
    assert_eq!(RiskLevel::from_score(20), RiskLevel::Critical);
}

#[test]
fn test_unknown_user_scores_zero() {
    let (_clock, monitor) = monitor();

    let score = monitor.score("nobody");
    assert_eq!(score.score, 0);
    assert_eq!(score.risk_level, RiskLevel::Low);
    assert_eq!(score.last_violation_at, None);
}
