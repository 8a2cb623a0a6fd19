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

//! Session guard tests
//!
//! Contains test suites for the session boundary:
//! - Screening tests (newline handling, warnings, alerts)
//! - Escalation tests (auto-block, address bans, admission)

#[cfg(test)]
mod escalation_tests;

#[cfg(test)]
mod screen_tests;

use super::*;
use crate::clock::ManualClock;
use tempfile::TempDir;

pub(super) struct Fixture {
    pub clock: Arc<ManualClock>,
    pub guard: SecurityGuard,
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(SecurityConfig::default())
    }

    pub fn with_config(mut config: SecurityConfig) -> Self {
        let dir = TempDir::new().unwrap();
        config.bans.data_file = dir.path().join("ip-bans.json").display().to_string();
        config.threat.log_file = dir.path().join("security.log").display().to_string();

        let clock = Arc::new(ManualClock::default());
        let guard = SecurityGuard::new(&config, clock.clone(), EventBus::new());

        Self {
            clock,
            guard,
            dir,
        }
    }
}

pub(super) fn session(address: &str) -> SessionContext {
    SessionContext::new("term-1", "user-1", "alice").with_address(address)
}

pub(super) fn rejection(outcome: InputOutcome) -> Rejection {
    match outcome {
        InputOutcome::Rejected(rejection) => *rejection,
        InputOutcome::Forward => panic!("Expected the input to be rejected"),
    }
}
