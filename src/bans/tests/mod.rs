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

//! Ban ledger tests
//!
//! Contains test suites for the per-address ledger:
//! - Escalation tests (violation threshold, temporary and permanent bans)
//! - Whitelist tests (precedence over violations and bans)
//! - Persistence tests (snapshot round trip, malformed storage, sweep)

#[cfg(test)]
mod escalation_tests;


#[cfg(test)]
mod whitelist_tests;

use super::*;
use crate::clock::ManualClock;
use tempfile::TempDir;

/// Ledger writing into a fresh temporary directory
pub(super) struct Fixture {
    pub clock: Arc<ManualClock>,
    pub events: EventBus,
    pub ledger: BanLedger,
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let events = EventBus::new();
        let ledger = BanLedger::open(settings_in(&dir), clock.clone(), events.clone());

        Self {
            clock,
            events,
            ledger,
            dir,
        }
    }

    /// Opens a second ledger on the same file, as a restart would
    pub fn reopen(&self) -> BanLedger {
        BanLedger::open(settings_in(&self.dir), self.clock.clone(), EventBus::new())
    }
}

pub(super) fn settings_in(dir: &TempDir) -> BanConfig {
    BanConfig {
        data_file: dir.path().join("data").join("ip-bans.json").display().to_string(),
        ..BanConfig::default()
    }
}

pub(super) fn violation() -> ViolationDetail {
    ViolationDetail::new(
        "dangerous-command",
        "may delete important files or directories",
        Severity::High,
    )
        .with_command("rm -rf /")
}
