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

//! Threat monitor tests
//!
//! Contains test suites for the per-user ledger:
//! - Score tests (point table, decay window, risk levels)
//! - Block tests (auto-block, manual block, unblock, notifications)
//! - Log tests (bounded event log, statistics, cleanup)
//! - Journal tests (security log file, reload, rotation)

#[cfg(test)]
mod block_tests;



#[cfg(test)]
mod score_tests;

use super::*;

/// Default thresholds with the security log file switched off
pub(super) fn memory_only() -> ThreatConfig {
    ThreatConfig {
        log_file: String::new(),
        ..ThreatConfig::default()
    }
}
