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

//! Per-identity rate limiting
//!
//! Each identity owns two sliding 60 second windows: every command, and
//! commands that hit the dangerous catalogs. Overflowing either window sets
//! a timed block. Windows are pruned lazily on the next check, never on a
//! timer.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::RateLimitConfig;

/// Span of both counting windows
pub const RATE_WINDOW_SECONDS: i64 = 60;

/// Outcome of one [`RateLimiter::check`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RateDecision {
    Allowed,
    Blocked {
        reason: String,
        until: DateTime<Utc>,
    },
}

impl RateDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, RateDecision::Blocked { .. })
    }
}

/// Snapshot of one identity's limiter state
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub blocked: bool,
    pub command_count: usize,
    pub dangerous_attempts: usize,
    pub blocked_until: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct RateLimitState {
    commands: VecDeque<DateTime<Utc>>,
    dangerous: VecDeque<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
    last_seen: DateTime<Utc>,
}

impl RateLimitState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            commands: VecDeque::new(),
            dangerous: VecDeque::new(),
            blocked_until: None,
            last_seen: now,
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let window = Duration::seconds(RATE_WINDOW_SECONDS);
        for timestamps in [&mut self.commands, &mut self.dangerous] {
            while let Some(front) = timestamps.front() {
                if now - *front >= window {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    fn active_block(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.blocked_until.filter(|until| *until > now)
    }
}

/// Sliding-window limiter keyed by identity
pub struct RateLimiter {
    settings: RateLimitConfig,
    clock: Arc<dyn Clock>,
    states: Mutex<HashMap<String, RateLimitState>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one command for `identity` and decides whether it may run
    ///
    /// While a block is active the counters are left untouched. A block
    /// always lasts `block_duration_minutes`; repeat offences do not
    /// lengthen it.
    pub fn check(&self, identity: &str, dangerous: bool) -> RateDecision {
        let now = self.clock.now();
        let mut states = self.states.lock();
        let state = states
            .entry(identity.to_string())
            .or_insert_with(|| RateLimitState::new(now));
        state.last_seen = now;

        if let Some(until) = state.active_block(now) {
            let remaining = (until - now).num_milliseconds();
            let seconds = (remaining + 999) / 1000;
            return RateDecision::Blocked {
                reason: format!("temporarily blocked, {seconds} seconds remaining"),
                until,
            };
        }

        state.prune(now);

        if state.commands.len() >= self.settings.max_commands_per_minute {
            let until = self.block(identity, state, now);
            return RateDecision::Blocked {
                reason: format!(
                    "rate limit exceeded: more than {} commands per minute",
                    self.settings.max_commands_per_minute
                ),
                until,
            };
        }
        state.commands.push_back(now);

        if dangerous {
            state.dangerous.push_back(now);
            if state.dangerous.len() >= self.settings.max_dangerous_attempts_per_minute {
                let until = self.block(identity, state, now);
                return RateDecision::Blocked {
                    reason: format!(
                        "too many dangerous attempts: {} within a minute",
                        state.dangerous.len()
                    ),
                    until,
                };
            }
        }

        RateDecision::Allowed
    }

    fn block(
        &self,
        identity: &str,
        state: &mut RateLimitState,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let until = now + Duration::minutes(i64::from(self.settings.block_duration_minutes));
        state.blocked_until = Some(until);
        warn!(
            identity,
            commands = state.commands.len(),
            dangerous = state.dangerous.len(),
            %until,
            "Identity rate limited"
        );
        until
    }

    /// Current counters for `identity`, pruned to the window
    pub fn status(&self, identity: &str) -> RateLimitStatus {
        let now = self.clock.now();
        let mut states = self.states.lock();

        let Some(state) = states.get_mut(identity) else {
            return RateLimitStatus::default();
        };
        state.prune(now);
        let blocked_until = state.active_block(now);

        RateLimitStatus {
            blocked: blocked_until.is_some(),
            command_count: state.commands.len(),
            dangerous_attempts: state.dangerous.len(),
            blocked_until,
        }
    }

    /// Forgets everything about `identity`, lifting any block
    pub fn clear(&self, identity: &str) -> bool {
        let removed = self.states.lock().remove(identity).is_some();
        if removed {
            debug!(identity, "Cleared rate limit state");
        }
        removed
    }

    /// Drops identities idle longer than `idle` with no active block
    ///
    /// Returns the identities removed.
    pub fn prune_idle(&self, idle: Duration) -> Vec<String> {
        let now = self.clock.now();
        let mut removed = Vec::new();

        self.states.lock().retain(|identity, state| {
            let keep = state.active_block(now).is_some() || now - state.last_seen <= idle;
            if !keep {
                removed.push(identity.clone());
            }
            keep
        });

        if !removed.is_empty() {
            debug!(count = removed.len(), "Pruned idle rate limit state");
        }
        removed
    }

    /// Number of identities currently tracked
    pub fn tracked(&self) -> usize {
        self.states.lock().len()
    }

    pub fn settings(&self) -> &RateLimitConfig {
        &self.settings
    }
}
