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

//! Command risk classification
//!
//! [`CommandFilter::classify`] screens one command line and returns a
//! [`CommandVerdict`]. Checks run top to bottom and the first hit wins:
//!
//! 1. **Rate limit**: an identity that is blocked gets `critical`
//! 2. **Length**: longer than `max_command_length` gets `high`
//! 3. **NUL byte**: `critical`
//! 4. **Special characters**: more than `max_special_chars` of
//!    `` ; & | ` $ ( ) { } [ ] < > `` gets `medium`
//! 5. **Regex catalog**: `high`
//! 6. **Literal catalog** (with the safe `rm -f` carve-out): `high`
//! 7. **sudo catalog**: `critical`
//! 8. **Sequence detector**: `high` for a dangerous part, `medium` for an idiom
//! 9. **Encoding detector**: `high`
//!
//! Steps 5 to 8 run on the lowercased, trimmed line. Step 9 runs on the
//! trimmed line with its case intact. In strict mode a line that passes all
//! nine checks is still refused (`low`) unless its first word is on the
//! safe allow-list.
//!
//! Classification never fails: rejections are verdicts, and decode errors
//! inside the detectors mean "nothing found".

use chrono::Duration;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub mod catalog;
pub mod encoding;
pub mod escapes;
pub mod patterns;
pub mod reason;
pub mod sequence;
pub mod types;

pub use catalog::PatternCatalog;
pub use encoding::EncodingDetector;
pub use sequence::SequenceDetector;
pub use types::{CommandVerdict, DetectionHit, RiskLevel, Severity};

use crate::clock::Clock;
use crate::config::{FilterConfig, RateLimitConfig};
use crate::limiter::{RateDecision, RateLimitStatus, RateLimiter};

/// Shell metacharacters counted by the density check
pub const SPECIAL_CHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>',
];

/// Errors raised when extending the catalog at runtime.
#[derive(Debug, Error)]
pub enum FilterError {
    /// User-supplied regex did not compile.
    #[error("Invalid dangerous pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Add-only access to the dangerous catalogs
///
/// Entries can be appended while the filter is shared between sessions;
/// nothing can be removed.
pub trait CatalogExtend {
    /// Appends a literal (trimmed, lowercased). `false` for blanks and duplicates.
    fn add_dangerous_command(&self, command: &str) -> bool;

    /// Compiles and appends a regex. `Ok(false)` if it is already present.
    fn add_dangerous_pattern(&self, pattern: &str) -> Result<bool, FilterError>;
}

/// The classifier: catalogs, detectors, rate limiter and recent history
pub struct CommandFilter {
    settings: FilterConfig,
    catalog: RwLock<PatternCatalog>,
    sequence: SequenceDetector,
    encoding: EncodingDetector,
    limiter: RateLimiter,
    history: Mutex<HashMap<String, VecDeque<String>>>,
}

impl CommandFilter {
    /// Creates a filter with the built-in catalogs
    pub fn new(settings: FilterConfig, rate_limit: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            catalog: RwLock::new(PatternCatalog::new()),
            sequence: SequenceDetector::new(),
            encoding: EncodingDetector::new(),
            limiter: RateLimiter::new(rate_limit, clock),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Classifies one command line
    ///
    /// A non-empty `identity` is rate limited; every such call counts toward
    /// its windows except when it is rejected by an active block. Blank
    /// identities are treated as absent.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use shellwarden::clock::SystemClock;
    /// use shellwarden::config::SecurityConfig;
    /// use shellwarden::filter::{CommandFilter, Severity};
    ///
    /// let config = SecurityConfig::default();
    /// let filter = CommandFilter::new(config.filter, config.rate_limit, Arc::new(SystemClock));
    ///
    /// let verdict = filter.classify("rm -rf /", None);
    /// assert!(verdict.is_dangerous);
    /// assert_eq!(verdict.severity, Severity::High);
    ///
    /// assert!(!filter.classify("ls -la", None).is_dangerous);
    /// ```
    pub fn classify(&self, command: &str, identity: Option<&str>) -> CommandVerdict {
        let identity = identity.map(str::trim).filter(|id| !id.is_empty());
        let trimmed = command.trim();
        let normalized = trimmed.to_lowercase();
        let catalog = self.catalog.read();

        if let Some(identity) = identity {
            let dangerous = catalog.is_catalog_match(&normalized);
            if let RateDecision::Blocked { reason, .. } = self.limiter.check(identity, dangerous) {
                debug!(identity, %reason, "Command rejected by rate limiter");
                return CommandVerdict::dangerous(Severity::Critical, reason);
            }
        }

        let verdict = self.screen(command, trimmed, &normalized, &catalog);
        drop(catalog);

        match verdict {
            Some(verdict) => {
                debug!(
                    identity = identity.unwrap_or("-"),
                    severity = %verdict.severity,
                    reason = %verdict.reason,
                    "Command flagged"
                );
                verdict
            }
            None => {
                if let Some(identity) = identity {
                    self.remember(identity, trimmed);
                }
                CommandVerdict::safe()
            }
        }
    }

    /// Checks 2 to 9 plus strict mode
    fn screen(
        &self,
        command: &str,
        trimmed: &str,
        normalized: &str,
        catalog: &PatternCatalog,
    ) -> Option<CommandVerdict> {
        if command.chars().count() > self.settings.max_command_length {
            return Some(CommandVerdict::dangerous(
                Severity::High,
                format!(
                    "length exceeds limit of {} characters",
                    self.settings.max_command_length
                ),
            ));
        }

        if command.contains('\0') {
            return Some(CommandVerdict::dangerous(
                Severity::Critical,
                "null byte / injection",
            ));
        }

        let special = command.chars().filter(|c| SPECIAL_CHARS.contains(c)).count();
        if special > self.settings.max_special_chars {
            return Some(CommandVerdict::dangerous(
                Severity::Medium,
                format!("excess special characters ({special})"),
            ));
        }

        if catalog.matching_pattern(normalized).is_some()
            || catalog.matching_literal(normalized).is_some()
        {
            return Some(CommandVerdict::dangerous(
                Severity::High,
                reason::explain(command),
            ));
        }

        if catalog.matching_sudo(normalized).is_some() {
            return Some(CommandVerdict::dangerous(
                Severity::Critical,
                reason::explain(command),
            ));
        }

        if self.settings.enable_sequence_detection {
            if let Some(hit) = self.sequence.check(normalized, catalog) {
                return Some(hit.into());
            }
        }

        if self.settings.enable_encoding_detection {
            if let Some(hit) = self.encoding.check(trimmed, catalog) {
                return Some(hit.into());
            }
        }

        if self.settings.strict_mode {
            let allowed = normalized
                .split_whitespace()
                .next()
                .is_none_or(|name| catalog.is_safe_command(name));
            if !allowed {
                return Some(CommandVerdict::dangerous(
                    Severity::Low,
                    "command not on allow-list",
                ));
            }
        }

        None
    }

    fn remember(&self, identity: &str, command: &str) {
        if command.is_empty() {
            return;
        }

        let mut history = self.history.lock();
        let recent = history.entry(identity.to_string()).or_default();
        if recent.len() >= self.settings.history_size {
            recent.pop_front();
        }
        recent.push_back(command.to_string());
    }

    /// Safe commands recently accepted for `identity`, oldest first
    pub fn recent_commands(&self, identity: &str) -> Vec<String> {
        self.history
            .lock()
            .get(identity)
            .map(|recent| recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the literal catalog in insertion order
    pub fn dangerous_commands(&self) -> Vec<String> {
        self.catalog.read().dangerous_commands()
    }

    pub fn rate_limit_status(&self, identity: &str) -> RateLimitStatus {
        self.limiter.status(identity)
    }

    /// Lifts any block on `identity` and resets its windows
    pub fn clear_rate_limit(&self, identity: &str) -> bool {
        self.limiter.clear(identity)
    }

    /// Drops limiter state and history of identities idle longer than `idle`
    pub fn prune_idle(&self, idle: Duration) -> usize {
        let removed = self.limiter.prune_idle(idle);
        if !removed.is_empty() {
            let mut history = self.history.lock();
            for identity in &removed {
                history.remove(identity);
            }
        }
        removed.len()
    }

    pub fn settings(&self) -> &FilterConfig {
        &self.settings
    }

    /// Idle period after which `prune_idle` should forget an identity
    pub fn idle_expiry(&self) -> Duration {
        Duration::minutes(i64::from(self.limiter.settings().idle_expiry_minutes))
    }
}

impl CatalogExtend for CommandFilter {
    fn add_dangerous_command(&self, command: &str) -> bool {
        let added = self.catalog.write().add_dangerous_command(command);
        if added {
            info!(command = command.trim(), "Added dangerous command");
        }
        added
    }

    fn add_dangerous_pattern(&self, pattern: &str) -> Result<bool, FilterError> {
        let regex = Regex::new(pattern)?;
        let added = self.catalog.write().add_dangerous_pattern(regex);
        if added {
            info!(pattern, "Added dangerous pattern");
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests;
