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

//! Security configuration
//!
//! All thresholds of the pipeline live in one TOML file. Every section and
//! every key is optional; missing values fall back to the defaults below.
//!
//! ```toml
//! [filter]
//! strict_mode = true
//!
//! [rate_limit]
//! max_commands_per_minute = 120
//!
//! [threat]
//! log_file = "/var/log/shellwarden/security.log"
//!
//! [bans]
//! data_file = "~/.local/share/shellwarden/ip-bans.json"
//! ```
//!
//! # Example
//!
//! ```
//! use shellwarden::config::SecurityConfig;
//!
//! let config: SecurityConfig = toml::from_str("[bans]\nmax_violations = 5\n")?;
//! assert_eq!(config.bans.max_violations, 5);
//! assert_eq!(config.bans.ban_duration_hours, 24);
//! config.validate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod error;

pub use error::{ConfigError, StoreError};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SHELLWARDEN_CONFIG";

/// Config location used when neither a flag nor the env var is given
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/shellwarden/config.toml";

/// Root of the configuration file
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub filter: FilterConfig,
    pub rate_limit: RateLimitConfig,
    pub threat: ThreatConfig,
    pub bans: BanConfig,
    pub notifications: NotificationConfig,
    pub sweeper: SweeperConfig,
}

/// `[filter]`: classifier limits and optional layers
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Longest accepted command line, in characters
    pub max_command_length: usize,
    /// Most shell metacharacters tolerated in one line
    pub max_special_chars: usize,
    /// Safe commands remembered per identity
    pub history_size: usize,
    /// Refuse anything whose first word is not on the safe allow-list
    pub strict_mode: bool,
    pub enable_encoding_detection: bool,
    pub enable_sequence_detection: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_command_length: 1000,
            max_special_chars: 10,
            history_size: 10,
            strict_mode: false,
            enable_encoding_detection: true,
            enable_sequence_detection: true,
        }
    }
}

/// `[rate_limit]`: per-identity sliding windows
///
/// `enable_progressive_blocking` and `progressive_blocking_multiplier` are
/// accepted and validated but not applied: every block lasts exactly
/// `block_duration_minutes`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_commands_per_minute: usize,
    pub max_dangerous_attempts_per_minute: usize,
    pub block_duration_minutes: u32,
    pub enable_progressive_blocking: bool,
    pub progressive_blocking_multiplier: u32,
    /// Limiter state untouched for this long is dropped by the sweeper
    pub idle_expiry_minutes: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_commands_per_minute: 60,
            max_dangerous_attempts_per_minute: 3,
            block_duration_minutes: 5,
            enable_progressive_blocking: true,
            progressive_blocking_multiplier: 2,
            idle_expiry_minutes: 60,
        }
    }
}

/// `[threat]`: per-user score and auto-block
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ThreatConfig {
    /// Violations inside the auto-block window that block a user
    pub auto_block_threshold: usize,
    pub auto_block_window_minutes: u32,
    /// Violations older than this no longer count toward the score
    pub score_decay_hours: u32,
    /// Records idle longer than this are dropped by cleanup
    pub retention_days: u32,
    /// Capacity of the in-memory security event log
    pub max_event_log: usize,
    /// JSON-lines security log (`~` is expanded, empty disables it)
    pub log_file: String,
    /// Archive the log file once it has covered this many hours
    pub log_rotation_hours: u32,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            auto_block_threshold: 3,
            auto_block_window_minutes: 5,
            score_decay_hours: 24,
            retention_days: 7,
            max_event_log: 1000,
            log_file: "./logs/security.log".to_string(),
            log_rotation_hours: 24,
        }
    }
}

impl ThreatConfig {
    /// Security log path with `~` expanded; `None` when file logging is off
    pub fn log_path(&self) -> Option<PathBuf> {
        let file = self.log_file.trim();
        (!file.is_empty()).then(|| PathBuf::from(shellexpand::tilde(file).into_owned()))
    }
}

/// `[bans]`: per-address violations and bans
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct BanConfig {
    /// Violations within 24 hours that trigger a ban
    pub max_violations: usize,
    pub ban_duration_hours: u32,
    /// Cumulative ban count at which bans become permanent
    pub permanent_ban_threshold: u32,
    /// Ledger snapshot location (`~` is expanded)
    pub data_file: String,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            max_violations: 3,
            ban_duration_hours: 24,
            permanent_ban_threshold: 3,
            data_file: "./data/ip-bans.json".to_string(),
        }
    }
}

impl BanConfig {
    /// Ledger path with `~` expanded
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_file).into_owned())
    }
}

/// `[notifications]`: security alerts shown to other sessions
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub broadcast_security_events: bool,
    /// Alert command text is cut to this many characters
    pub alert_command_max_chars: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            broadcast_security_events: true,
            alert_command_max_chars: 50,
        }
    }
}

/// `[sweeper]`: periodic cleanup
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_minutes: u32,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
        }
    }
}

impl SecurityConfig {
    /// Picks the config file: explicit path, then `SHELLWARDEN_CONFIG`, then
    /// `~/.config/shellwarden/config.toml`
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        let raw = env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        PathBuf::from(shellexpand::tilde(&raw).into_owned())
    }

    /// Reads, parses and validates a config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the file does not exist,
    /// `ConfigError::Parse` for malformed TOML and `ConfigError::Invalid`
    /// when values are out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)?;
        let config: SecurityConfig = toml::from_str(&contents)?;
        config.validate()?;

        info!(path = %path.display(), "Loaded security configuration");
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Checks that every count, window and duration is positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, bool); 15] = [
            (
                "filter.max_command_length",
                self.filter.max_command_length > 0,
            ),
            ("filter.history_size", self.filter.history_size > 0),
            (
                "rate_limit.max_commands_per_minute",
                self.rate_limit.max_commands_per_minute > 0,
            ),
            (
                "rate_limit.max_dangerous_attempts_per_minute",
                self.rate_limit.max_dangerous_attempts_per_minute > 0,
            ),
            (
                "rate_limit.block_duration_minutes",
                self.rate_limit.block_duration_minutes > 0,
            ),
            (
                "rate_limit.progressive_blocking_multiplier",
                self.rate_limit.progressive_blocking_multiplier > 0,
            ),
            (
                "rate_limit.idle_expiry_minutes",
                self.rate_limit.idle_expiry_minutes > 0,
            ),
            (
                "threat.auto_block_threshold",
                self.threat.auto_block_threshold > 0,
            ),
            (
                "threat.auto_block_window_minutes",
                self.threat.auto_block_window_minutes > 0,
            ),
            (
                "threat.score_decay_hours",
                self.threat.score_decay_hours > 0,
            ),
            ("threat.retention_days", self.threat.retention_days > 0),
            (
                "threat.log_rotation_hours",
                self.threat.log_rotation_hours > 0,
            ),
            ("bans.max_violations", self.bans.max_violations > 0),
            ("bans.ban_duration_hours", self.bans.ban_duration_hours > 0),
            (
                "bans.permanent_ban_threshold",
                self.bans.permanent_ban_threshold > 0,
            ),
        ];

        let mut problems: Vec<String> = checks
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(key, _)| format!("{key} must be positive"))
            .collect();

        if self.threat.max_event_log == 0 {
            problems.push("threat.max_event_log must be positive".to_string());
        }
        if self.sweeper.interval_minutes == 0 {
            problems.push("sweeper.interval_minutes must be positive".to_string());
        }
        if self.bans.data_file.trim().is_empty() {
            problems.push("bans.data_file must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = SecurityConfig::default();

        assert_eq!(config.filter.max_command_length, 1000);
        assert_eq!(config.filter.max_special_chars, 10);
        assert_eq!(config.rate_limit.max_commands_per_minute, 60);
        assert_eq!(config.rate_limit.max_dangerous_attempts_per_minute, 3);
        assert_eq!(config.rate_limit.block_duration_minutes, 5);
        assert_eq!(config.threat.auto_block_threshold, 3);
        assert_eq!(config.bans.max_violations, 3);
        assert_eq!(config.bans.ban_duration_hours, 24);
        assert_eq!(config.bans.permanent_ban_threshold, 3);
        assert!(config.validate().is_ok(), "Defaults should validate");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[filter]\nstrict_mode = true\n\n[bans]\nban_duration_hours = 48\n",
        )
        .unwrap();

        let config = SecurityConfig::load(&path).unwrap();

        assert!(config.filter.strict_mode);
        assert_eq!(config.filter.history_size, 10);
        assert_eq!(config.bans.ban_duration_hours, 48);
        assert_eq!(config.rate_limit, RateLimitConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");

        assert!(matches!(
            SecurityConfig::load(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert_eq!(
            SecurityConfig::load_or_default(&path).unwrap(),
            SecurityConfig::default()
        );
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[bans\nmax_violations = ").unwrap();

        assert!(matches!(
            SecurityConfig::load_or_default(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_lists_every_problem() {
        let mut config = SecurityConfig::default();
        config.rate_limit.max_commands_per_minute = 0;
        config.bans.max_violations = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("rate_limit.max_commands_per_minute"), "{err}");
        assert!(err.contains("bans.max_violations"), "{err}");
    }

    #[test]
    fn test_empty_log_file_disables_security_log() {
        let config: SecurityConfig = toml::from_str("[threat]\nlog_file = \"\"\n").unwrap();
        assert_eq!(config.threat.log_path(), None);
        assert!(config.validate().is_ok());

        let defaults = ThreatConfig::default();
        assert_eq!(
            defaults.log_path(),
            Some(PathBuf::from("./logs/security.log"))
        );
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = SecurityConfig::resolve_path(Some(Path::new("/etc/shellwarden.toml")));
        assert_eq!(path, PathBuf::from("/etc/shellwarden.toml"));
    }
}
