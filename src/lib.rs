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

//! Shellwarden
//!
//! Command-risk classification and abuse escalation for shared web
//! terminals. Every line a user types is screened before it reaches the
//! shell; repeat offenders are scored, blocked and finally banned by
//! source address.
//!
//! # Features
//!
//! - **Command Filter:** Pattern, literal, sequence and encoded-payload detection
//! - **Rate Limiting:** Per-identity sliding windows with temporary blocks
//! - **Threat Scoring:** Severity-weighted scores and automatic user blocks
//! - **Address Bans:** Violation ledger with escalating and permanent bans
//! - **Persistence:** Ban ledger written atomically as JSON
//!
//! # Architecture
//!
//! - **`filter`:** Classification pipeline and the dangerous-pattern catalog
//! - **`limiter`:** Command and dangerous-attempt windows per identity
//! - **`monitor`:** Threat scores, security event log and user blocks
//! - **`bans`:** Address violations, bans, whitelist and the JSON store
//! - **`guard`:** Session-facing wiring of the above into one decision
//! - **`events`:** Fan-out of ban and block notifications
//! - **`sweeper`:** Background cleanup thread
//! - **`config`:** TOML configuration with defaults
//!
//! # Examples
//!
//! ## Classifying a command
//!
//! ```
//! use shellwarden::{CommandFilter, SecurityConfig, Severity};
//! use shellwarden::clock::SystemClock;
//! use std::sync::Arc;
//!
//! let config = SecurityConfig::default();
//! let filter = CommandFilter::new(config.filter, config.rate_limit, Arc::new(SystemClock));
//!
//! let verdict = filter.classify("rm -rf /", Some("alice"));
//! assert!(verdict.is_dangerous);
//! assert_eq!(verdict.severity, Severity::High);
//!
//! assert!(!filter.classify("ls -la", Some("alice")).is_dangerous);
//! ```
//!
//! ## Screening a session
//!
//! ```no_run
//! use shellwarden::guard::{InputOutcome, SessionContext};
//! use shellwarden::clock::SystemClock;
//! use shellwarden::{EventBus, SecurityConfig, SecurityGuard};
//! use std::sync::Arc;
//!
//! let config = SecurityConfig::load_or_default(&SecurityConfig::resolve_path(None))?;
//! let guard = SecurityGuard::new(&config, Arc::new(SystemClock), EventBus::new());
//!
//! let session = SessionContext::new("term-1", "u-42", "alice").with_address("203.0.113.9");
//! if let InputOutcome::Rejected(rejection) = guard.screen(&session, "sudo rm -rf /\n") {
//!     println!("{}", rejection.verdict.reason);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bans;
pub mod clock;
pub mod config;
pub mod events;
pub mod filter;
pub mod guard;
pub mod limiter;
pub mod monitor;
pub mod sweeper;

// Re-export commonly used types for convenience
pub use bans::BanLedger;
pub use config::SecurityConfig;
pub use events::{EventBus, SecurityEvent};
pub use filter::{CommandFilter, CommandVerdict, Severity};
pub use guard::SecurityGuard;
pub use monitor::ThreatMonitor;
