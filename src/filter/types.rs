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

//! Verdict and severity types shared by every detection layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordinal danger rating attached to a verdict
///
/// Ordering follows the declaration order, so `Severity::High > Severity::Low`
/// and detection layers can be compared with `max()`.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Not dangerous
    #[default]
    None,
    /// Policy violation with little destructive potential (strict mode)
    Low,
    /// Suspicious shape (special character floods, multi-step idioms)
    Medium,
    /// Matches the dangerous catalogs
    High,
    /// Privileged destruction, injection bytes, or an active block
    Critical,
}

/// Threat points contributed by one violation of each severity
pub const SEVERITY_POINTS: [(Severity, u32); 5] = [
    (Severity::None, 0),
    (Severity::Low, 1),
    (Severity::Medium, 2),
    (Severity::High, 5),
    (Severity::Critical, 10),
];

/// Points for severities that do not appear in [`SEVERITY_POINTS`]
pub const DEFAULT_SEVERITY_POINTS: u32 = 1;

impl Severity {
    /// Threat score weight of this severity
    pub fn points(self) -> u32 {
        SEVERITY_POINTS
            .iter()
            .find(|(severity, _)| *severity == self)
            .map(|(_, points)| *points)
            .unwrap_or(DEFAULT_SEVERITY_POINTS)
    }

    /// Lowercase wire name (`"none"`, `"low"`, ...)
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parses a severity name, falling back to `Low` for anything unknown
    ///
    /// Unknown names score like `Low` (one point) in the threat ledger.
    pub fn from_str_lossy(name: &str) -> Self {
        name.parse().unwrap_or(Severity::Low)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Severity::None),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Result of classifying one command line
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandVerdict {
    /// Whether the command must be suppressed
    pub is_dangerous: bool,
    /// How dangerous it is
    pub severity: Severity,
    /// Human-readable explanation (empty when safe)
    pub reason: String,
}

impl CommandVerdict {
    /// Verdict for a command that may be forwarded
    pub fn safe() -> Self {
        Self {
            is_dangerous: false,
            severity: Severity::None,
            reason: String::new(),
        }
    }

    /// Verdict for a rejected command
    pub fn dangerous(severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            is_dangerous: true,
            severity,
            reason: reason.into(),
        }
    }
}

impl From<DetectionHit> for CommandVerdict {
    fn from(hit: DetectionHit) -> Self {
        CommandVerdict::dangerous(hit.severity, hit.reason)
    }
}

/// Positive finding of a sub-detector (sequence or encoding)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetectionHit {
    pub severity: Severity,
    pub reason: String,
}

impl DetectionHit {
    pub fn new(severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            severity,
            reason: reason.into(),
        }
    }
}

/// Risk bucket derived from a user's current threat score
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Buckets a score: <5 low, 5-9 medium, 10-19 high, >=20 critical
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 20 => RiskLevel::Critical,
            s if s >= 10 => RiskLevel::High,
            s if s >= 5 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}
