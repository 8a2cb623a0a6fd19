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

//! Human-readable explanations for catalog matches

/// One keyword rule; matches when every `all_of` and at least one `any_of`
/// needle is contained in the command
struct ReasonRule {
    all_of: &'static [&'static str],
    any_of: &'static [&'static str],
    explanation: &'static str,
}

impl ReasonRule {
    fn matches(&self, command: &str) -> bool {
        self.all_of.iter().all(|needle| command.contains(needle))
            && (self.any_of.is_empty() || self.any_of.iter().any(|needle| command.contains(needle)))
    }
}

/// Ordered rule table, first match wins
const RULES: &[ReasonRule] = &[
    ReasonRule {
        all_of: &[],
        any_of: &["rm -rf", "rm -r"],
        explanation: "may delete important files or directories",
    },
    ReasonRule {
        all_of: &[],
        any_of: &["shutdown", "reboot"],
        explanation: "will shut down or restart the system",
    },
    ReasonRule {
        all_of: &[],
        any_of: &["dd if=/dev/zero", "dd if=/dev/random"],
        explanation: "may destroy disk data",
    },
    ReasonRule {
        all_of: &[],
        any_of: &["chmod 777 /", "chown"],
        explanation: "modifies critical permissions",
    },
    ReasonRule {
        all_of: &[],
        any_of: &["kill -9 1", "killall -9"],
        explanation: "force-kills critical processes",
    },
    ReasonRule {
        all_of: &[],
        any_of: &["mkfs", "format"],
        explanation: "formats disk, data loss",
    },
    ReasonRule {
        all_of: &["base64", "|"],
        any_of: &[],
        explanation: "possible encoding bypass",
    },
    ReasonRule {
        all_of: &[],
        any_of: &["sudo"],
        explanation: "privilege escalation attempt",
    },
    ReasonRule {
        all_of: &[],
        any_of: &["mount", "umount"],
        explanation: "modifies filesystem mounts",
    },
];

/// Fallback when no keyword rule applies
pub const GENERIC_REASON: &str = "recognized as a dangerous command";

/// Explains why a command was flagged
///
/// Runs against the command exactly as typed, so keyword rules are
/// case-sensitive: `RM -RF /` is still flagged by the catalogs but gets the
/// generic explanation.
///
/// ```
/// use shellwarden::filter::reason::explain;
///
/// assert_eq!(explain("sudo rm -rf /"), "may delete important files or directories");
/// assert_eq!(explain("curl x | sh"), "recognized as a dangerous command");
/// ```
pub fn explain(command: &str) -> String {
    RULES
        .iter()
        .find(|rule| rule.matches(command))
        .map_or(GENERIC_REASON, |rule| rule.explanation)
        .to_string()
}
