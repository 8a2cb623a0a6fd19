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

//! Pattern catalog with add-only extension
//!
//! Holds the four tables from [`patterns`](super::patterns) and answers the
//! containment questions the classifier and its sub-detectors ask. The
//! catalog only grows: entries can be added at runtime, never removed.

use regex::Regex;
use std::sync::LazyLock;

use super::patterns;

/// `rm` with at most an `-f` style flag cluster and relative targets only
static SAFE_RM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^rm\s+(-[a-z]*f[a-z]*\s+)?[^/~$][^\s]*(\s+[^/~$][^\s]*)*$")
        .expect("safe rm pattern should be valid regex")
});

/// The literal that the safe-rm carve-out exempts
const CARVED_OUT_LITERAL: &str = "rm -f";

/// Dangerous literals, regexes, sudo literals and the safe allow-list
#[derive(Clone, Debug)]
pub struct PatternCatalog {
    patterns: Vec<Regex>,
    literals: Vec<String>,
    sudo_literals: Vec<String>,
    safe_commands: Vec<String>,
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self {
            patterns: patterns::build_dangerous_patterns(),
            literals: patterns::build_dangerous_commands(),
            sudo_literals: patterns::build_sudo_dangerous_commands(),
            safe_commands: patterns::build_safe_commands(),
        }
    }
}

impl PatternCatalog {
    /// Creates a catalog loaded with the built-in tables
    pub fn new() -> Self {
        Self::default()
    }

    /// First regex matching the normalized command
    pub fn matching_pattern(&self, normalized: &str) -> Option<&Regex> {
        self.patterns.iter().find(|pattern| pattern.is_match(normalized))
    }

    /// First literal contained in the normalized command
    ///
    /// `rm -f` is skipped when the command is a plain `rm` on relative paths,
    /// so `rm -f build.log` passes while `rm -f /etc/passwd` does not.
    pub fn matching_literal(&self, normalized: &str) -> Option<&str> {
        let safe_rm = is_safe_rm(normalized);

        self.literals
            .iter()
            .filter(|literal| !(safe_rm && literal.as_str() == CARVED_OUT_LITERAL))
            .find(|literal| normalized.contains(literal.as_str()))
            .map(String::as_str)
    }

    /// First sudo literal contained in the remainder of a `sudo ` command
    pub fn matching_sudo(&self, normalized: &str) -> Option<&str> {
        let remainder = normalized.strip_prefix("sudo ")?;

        self.sudo_literals
            .iter()
            .find(|literal| remainder.contains(literal.as_str()))
            .map(String::as_str)
    }

    /// Whether any dangerous table (regex, literal or sudo) matches
    pub fn is_catalog_match(&self, normalized: &str) -> bool {
        self.matching_pattern(normalized).is_some()
            || self.matching_literal(normalized).is_some()
            || self.matching_sudo(normalized).is_some()
    }

    /// Whether a command name is on the safe allow-list
    pub fn is_safe_command(&self, name: &str) -> bool {
        self.safe_commands.iter().any(|safe| safe == name)
    }

    /// Appends a literal; returns `false` for blanks and duplicates
    pub fn add_dangerous_command(&mut self, command: &str) -> bool {
        let literal = command.trim().to_lowercase();
        if literal.is_empty() || self.literals.contains(&literal) {
            return false;
        }
        self.literals.push(literal);
        true
    }

    /// Appends a regex; returns `false` if the same source is already present
    pub fn add_dangerous_pattern(&mut self, pattern: Regex) -> bool {
        if self
            .patterns
            .iter()
            .any(|existing| existing.as_str() == pattern.as_str())
        {
            return false;
        }
        self.patterns.push(pattern);
        true
    }

    /// Copy of the literal catalog in insertion order
    pub fn dangerous_commands(&self) -> Vec<String> {
        self.literals.clone()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

/// `rm` invocation limited to `-f` class flags and relative targets
pub fn is_safe_rm(normalized: &str) -> bool {
    SAFE_RM.is_match(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_rm_shape() {
        assert!(is_safe_rm("rm -f build.log"));
        assert!(is_safe_rm("rm notes.txt old.txt"));
        assert!(!is_safe_rm("rm -f /etc/passwd"));
        assert!(!is_safe_rm("rm -f ~/.bashrc"));
        assert!(!is_safe_rm("rm -f $home/x"));
        assert!(!is_safe_rm("ls -la"));
    }

    #[test]
    fn test_literal_carve_out_only_exempts_rm_f() {
        let catalog = PatternCatalog::new();

        assert_eq!(catalog.matching_literal("rm -f build.log"), None);
        assert_eq!(catalog.matching_literal("rm -f /tmp/x"), Some("rm -f"));
        assert_eq!(catalog.matching_literal("rm -rf build"), Some("rm -rf"));
    }

    #[test]
    fn test_sudo_literals_need_sudo_prefix() {
        let catalog = PatternCatalog::new();

        assert_eq!(catalog.matching_sudo("sudo reboot"), Some("reboot"));
        assert_eq!(catalog.matching_sudo("reboot"), None);
        assert_eq!(catalog.matching_sudo("sudo ls"), None);
    }

    #[test]
    fn test_catalog_grows_without_duplicates() {
        let mut catalog = PatternCatalog::new();
        let before = catalog.dangerous_commands().len();

        assert!(catalog.add_dangerous_command("  Nsenter "));
        assert!(!catalog.add_dangerous_command("nsenter"));
        assert!(!catalog.add_dangerous_command("   "));
        assert_eq!(catalog.dangerous_commands().len(), before + 1);
        assert_eq!(
            catalog.matching_literal("nsenter --target 1"),
            Some("nsenter")
        );

        let patterns = catalog.pattern_count();
        assert!(catalog.add_dangerous_pattern(Regex::new(r"nc\s+-e").unwrap()));
        assert!(!catalog.add_dangerous_pattern(Regex::new(r"nc\s+-e").unwrap()));
        assert_eq!(catalog.pattern_count(), patterns + 1);
    }
}
