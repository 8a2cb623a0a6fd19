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

//! Compound command screening
//!
//! Splits a line on shell separators and checks each part against the
//! literal catalog, then falls back to a short list of multi-step idioms.
//! The splitter treats `&&`, `||`, `|`, `&` and `;` alike; a pipeline whose
//! danger only emerges from the combination is caught only if it matches
//! one of the idioms.

use regex::Regex;

use super::catalog::PatternCatalog;
use super::patterns;
use super::types::{DetectionHit, Severity};

/// Detects dangerous segments and multi-step idioms in compound commands
#[derive(Debug)]
pub struct SequenceDetector {
    separators: Regex,
    idioms: Vec<(Regex, &'static str)>,
}

impl Default for SequenceDetector {
    fn default() -> Self {
        Self {
            separators: Regex::new(r"[;&|]+").expect("separator pattern should be valid regex"),
            idioms: patterns::build_sequence_idioms(),
        }
    }
}

impl SequenceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks a normalized (lowercased, trimmed) command line
    ///
    /// Lines without a separator are skipped entirely.
    pub fn check(&self, normalized: &str, catalog: &PatternCatalog) -> Option<DetectionHit> {
        if !normalized.contains([';', '&', '|']) {
            return None;
        }

        let dangerous_part = self
            .segments(normalized)
            .into_iter()
            .any(|part| catalog.matching_literal(part).is_some());

        if dangerous_part {
            return Some(DetectionHit::new(
                Severity::High,
                "dangerous command sequence",
            ));
        }

        self.idioms
            .iter()
            .find(|(idiom, _)| idiom.is_match(normalized))
            .map(|(_, label)| {
                DetectionHit::new(
                    Severity::Medium,
                    format!("suspicious command sequence: {label}"),
                )
            })
    }

    /// Trimmed non-empty parts between separators
    pub fn segments<'a>(&self, normalized: &'a str) -> Vec<&'a str> {
        self.separators
            .split(normalized)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect()
    }
}
