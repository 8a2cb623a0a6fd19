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

//! Encoding bypass detection
//!
//! Attackers hide catalog commands behind encodings the shell will undo:
//!
//! ```bash
//! echo cm0gLXJmIC8gLS1uby1wcmVzZXJ2ZS1yb290 | base64 -d | sh
//! printf "\x72\x6d\x20\x2d\x72\x66\x20\x2f" | sh
//! ```
//!
//! Each sub-check decodes the payload once and looks for a dangerous
//! literal in the result. Decode failures mean "no bypass found"; they are
//! never reported.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use regex::Regex;
use tracing::debug;

use super::catalog::PatternCatalog;
use super::escapes::{decode_hex_escapes, decode_unicode_escapes};
use super::types::{DetectionHit, Severity};

/// Shortest base64 run worth decoding
const MIN_BASE64_RUN: usize = 20;

/// Standard alphabet, padding optional, trailing bits tolerated
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Detects base64, hex and unicode escaped payloads
#[derive(Debug)]
pub struct EncodingDetector {
    base64_run: Regex,
}

impl Default for EncodingDetector {
    fn default() -> Self {
        Self {
            base64_run: Regex::new(&format!("[A-Za-z0-9+/=]{{{MIN_BASE64_RUN},}}"))
                .expect("base64 run pattern should be valid regex"),
        }
    }
}

impl EncodingDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the three sub-checks in order and reports the first hit
    ///
    /// `command` must keep its original case (trimmed is fine): base64 is
    /// case-sensitive, so lowercasing before decoding would destroy it.
    pub fn check(&self, command: &str, catalog: &PatternCatalog) -> Option<DetectionHit> {
        self.check_base64(command, catalog)
            .or_else(|| check_escaped(command, "hex", decode_hex_escapes, catalog))
            .or_else(|| check_escaped(command, "unicode", decode_unicode_escapes, catalog))
    }

    /// Decodes runs of 20+ base64 characters when the line mentions `base64`
    fn check_base64(&self, command: &str, catalog: &PatternCatalog) -> Option<DetectionHit> {
        if !command.to_lowercase().contains("base64") {
            return None;
        }

        self.base64_run.find_iter(command).find_map(|run| {
            let bytes = match LENIENT_BASE64.decode(run.as_str().trim_end_matches('=')) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(run = run.as_str(), error = %e, "base64 run did not decode");
                    return None;
                }
            };
            let decoded = String::from_utf8_lossy(&bytes).to_lowercase();

            catalog.matching_literal(&decoded).map(|literal| {
                DetectionHit::new(
                    Severity::High,
                    format!("base64 payload decodes to dangerous command '{literal}'"),
                )
            })
        })
    }
}

/// Shared shape of the hex and unicode sub-checks
fn check_escaped(
    command: &str,
    encoding: &str,
    decode: fn(&str) -> Option<String>,
    catalog: &PatternCatalog,
) -> Option<DetectionHit> {
    let decoded = decode(command)?.to_lowercase();

    catalog.matching_literal(decoded.trim()).map(|literal| {
        DetectionHit::new(
            Severity::High,
            format!("{encoding} escaped payload decodes to dangerous command '{literal}'"),
        )
    })
}
