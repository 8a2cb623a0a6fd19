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

//! Terminal text for rejected commands and redacted alert fields

use std::net::IpAddr;

use crate::filter::CommandVerdict;

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Warning written back to the session that typed a rejected command
///
/// Colours are raw ANSI escapes for the remote terminal.
pub fn warning(command: &str, verdict: &CommandVerdict) -> String {
    let mut text = format!("\r\n{RED}blocked: command \"{command}\" was not executed{RESET}\r\n");
    if !verdict.reason.is_empty() {
        text.push_str(&format!(
            "{YELLOW}reason: {} (severity: {}){RESET}\r\n",
            verdict.reason, verdict.severity
        ));
    }
    text.push_str(&format!(
        "{CYAN}hint: this shared terminal refuses commands that could harm the host{RESET}\r\n"
    ));
    text
}

/// Masks the host part of an address for broadcast alerts
///
/// IPv4 keeps two octets, IPv6 two groups, anything else three characters.
///
/// ```
/// use shellwarden::guard::render::redact_address;
///
/// assert_eq!(redact_address("203.0.113.42"), "203.0.*.*");
/// assert_eq!(redact_address("2001:db8::1"), "2001:db8:*");
/// assert_eq!(redact_address("localhost"), "loc*");
/// ```
pub fn redact_address(address: &str) -> String {
    match address.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, _, _] = v4.octets();
            format!("{a}.{b}.*.*")
        }
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => redact_address(&v4.to_string()),
            None => {
                let segments = v6.segments();
                format!("{:x}:{:x}:*", segments[0], segments[1])
            }
        },
        Err(_) => {
            let prefix: String = address.trim().chars().take(3).collect();
            format!("{prefix}*")
        }
    }
}

/// Cuts a command to `max` characters, marking the cut with `...`
pub fn truncate_command(command: &str, max: usize) -> String {
    if command.chars().count() <= max {
        return command.to_string();
    }
    let mut cut: String = command.chars().take(max).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Severity;

    #[test]
    fn test_warning_carries_reason_and_severity() {
        let verdict = CommandVerdict::dangerous(Severity::High, "may destroy disk data");
        let text = warning("dd if=/dev/zero of=/dev/sda", &verdict);

        assert!(text.contains("\"dd if=/dev/zero of=/dev/sda\""));
        assert!(text.contains("reason: may destroy disk data (severity: high)"));
        assert!(text.starts_with("\r\n"));
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn test_redaction() {
        assert_eq!(redact_address("10.1.2.3"), "10.1.*.*");
        assert_eq!(redact_address("::ffff:192.0.2.7"), "192.0.*.*");
        assert_eq!(redact_address("fe80::1"), "fe80:0:*");
        assert_eq!(redact_address("ab"), "ab*");
    }

    #[test]
    fn test_truncation_counts_characters() {
        assert_eq!(truncate_command("ls", 50), "ls");
        assert_eq!(truncate_command("abcdef", 3), "abc...");
        assert_eq!(truncate_command("ééééé", 2), "éé...");
    }
}
