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

//! Dangerous command pattern definitions
//!
//! This module contains the built-in tables used by `PatternCatalog`.
//! Literal entries are matched as lowercase substrings, regex entries run
//! against the lowercased and trimmed command line.

use regex::Regex;

/// Builds the regex catalog (checked before literals)
///
/// # Categories
/// - **rm variants**: deletion rooted at `/`, `/*`, `~/` or `$HOME`
/// - **Disk writes**: `dd` from zero/random sources, redirects to block devices
/// - **Ownership**: `chmod 777 /`, `chown ... /`
/// - **Resource exhaustion**: fork bomb, unbounded loops
/// - **Remote execution**: download piped into a shell
/// - **System files**: writes, moves and copies onto passwd/shadow/hosts
/// - **Process control**: killing init, forced kills
/// - **sudo**: privileged deletion, disk and power commands
pub fn build_dangerous_patterns() -> Vec<Regex> {
    [
        // rm rooted at /, /*, ~/ and $HOME
        r"rm\s+(-[rf]+\s+)?/",
        r"rm\s+(-[rf]+\s+)?/\*",
        r"rm\s+(-[rf]+\s+)?~/",
        r"rm\s+(-[rf]+\s+)?\$home",
        r"rm\s+-[rf]*r[rf]*\s+/",
        r"rm\s+-[rf]*f[rf]*\s+/",
        r"rm\s+--recursive\s+/",
        r"rm\s+--force\s+/",
        // rm on every entry of the working directory
        r"rm\s+-rf\s*\*",
        r"rm\s+-fr\s*\*",
        r"rm\s+-r\s+-f\s*\*",
        r"rm\s+-f\s+-r\s*\*",
        // Arbitrary flag clusters
        r"rm\s+(-[a-z]*[rf][a-z]*\s+)+/",
        r"rm\s+(-[a-z]*[rf][a-z]*\s+)+\*",
        r"rm\s+(-[a-z]*[rf][a-z]*\s+)+~/",
        // Raw device writes
        r"dd\s+if=/dev/(zero|random|urandom)\s+of=",
        r">\s*/dev/(sd[a-z]|hd[a-z]|nvme[0-9])",
        // Root ownership and permissions
        r"chmod\s+777\s+/",
        r"chown\s+.*\s+/",
        // Fork bomb and unbounded loops
        r":\(\)\{\s*:\|:&\s*\};:",
        r"while\s+true.*do.*done",
        r"for\s*\(\(\s*;\s*;\s*\)\)",
        // Download piped into a shell
        r"curl.*\|\s*(sh|bash)",
        r"wget.*\|\s*(sh|bash)",
        // System file tampering
        r"echo.*>\s*/etc/(passwd|shadow|hosts|fstab)",
        r"mv\s+/etc/(passwd|shadow|hosts)",
        r"cp\s+.*\s+/etc/(passwd|shadow|hosts)",
        // Process control
        r"kill\s+-9\s+1",
        r"pkill\s+-9\s+",
        r"killall\s+-9",
        // Privileged destruction
        r"sudo\s+rm\s+(-[a-z]*[rf][a-z]*\s+)+",
        r"sudo\s+dd",
        r"sudo\s+mkfs",
        r"sudo\s+fdisk",
        r"sudo\s+shutdown",
        r"sudo\s+reboot",
        r"sudo\s+halt",
        r"sudo\s+poweroff",
        // rm touching the root directory in looser spellings
        r"\brm\b.*-.*r.*\s+/[^a-zA-Z0-9]",
        r"\brm\b.*-.*f.*\s+/[^a-zA-Z0-9]",
        r"\brm\b.*\s+/\s*$",
        r"\brm\b.*\s+/\*\s*$",
    ]
    .into_iter()
    .map(|pattern| {
        Regex::new(pattern).expect("built-in dangerous pattern should be valid regex")
    })
    .collect()
}

/// Builds the ordered literal catalog
///
/// Entries are matched as case-insensitive substrings. Order matters only for
/// reporting: the first entry found is the one logged.
pub fn build_dangerous_commands() -> Vec<String> {
    vec![
        // Deletion
        "rm -rf",
        "rm -r",
        "rm -f",
        "rmdir",
        "del /s",
        "del /q",
        "rd /s",
        // Shutdown and restart
        "shutdown",
        "reboot",
        "halt",
        "poweroff",
        "init 0",
        "init 6",
        // Disk formatting
        "mkfs",
        "format",
        "fdisk",
        "parted",
        // System file ownership
        "chmod 777 /",
        "chown root /",
        "passwd root",
        // Disk destruction and fork bombs
        "dd if=/dev/zero",
        "dd if=/dev/random",
        "fork bomb",
        ":(){ :|:& };:",
        // Killing critical processes
        "kill -9 1",
        "killall -9",
        "pkill -9",
        // Truncating critical files
        "echo > /etc/passwd",
        "echo > /etc/shadow",
        "echo > /etc/hosts",
        // Download and execute
        "curl | sh",
        "wget | sh",
        "curl | bash",
        "wget | bash",
        // Environment sabotage
        "export path=",
        "unset path",
        // Redirects onto block devices
        "> /dev/sda",
        "> /dev/hda",
        "> /dev/nvme",
        // Service control
        "systemctl stop",
        "systemctl disable",
        "service stop",
        // Package removal
        "apt-get remove --purge",
        "yum remove",
        "dnf remove",
        "pacman -r",
        // Compiler bombs
        "gcc -o /dev/null",
        "g++ -o /dev/null",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Builds the literal catalog checked against the remainder of `sudo ...`
///
/// The first group repeats general catalog entries in their privileged
/// form. The second group is only dangerous with root rights.
pub fn build_sudo_dangerous_commands() -> Vec<String> {
    vec![
        "rm -rf /",
        "dd if=/dev/zero of=/dev/sda",
        "mkfs.ext4 /dev/sda",
        "fdisk /dev/sda",
        "shutdown -h now",
        "reboot",
        "halt",
        "poweroff",
        // Account and firewall tampering
        "userdel",
        "usermod",
        "visudo",
        "chattr",
        "iptables -f",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Builds the safe-command allow-list
///
/// Only consulted in strict mode, where anything whose first word is not
/// listed here is refused.
///
/// # Categories
/// - **Navigation**: ls, cd, pwd, tree
/// - **Reading**: cat, less, head, tail, grep
/// - **System info**: ps, top, df, free, uname
/// - **Editing**: nano, vim, touch, mkdir
///
/// Interpreters (python, node, perl) stay off the list since they can run
/// arbitrary code via arguments.
pub fn build_safe_commands() -> Vec<String> {
    vec![
        // Navigation
        "ls", "cd", "pwd", "tree", // Reading
        "cat", "less", "more", "head", "tail", "grep", "wc", "sort", "uniq", "diff",
        // System info
        "ps", "top", "htop", "df", "du", "free", "uptime", "uname", "whoami", "id",
        "hostname", "date", "env", "which", "history", // Output
        "echo", "printf", "clear", "man", // Editing
        "nano", "vim", "vi", "touch", "mkdir", "cp", "mv", "git",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Builds the multi-step idiom patterns used by the sequence detector
///
/// Each entry pairs a regex with the label reported when it matches. They run
/// against the whole (lowercased) line after no single segment matched.
pub fn build_sequence_idioms() -> Vec<(Regex, &'static str)> {
    [
        // echo ... > script; chmod +x script
        (
            r"echo\s+.*>\s*\S+.*(;|&&)\s*chmod\s+\+x",
            "script creation followed by chmod +x",
        ),
        // wget/curl ...; chmod +x ...
        (
            r"(wget|curl)\s+.*(;|&&)\s*chmod\s+\+x",
            "download followed by chmod +x",
        ),
        // mkdir x; cd x; rm ...
        (
            r"mkdir\s+.*(;|&&)\s*cd\s+.*(;|&&)\s*rm\s+",
            "mkdir, cd and rm chain",
        ),
        // touch f; echo ... > f
        (
            r"touch\s+.*(;|&&)\s*echo\s+.*>",
            "touch followed by echo redirect",
        ),
    ]
    .into_iter()
    .map(|(pattern, label)| {
        (
            Regex::new(pattern).expect("built-in sequence idiom should be valid regex"),
            label,
        )
    })
    .collect()
}
