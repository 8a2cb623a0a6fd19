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

//! CLI entry point for shellwarden
//!
//! Classifies single commands, gates a stream of terminal input,
//! administers the address ban ledger and reads back the security log.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use shellwarden::bans::{BanLedger, BanRecord};
use shellwarden::clock::{Clock, SystemClock};
use shellwarden::events::SecurityEvent;
use shellwarden::guard::{Admission, InputOutcome, SessionContext};
use shellwarden::monitor::ThreatMonitor;
use shellwarden::{CommandFilter, EventBus, SecurityConfig, SecurityGuard, Severity};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shellwarden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the ban ledger location
    #[arg(long, global = true)]
    data_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a single command line
    Check {
        /// Identity used for rate limiting
        #[arg(short, long)]
        identity: Option<String>,

        /// Command to classify
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Screen terminal input read from stdin, forwarding safe lines to stdout
    Gate {
        /// Owner id of the session
        #[arg(short, long)]
        identity: String,

        /// Source address of the session
        #[arg(short, long, value_parser = parse_address)]
        address: Option<String>,

        /// Display name of the owner (defaults to the identity)
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Inspect and administer address bans
    Bans {
        #[command(subcommand)]
        action: BanAction,
    },

    /// Summarize the persisted security log
    Events {
        /// Number of recent entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum BanAction {
    /// Show ledger-wide counts
    Stats,
    /// List every stored ban
    List,
    /// Show everything known about one address
    Show {
        #[arg(value_parser = parse_address)]
        address: String,
    },
    /// Ban an address manually
    Ban {
        #[arg(value_parser = parse_address)]
        address: String,
        #[arg(short, long, default_value = "manual ban")]
        reason: String,
        #[arg(short, long)]
        permanent: bool,
    },
    /// Lift a ban
    Unban {
        #[arg(value_parser = parse_address)]
        address: String,
    },
    /// Exempt an address from bans
    Whitelist {
        #[arg(value_parser = parse_address)]
        address: String,
    },
    /// Remove an address from the whitelist
    Unwhitelist {
        #[arg(value_parser = parse_address)]
        address: String,
    },
    /// Drop expired bans and stale violation records
    Cleanup,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Check { identity, command } => {
            check_command(&config, identity.as_deref(), &command.join(" "))?
        }
        Commands::Gate {
            identity,
            address,
            owner,
        } => run_gate(&config, identity, address, owner)?,
        Commands::Bans { action } => manage_bans(&config, action)?,
        Commands::Events { limit } => show_events(&config, limit)?,
    }

    Ok(())
}

/// Addresses are trimmed; a blank one is a usage error
fn parse_address(raw: &str) -> Result<String, String> {
    let address = raw.trim();
    if address.is_empty() {
        return Err("address must not be empty".to_string());
    }
    Ok(address.to_string())
}

/// Logs go to stderr so `gate` output stays clean
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shellwarden=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<SecurityConfig> {
    let path = SecurityConfig::resolve_path(cli.config.as_deref());
    let mut config = SecurityConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(data_file) = &cli.data_file {
        config.bans.data_file = data_file
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?
            .to_string();
    }

    config.validate()?;
    Ok(config)
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = severity.to_string().to_uppercase();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.cyan(),
        Severity::None => label.green(),
    }
}

/// Classify one command; exits 1 when it would be rejected
fn check_command(
    config: &SecurityConfig,
    identity: Option<&str>,
    command: &str,
) -> anyhow::Result<()> {
    let filter = CommandFilter::new(
        config.filter.clone(),
        config.rate_limit.clone(),
        Arc::new(SystemClock),
    );

    let verdict = filter.classify(command, identity);

    if verdict.is_dangerous {
        println!(
            "{} {} [{}]",
            "✗".red().bold(),
            "Rejected".bold(),
            severity_label(verdict.severity)
        );
        println!("  {} {}", "command:".dimmed(), command);
        println!("  {} {}", "reason:".dimmed(), verdict.reason);
        std::process::exit(1);
    }

    println!("{} {}", "✓".green().bold(), "Command allowed".bold());
    Ok(())
}

/// Screen stdin line by line through a full guard
fn run_gate(
    config: &SecurityConfig,
    identity: String,
    address: Option<String>,
    owner: Option<String>,
) -> anyhow::Result<()> {
    let events = EventBus::new();
    events.subscribe(Arc::new(|event: &SecurityEvent| match event {
        SecurityEvent::IpBanned { address, permanent, .. } => {
            warn!(%address, permanent, "Address banned")
        }
        SecurityEvent::UserBlocked { user_id, reason, .. } => {
            warn!(user = %user_id, %reason, "User blocked")
        }
        _ => {}
    }));

    let guard = Arc::new(SecurityGuard::new(config, Arc::new(SystemClock), events));
    let sweeper = shellwarden::sweeper::spawn(
        guard.clone(),
        Duration::from_secs(u64::from(config.sweeper.interval_minutes) * 60),
    )
    .context("Failed to start sweeper thread")?;

    let owner_name = owner.unwrap_or_else(|| identity.clone());
    let terminal_id = format!("gate-{}", std::process::id());
    let mut session = SessionContext::new(terminal_id, identity, owner_name);

    if let Some(address) = address {
        if let Admission::Rejected(notice) = guard.admit(&address) {
            eprintln!(
                "{} {} ({})",
                "✗".red().bold(),
                "Connection refused: address banned".bold(),
                notice.reason
            );
            sweeper.shutdown();
            std::process::exit(1);
        }
        session = session.with_address(address);
    }

    info!(terminal = %session.terminal_id, owner = %session.owner_id, "Gate started");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut disconnected = false;

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;

        match guard.screen(&session, &format!("{line}\n")) {
            InputOutcome::Forward => {
                writeln!(out, "{line}")?;
                out.flush()?;
            }
            InputOutcome::Rejected(rejection) => {
                eprint!("{}", rejection.warning);
                if let Some(alert) = &rejection.alert {
                    eprintln!(
                        "{} [{}] {}: {}",
                        "⚠".yellow(),
                        severity_label(alert.severity),
                        alert.message,
                        alert.command
                    );
                }
                if let Some(disconnect) = &rejection.disconnect {
                    eprintln!(
                        "\n{} {} ({})",
                        "✗".red().bold(),
                        format!("Disconnected: {}", disconnect.reason).bold(),
                        disconnect.details
                    );
                    disconnected = true;
                    break;
                }
            }
        }
    }

    sweeper.shutdown();
    guard.bans().flush().context("Failed to save ban ledger")?;

    if disconnected {
        std::process::exit(2);
    }
    Ok(())
}

fn print_ban(address: &str, ban: &BanRecord, now: chrono::DateTime<chrono::Utc>) {
    let status = if ban.permanent {
        "permanent".red().bold()
    } else if ban.is_expired(now) {
        "expired".dimmed()
    } else {
        "active".yellow()
    };

    let expiry = ban
        .expires_at()
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    println!(
        "{} {} [{}] bans: {}, expires: {}",
        "•".dimmed(),
        address.cyan().bold(),
        status,
        ban.ban_count,
        expiry
    );
    println!("    {}", ban.reason.dimmed());
}

fn manage_bans(config: &SecurityConfig, action: BanAction) -> anyhow::Result<()> {
    let clock = Arc::new(SystemClock);
    let ledger = BanLedger::open(config.bans.clone(), clock.clone(), EventBus::new());

    match action {
        BanAction::Stats => {
            let stats = ledger.stats();
            println!(
                "{}",
                format!("Ban ledger: {}\n", ledger.store().path().display()).bold()
            );
            println!("  active bans:          {}", stats.active_bans);
            println!("  permanent bans:       {}", stats.permanent_bans);
            println!("  bans in last 24h:     {}", stats.recent_bans);
            println!("  stored bans:          {}", stats.total_banned);
            println!("  violating addresses:  {}", stats.violating_addresses);
            println!("  whitelisted:          {}", stats.whitelisted);
        }
        BanAction::List => {
            let bans = ledger.list_bans();
            if bans.is_empty() {
                println!("{} {}", "✓".green().bold(), "No bans recorded".bold());
            } else {
                let now = clock.now();
                for (address, ban) in &bans {
                    print_ban(address, ban, now);
                }
                println!("\n{} Total: {} bans", "✓".green(), bans.len());
            }
        }
        BanAction::Show { address } => {
            let stats = ledger.address_stats(&address);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        BanAction::Ban {
            address,
            reason,
            permanent,
        } => {
            if ledger.ban(&address, &reason, permanent) {
                println!("{} Banned {}", "✓".green().bold(), address.cyan());
            } else {
                println!("{} {} is whitelisted", "⚠".yellow(), address.cyan());
            }
        }
        BanAction::Unban { address } => report(
            ledger.unban(&address),
            "Unbanned",
            "is not banned",
            &address,
        ),
        BanAction::Whitelist { address } => report(
            ledger.add_to_whitelist(&address),
            "Whitelisted",
            "is already whitelisted",
            &address,
        ),
        BanAction::Unwhitelist { address } => report(
            ledger.remove_from_whitelist(&address),
            "Removed from whitelist:",
            "is not whitelisted",
            &address,
        ),
        BanAction::Cleanup => {
            let report = ledger.cleanup();
            println!(
                "{} Removed {} expired bans and {} stale violation records",
                "✓".green().bold(),
                report.expired_bans,
                report.stale_violation_records
            );
        }
    }

    ledger.flush().context("Failed to save ban ledger")?;
    Ok(())
}

fn report(changed: bool, done: &str, unchanged: &str, address: &str) {
    if changed {
        println!("{} {} {}", "✓".green().bold(), done, address.cyan());
    } else {
        println!("{} {} {}", "⚠".yellow(), address.cyan(), unchanged);
    }
}

fn show_events(config: &SecurityConfig, limit: usize) -> anyhow::Result<()> {
    if config.threat.log_path().is_none() {
        anyhow::bail!("Security log is disabled (threat.log_file is empty)");
    }

    let monitor = ThreatMonitor::new(
        config.threat.clone(),
        Arc::new(SystemClock),
        EventBus::new(),
    );
    let stats = monitor.stats();
    let path = monitor.log_path().unwrap_or_default();

    println!("{}", format!("Security log: {}\n", path.display()).bold());
    println!("  events loaded:        {}", stats.total_events);
    println!("  in last hour:         {}", stats.recent_events);
    println!("  in last 24h:          {}", stats.daily_events);

    let events = monitor.recent_events(limit);
    if events.is_empty() {
        println!(
            "\n{} {}",
            "✓".green().bold(),
            "No security events recorded".bold()
        );
        return Ok(());
    }

    println!();
    for event in &events {
        println!(
            "{} {} [{}] {} {}",
            "•".dimmed(),
            event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            severity_label(event.severity),
            event.kind.as_str(),
            event.user_id.cyan()
        );
        if let Some(command) = &event.command {
            println!("    {} {}", "command:".dimmed(), command);
        }
        println!("    {} {}", "reason:".dimmed(), event.reason);
    }
    Ok(())
}
