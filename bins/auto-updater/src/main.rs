mod converge;
mod notes;
mod reboot;
mod runner;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use updater_core::cfg::{self, AppId, Config};
use updater_core::plan::UpdatePlan;
use updater_core::schedule::{format_countdown, HostIdentity, UpdateScheduler};
use updater_core::store::{self, UpdateRecordStore};
use updater_core::logx;

use crate::converge::{Outcome, Updater};
use crate::reboot::SystemReboot;
use crate::runner::ProcessRunner;

const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    application: env!("CARGO_PKG_NAME"),
};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "Jittered apt auto-updater")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Config file to use instead of the per-user config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Host name to decide for (defaults to config node_name, then the system hostname)
    #[arg(long, global = true)]
    host: Option<String>,
    /// Directory holding the last-update record
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Base interval between updates, in hours
    #[arg(long, global = true, allow_negative_numbers = true)]
    check_interval_hours: Option<i64>,
    /// Jitter bound in hours (must be > 0)
    #[arg(long, global = true, allow_negative_numbers = true)]
    node_check_delay_hours: Option<i64>,
    /// Request a reboot after updating if the system needs one
    #[arg(long, global = true)]
    reboot_if_needed: bool,
    /// Update now regardless of the last update time
    #[arg(long, global = true)]
    force: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether an update is due, without running anything
    Check {
        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update if due, record the time, and reboot if configured
    Run {
        /// List the steps instead of running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print this host's jitter offset in hours
    Offset,
    /// Record a last-update time without running anything
    Mark {
        /// Epoch seconds (defaults to now)
        #[arg(long, allow_negative_numbers = true)]
        at: Option<i64>,
    },
    /// Forget the last-update time
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => cfg::load_from(path)?,
        None => cfg::load_or_init(&APP)?,
    };
    logx::init(logx::level_for(cli.verbose, &cfg.log_level));

    let host = HostIdentity::new(resolve_host(&cli, &cfg)?)?;
    let mut policy = cfg.policy();
    if let Some(h) = cli.check_interval_hours {
        policy.check_interval_hours = h;
    }
    if let Some(h) = cli.node_check_delay_hours {
        policy.node_check_delay_hours = h;
    }
    policy.reboot_if_needed |= cli.reboot_if_needed;
    policy.force_update_now = cli.force;
    let scheduler = UpdateScheduler::new(host, policy)?;

    let state_dir = match cli.state_dir.clone().or_else(|| cfg.state_dir.clone()) {
        Some(dir) => dir,
        None => cfg::data_dir(&APP)?.join("state"),
    };
    let kv = store::open_default(&state_dir)?;
    debug!(host = %scheduler.host(), state = %state_dir.display(), ?policy, "resolved");

    match cli.cmd {
        Command::Check { json } => {
            let last = kv.read(scheduler.host())?;
            let decision = scheduler.decide(last, now())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else if decision.due {
                println!(
                    "{} is due for an update ({:?}); last updated {}",
                    scheduler.host(),
                    decision.reason,
                    notes::describe_time(last)
                );
            } else {
                let countdown = format_countdown(decision.seconds_until_due);
                println!("{} will auto-update in {}", scheduler.host(), notes::paint(&countdown));
            }
        }
        Command::Run { dry_run } => {
            let updater = Updater {
                scheduler,
                plan: UpdatePlan::apt(),
                store: kv,
                runner: ProcessRunner,
                reboot: SystemReboot::new(ProcessRunner),
                clock: now,
            };
            match updater.converge(dry_run).await? {
                Outcome::NotDue { decision, countdown } => {
                    debug!(seconds_until_due = decision.seconds_until_due, offset_hours = decision.offset_hours);
                    println!("{} will auto-update in {}", updater.scheduler.host(), notes::paint(&countdown));
                }
                Outcome::DryRun { decision, steps } => {
                    println!("dry run ({:?}); would run:", decision.reason);
                    for step in steps {
                        let tag = if step.ignore_failure { " (failure ignored)" } else { "" };
                        println!("  {}{tag}", step.command_line());
                    }
                }
                Outcome::Updated { decision, recorded_at, tolerated_failures, reboot_requested } => {
                    info!(reason = ?decision.reason, ?tolerated_failures, reboot_requested, "update complete");
                    println!("{} updated at {}", updater.scheduler.host(), notes::describe_time(Some(recorded_at)));
                }
            }
        }
        Command::Offset => {
            println!("{}", scheduler.offset_hours()?);
        }
        Command::Mark { at } => {
            let at = at.unwrap_or_else(now);
            kv.write(scheduler.host(), at)?;
            println!("{} marked as updated at {}", scheduler.host(), notes::describe_time(Some(at)));
        }
        Command::Reset => {
            let existed = kv.clear(scheduler.host());
            println!("{} reset (had record: {existed})", scheduler.host());
        }
    }
    Ok(())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn resolve_host(cli: &Cli, cfg: &Config) -> Result<String> {
    if let Some(h) = cli.host.clone().or_else(|| cfg.node_name.clone()) {
        return Ok(h);
    }
    if let Some(h) = std::env::var("HOSTNAME").ok().filter(|h| !h.trim().is_empty()) {
        return Ok(h);
    }
    for path in ["/proc/sys/kernel/hostname", "/etc/hostname"] {
        if let Ok(txt) = fs::read_to_string(path) {
            let name = txt.trim();
            if !name.is_empty() {
                return Ok(name.to_string());
            }
        }
    }
    Err(anyhow::anyhow!("no host name found")).context("pass --host or set node_name in config")
}
