use chrono::{Local, TimeZone};
use colored::{ColoredString, Colorize};
use updater_core::schedule::{Countdown, HostIdentity, Severity};

pub fn starting(host: &HostIdentity) -> String {
    format!(
        "\n\n========> WARNING! Auto-Update of host {} starting, reboot may be required...",
        host.as_str().bold().green()
    )
}

pub fn last_updated(last: Option<i64>) -> String {
    format!("\n\n========>          Last updated at {}", describe_time(last))
}

pub fn countdown(host: &HostIdentity, countdown: &Countdown) -> String {
    format!(
        "\n\n⎯⎯⎯⎯⎯⎯⎯⎯⎯  NOTE: {host} will auto-update in {} ⎯⎯⎯⎯⎯⎯⎯⎯⎯ \n\n",
        paint(countdown)
    )
}

pub fn paint(countdown: &Countdown) -> ColoredString {
    let text = countdown.to_string();
    match countdown.severity {
        Severity::Critical => text.red(),
        Severity::Warning => text.yellow(),
        Severity::Ok => text.green(),
    }
}

/// Local time for an epoch, or `(never)`.
pub fn describe_time(at: Option<i64>) -> String {
    match at.and_then(|s| Local.timestamp_opt(s, 0).single()) {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S %z").to_string(),
        None if at.is_some() => format!("epoch {}", at.unwrap_or_default()),
        None => "(never)".to_string(),
    }
}
