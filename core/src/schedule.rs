use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, UpdaterError};

/// Base interval between updates (30 days).
pub const DEFAULT_CHECK_INTERVAL_HOURS: i64 = 24 * 30;
/// Upper bound of the per-host jitter (4 days).
pub const DEFAULT_NODE_CHECK_DELAY_HOURS: i64 = 24 * 4;
/// Countdowns below this many days are [`Severity::Critical`].
pub const CRITICAL_DAYS: f64 = 2.0;
/// Countdowns below this many days are [`Severity::Warning`].
pub const WARNING_DAYS: f64 = 7.0;

const SECONDS_PER_HOUR: i64 = 60 * 60;
const SECONDS_PER_DAY: f64 = (60 * 60 * 24) as f64;

/// Name of a managed host. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostIdentity(String);

impl HostIdentity {
    /// Wrap `name`, rejecting blank names.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(UpdaterError::InvalidConfiguration(
                "host identity must not be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// The host name as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// When and how a host should update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePolicy {
    /// Base interval between updates, in hours.
    pub check_interval_hours: i64,
    /// Jitter bound in hours; each host updates up to this much earlier than the base interval.
    pub node_check_delay_hours: i64,
    /// Request a reboot after updating when the system says one is required.
    pub reboot_if_needed: bool,
    /// Treat the update as due regardless of the last-update time.
    pub force_update_now: bool,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            check_interval_hours: DEFAULT_CHECK_INTERVAL_HOURS,
            node_check_delay_hours: DEFAULT_NODE_CHECK_DELAY_HOURS,
            reboot_if_needed: false,
            force_update_now: false,
        }
    }
}

impl UpdatePolicy {
    /// Reject policies the decision cannot be computed for.
    pub fn validate(&self) -> Result<()> {
        check_delay(self.node_check_delay_hours)
    }
}

fn check_delay(node_check_delay_hours: i64) -> Result<()> {
    if node_check_delay_hours <= 0 {
        return Err(UpdaterError::InvalidConfiguration(format!(
            "node_check_delay_hours must be > 0 (got {node_check_delay_hours})"
        )));
    }
    Ok(())
}

/// Per-host jitter in hours, in `[-node_check_delay_hours, 0)`.
///
/// The host name is hashed with SHA-256, the hex digest has its `a`-`f`
/// characters removed, and the remaining decimal digits are read as one
/// integer (zero when none remain) which is reduced modulo the delay.
pub fn jitter_offset_hours(host: &HostIdentity, node_check_delay_hours: i64) -> Result<i64> {
    check_delay(node_check_delay_hours)?;
    let digest = hex::encode(Sha256::digest(host.as_str().as_bytes()));
    Ok(decimal_digits_mod(&digest, node_check_delay_hours) - node_check_delay_hours)
}

// Digits are folded one at a time so a 60+ digit number never has to be materialized.
fn decimal_digits_mod(hex_digest: &str, modulus: i64) -> i64 {
    let m = i128::from(modulus);
    let rem = hex_digest
        .chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0i128, |acc, d| (acc * 10 + i128::from(d)) % m);
    rem as i64
}

/// Why a [`Decision`] came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueReason {
    /// `force_update_now` was set.
    Forced,
    /// No previous update is on record.
    NeverUpdated,
    /// The jittered period has passed.
    Elapsed,
    /// The jittered period has not passed yet.
    NotYet,
}

/// Outcome of [`is_update_due`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether to update now.
    pub due: bool,
    /// Seconds left until due; zero or negative once the period has passed.
    pub seconds_until_due: i64,
    /// The host's jitter offset in hours.
    pub offset_hours: i64,
    /// Jittered period in seconds.
    pub period_seconds: i64,
    /// What decided `due`.
    pub reason: DueReason,
}

impl Decision {
    /// Record value to persist once an update that started from this decision completes.
    pub fn proposed_record(&self, completed_at: i64) -> Option<i64> {
        self.due.then_some(completed_at)
    }
}

/// Decide whether `host` should update at `now` (epoch seconds).
pub fn is_update_due(
    host: &HostIdentity,
    policy: &UpdatePolicy,
    last_update_at: Option<i64>,
    now: i64,
) -> Result<Decision> {
    let offset_hours = jitter_offset_hours(host, policy.node_check_delay_hours)?;
    let period_seconds = policy
        .check_interval_hours
        .saturating_add(offset_hours)
        .saturating_mul(SECONDS_PER_HOUR);
    let since_last = now.saturating_sub(last_update_at.unwrap_or(0));
    let overdue_by = since_last.saturating_sub(period_seconds);

    let reason = if policy.force_update_now {
        DueReason::Forced
    } else if last_update_at.is_none() {
        DueReason::NeverUpdated
    } else if overdue_by > 0 {
        DueReason::Elapsed
    } else {
        DueReason::NotYet
    };

    Ok(Decision {
        due: reason != DueReason::NotYet,
        seconds_until_due: period_seconds.saturating_sub(since_last),
        offset_hours,
        period_seconds,
        reason,
    })
}

/// How close a pending update is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Under [`CRITICAL_DAYS`].
    Critical,
    /// Under [`WARNING_DAYS`].
    Warning,
    /// Comfortably far away.
    Ok,
}

/// Days left until an update, with a severity for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Countdown {
    /// Fractional days until due.
    pub days: f64,
    /// Severity bucket for `days`.
    pub severity: Severity,
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} days", self.days)
    }
}

/// Turn `seconds_until_due` into a [`Countdown`].
pub fn format_countdown(seconds_until_due: i64) -> Countdown {
    let days = seconds_until_due as f64 / SECONDS_PER_DAY;
    let severity = if days < CRITICAL_DAYS {
        Severity::Critical
    } else if days < WARNING_DAYS {
        Severity::Warning
    } else {
        Severity::Ok
    };
    Countdown { days, severity }
}

/// A host paired with a validated policy.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    host: HostIdentity,
    policy: UpdatePolicy,
}

impl UpdateScheduler {
    /// Fails with [`UpdaterError::InvalidConfiguration`] before any decision is made.
    pub fn new(host: HostIdentity, policy: UpdatePolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { host, policy })
    }

    /// Host this scheduler decides for.
    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    /// Policy in effect.
    pub fn policy(&self) -> &UpdatePolicy {
        &self.policy
    }

    /// See [`jitter_offset_hours`].
    pub fn offset_hours(&self) -> Result<i64> {
        jitter_offset_hours(&self.host, self.policy.node_check_delay_hours)
    }

    /// See [`is_update_due`].
    pub fn decide(&self, last_update_at: Option<i64>, now: i64) -> Result<Decision> {
        is_update_due(&self.host, &self.policy, last_update_at, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 2_000_000_000;

    fn host(name: &str) -> HostIdentity {
        HostIdentity::new(name).unwrap()
    }

    #[test]
    fn offset_is_deterministic() {
        let a = jitter_offset_hours(&host("web-01.example.net"), 96).unwrap();
        let b = jitter_offset_hours(&host("web-01.example.net"), 96).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn offset_stays_in_range() {
        for delay in [1, 2, 7, 96, 1000, i64::MAX / 4] {
            for i in 0..200 {
                let off = jitter_offset_hours(&host(&format!("node-{i}")), delay).unwrap();
                assert!(off >= -delay && off < 0, "delay={delay} off={off}");
            }
        }
    }

    #[test]
    fn zero_or_negative_delay_is_rejected() {
        for delay in [0, -1, -96] {
            let err = jitter_offset_hours(&host("host-a"), delay).unwrap_err();
            assert!(matches!(err, UpdaterError::InvalidConfiguration(_)));
        }
        let policy = UpdatePolicy { node_check_delay_hours: 0, ..Default::default() };
        assert!(is_update_due(&host("host-a"), &policy, Some(NOW), NOW).is_err());
        assert!(UpdateScheduler::new(host("host-a"), policy).is_err());
    }

    #[test]
    fn blank_host_is_rejected() {
        assert!(HostIdentity::new("").is_err());
        assert!(HostIdentity::new("   ").is_err());
    }

    #[test]
    fn digest_without_digits_reads_as_zero() {
        assert_eq!(decimal_digits_mod("abcdefABCDEF", 96), 0);
        assert_eq!(decimal_digits_mod("", 96), 0);
        assert_eq!(decimal_digits_mod("1a2b3", 100), 23);
        assert_eq!(decimal_digits_mod("1000000", 7), 1);
        let wide = "123456789012345678901234567890123456789";
        let expected = (wide.parse::<u128>().unwrap() % 96) as i64;
        assert_eq!(decimal_digits_mod(&format!("ff{wide}ee"), 96), expected);
    }

    #[test]
    fn forced_update_is_always_due() {
        let policy = UpdatePolicy { force_update_now: true, ..Default::default() };
        for last in [None, Some(NOW), Some(NOW - 1), Some(NOW + 3600)] {
            let d = is_update_due(&host("host-a"), &policy, last, NOW).unwrap();
            assert!(d.due);
            assert_eq!(d.reason, DueReason::Forced);
        }
    }

    #[test]
    fn never_updated_is_due() {
        let d = is_update_due(&host("host-a"), &UpdatePolicy::default(), None, NOW).unwrap();
        assert!(d.due);
        assert_eq!(d.reason, DueReason::NeverUpdated);
        assert_eq!(d.proposed_record(NOW + 60), Some(NOW + 60));
    }

    #[test]
    fn boundary_is_strict() {
        let h = host("host-a");
        let policy = UpdatePolicy { check_interval_hours: 720, node_check_delay_hours: 96, ..Default::default() };
        let offset = jitter_offset_hours(&h, 96).unwrap();
        let period = (720 + offset) * 3600;

        let at_boundary = is_update_due(&h, &policy, Some(NOW - period), NOW).unwrap();
        assert_eq!(at_boundary.period_seconds, period);
        assert!(!at_boundary.due);
        assert_eq!(at_boundary.seconds_until_due, 0);
        assert_eq!(at_boundary.reason, DueReason::NotYet);
        assert_eq!(at_boundary.proposed_record(NOW), None);

        let one_later = is_update_due(&h, &policy, Some(NOW - period - 1), NOW).unwrap();
        assert!(one_later.due);
        assert_eq!(one_later.seconds_until_due, -1);
        assert_eq!(one_later.reason, DueReason::Elapsed);
    }

    #[test]
    fn recent_update_reports_remaining_time() {
        let s = UpdateScheduler::new(host("host-a"), UpdatePolicy::default()).unwrap();
        let d = s.decide(Some(NOW - 3600), NOW).unwrap();
        assert!(!d.due);
        assert_eq!(d.offset_hours, s.offset_hours().unwrap());
        assert_eq!(d.seconds_until_due, d.period_seconds - 3600);
        assert!(d.period_seconds <= DEFAULT_CHECK_INTERVAL_HOURS * 3600);
    }

    #[test]
    fn severity_thresholds() {
        let day = 86_400;
        assert_eq!(format_countdown(day * 3 / 2).severity, Severity::Critical);
        assert_eq!(format_countdown(day * 5).severity, Severity::Warning);
        assert_eq!(format_countdown(day * 10).severity, Severity::Ok);
        assert_eq!(format_countdown(day * 2).severity, Severity::Warning);
        assert_eq!(format_countdown(day * 7).severity, Severity::Ok);
        assert_eq!(format_countdown(-day).severity, Severity::Critical);
    }

    #[test]
    fn countdown_renders_two_decimals() {
        let c = format_countdown(86_400 * 3 / 2);
        assert_eq!(c.days, 1.5);
        assert_eq!(c.to_string(), "1.50 days");
    }

    #[test]
    fn offsets_spread_across_fleet() {
        const DELAY: i64 = 96;
        const BUCKETS: usize = 8;
        const HOSTS: usize = 9_600;
        let mut counts = [0usize; BUCKETS];
        for i in 0..HOSTS {
            let off = jitter_offset_hours(&host(&format!("synthetic-{i}.fleet.local")), DELAY).unwrap();
            let slot = ((off + DELAY) as usize) * BUCKETS / DELAY as usize;
            counts[slot] += 1;
        }
        let expected = HOSTS / BUCKETS;
        for (slot, n) in counts.iter().enumerate() {
            let drift = (*n as f64 - expected as f64).abs() / expected as f64;
            assert!(drift < 0.15, "bucket {slot} has {n}, expected ~{expected}");
        }
    }
}
