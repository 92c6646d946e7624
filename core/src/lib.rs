#![deny(missing_docs)]
//! updater_core: shared building blocks (update decision, config, KV, logging, update plan).

/// Error type shared by the decision logic and its collaborators.
pub mod error;
/// Jittered update-scheduling decision (pure, no I/O).
pub mod schedule;
/// Configuration helpers (AppId, dirs, load_or_init, etc.)
pub mod cfg;
/// Simple file-backed KV store with serde helpers and the last-update record.
pub mod store;
/// Tracing/log initialization helpers.
pub mod logx;
/// Fixed package-manager step sequence and reboot check.
pub mod plan;

pub use error::{Result, UpdaterError};
pub use schedule::{Countdown, Decision, DueReason, HostIdentity, Severity, UpdatePolicy, UpdateScheduler};
