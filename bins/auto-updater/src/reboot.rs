use anyhow::Result;
use tracing::{debug, warn};
use updater_core::plan::{self, ExecEnv, RebootCheck, Step};

use crate::runner::{run_checked, CommandRunner};

/// Decides whether a reboot is needed after an update and asks for one.
#[allow(async_fn_in_trait)]
pub trait RebootRequester {
    /// Whether the system reports a pending restart. Check failures count as "no".
    async fn reboot_required(&self) -> bool;
    /// Schedule a deferred reboot.
    async fn request_reboot(&self) -> Result<()>;
}

/// Reboots through the host's own tooling.
pub struct SystemReboot<R> {
    runner: R,
    check: RebootCheck,
    request: Step,
}

impl<R: CommandRunner> SystemReboot<R> {
    pub fn new(runner: R) -> Self {
        Self { runner, check: RebootCheck::default(), request: plan::reboot_step() }
    }

    #[cfg(test)]
    fn with(runner: R, check: RebootCheck, request: Step) -> Self {
        Self { runner, check, request }
    }
}

impl<R: CommandRunner> RebootRequester for SystemReboot<R> {
    async fn reboot_required(&self) -> bool {
        if self.check.marker_file.exists() {
            debug!(marker = %self.check.marker_file.display(), "reboot marker present");
            return true;
        }
        match run_checked(&self.runner, &self.check.motd, &ExecEnv::default()).await {
            Ok(out) => self.check.motd_requests_restart(&out.stdout),
            Err(e) => {
                warn!("reboot check skipped: {e:#}");
                false
            }
        }
    }

    async fn request_reboot(&self) -> Result<()> {
        run_checked(&self.runner, &self.request, &ExecEnv::default()).await?;
        Ok(())
    }
}
