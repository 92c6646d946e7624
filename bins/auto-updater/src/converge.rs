use anyhow::Result;
use colored::Colorize;
use tracing::{info, warn};

use updater_core::plan::{Step, UpdatePlan};
use updater_core::schedule::{format_countdown, Countdown, Decision, UpdateScheduler};
use updater_core::store::UpdateRecordStore;
use updater_core::UpdaterError;

use crate::notes;
use crate::reboot::RebootRequester;
use crate::runner::CommandRunner;

/// Result of one convergence pass.
#[derive(Debug)]
pub enum Outcome {
    /// Not due yet.
    NotDue { decision: Decision, countdown: Countdown },
    /// Due, but only the steps were listed.
    DryRun { decision: Decision, steps: Vec<Step> },
    /// All required steps succeeded and `recorded_at` was persisted.
    Updated {
        decision: Decision,
        recorded_at: i64,
        tolerated_failures: Vec<String>,
        reboot_requested: bool,
    },
}

/// Everything one run needs, with collaborators injected.
pub struct Updater<S, R, B> {
    pub scheduler: UpdateScheduler,
    pub plan: UpdatePlan,
    pub store: S,
    pub runner: R,
    pub reboot: B,
    pub clock: fn() -> i64,
}

impl<S, R, B> Updater<S, R, B>
where
    S: UpdateRecordStore,
    R: CommandRunner,
    B: RebootRequester,
{
    /// Read the record, decide, and update if due.
    pub async fn converge(&self, dry_run: bool) -> Result<Outcome> {
        let host = self.scheduler.host();
        let last = self.store.read(host)?;
        let decision = self.scheduler.decide(last, (self.clock)())?;

        if !decision.due {
            let countdown = format_countdown(decision.seconds_until_due);
            warn!("{}", notes::countdown(host, &countdown));
            return Ok(Outcome::NotDue { decision, countdown });
        }

        warn!("{}", notes::starting(host));
        warn!("{}", notes::last_updated(last));

        if dry_run {
            for step in &self.plan.steps {
                info!(step = %step.name, tolerated = step.ignore_failure, "would run: {}", step.command_line());
            }
            return Ok(Outcome::DryRun { decision, steps: self.plan.steps.clone() });
        }

        let tolerated_failures = self.run_plan().await?;

        let completed_at = (self.clock)();
        if let Some(at) = decision.proposed_record(completed_at) {
            self.store.write(host, at)?;
        }

        let mut reboot_requested = false;
        if self.scheduler.policy().reboot_if_needed {
            if self.reboot.reboot_required().await {
                warn!("reboot is scheduled for {}", host.to_string().bold());
                self.reboot.request_reboot().await?;
                reboot_requested = true;
            } else {
                info!("no reboot required");
            }
        }

        Ok(Outcome::Updated { decision, recorded_at: completed_at, tolerated_failures, reboot_requested })
    }

    async fn run_plan(&self) -> Result<Vec<String>> {
        let mut tolerated = Vec::new();
        for step in &self.plan.steps {
            info!(step = %step.name, "{}", step.command_line());
            let reason = match self.runner.run(step, &self.plan.env).await {
                Ok(out) if out.success() => continue,
                Ok(out) => format!("exit status {:?}", out.code),
                Err(e) => format!("{e:#}"),
            };
            if step.ignore_failure {
                warn!(step = %step.name, "ignoring failure: {reason}");
                tolerated.push(step.name.clone());
            } else {
                return Err(UpdaterError::StepFailed { step: step.name.clone(), reason }.into());
            }
        }
        Ok(tolerated)
    }
}
