use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;
use updater_core::plan::{ExecEnv, Step};

/// What a finished step reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Captured stdout; empty for live-streamed steps.
    pub stdout: String,
}

impl StepOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs plan steps. Spawn failures and timeouts are `Err`; non-zero exits are not.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, step: &Step, env: &ExecEnv) -> Result<StepOutcome>;
}

/// Runs steps as real child processes.
#[derive(Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn run(&self, step: &Step, env: &ExecEnv) -> Result<StepOutcome> {
        let mut c = Command::new(&step.program);
        c.args(&step.args)
            .envs(&env.vars)
            .current_dir(&env.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if step.live_stream {
            c.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            c.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        debug!(step = %step.name, cmd = %step.command_line(), "spawn");

        let fut = c.output();
        let output = match step.timeout_ms {
            Some(ms) => timeout(Duration::from_millis(ms), fut)
                .await
                .with_context(|| format!("{} timed out after {ms}ms", step.name))?,
            None => fut.await,
        }
        .with_context(|| format!("spawn {}", step.program))?;

        if !output.stderr.is_empty() {
            debug!(step = %step.name, stderr = %String::from_utf8_lossy(&output.stderr).trim_end());
        }
        Ok(StepOutcome {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// Run `step` and fail unless it exits 0.
pub async fn run_checked<R: CommandRunner>(runner: &R, step: &Step, env: &ExecEnv) -> Result<StepOutcome> {
    let out = runner.run(step, env).await?;
    if !out.success() {
        bail!("{} exit status {:?}", step.name, out.code);
    }
    Ok(out)
}
