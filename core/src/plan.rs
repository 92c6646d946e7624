use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// dpkg options that keep existing config files and take package defaults without prompting.
pub const DPKG_CONFOLD_ARGS: [&str; 4] = [
    "-o",
    "DPkg::options::=--force-confdef",
    "-o",
    "DPkg::options::=--force-confold",
];

/// One OS command in the update sequence.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Step {
    /// Label used in logs.
    pub name: String,
    /// Command/executable.
    pub program: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Keep going when this step fails.
    #[serde(default)]
    pub ignore_failure: bool,
    /// Pass the command's output straight through to the terminal.
    #[serde(default = "default_true")]
    pub live_stream: bool,
    /// Optional timeout (ms).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_true() -> bool { true }

impl Step {
    /// A step whose failure aborts the sequence.
    pub fn required(name: &str, program: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ignore_failure: false,
            live_stream: true,
            timeout_ms: None,
        }
    }

    /// A step whose failure is logged and skipped.
    pub fn tolerated(name: &str, program: &str, args: &[&str]) -> Self {
        Self { ignore_failure: true, ..Self::required(name, program, args) }
    }

    /// Capture output instead of streaming it.
    pub fn quiet(mut self) -> Self {
        self.live_stream = false;
        self
    }

    /// Shell-ish rendering for logs and dry runs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Environment shared by every step of a plan.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ExecEnv {
    /// Extra environment variables.
    pub vars: BTreeMap<String, String>,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Default for ExecEnv {
    fn default() -> Self {
        Self { vars: BTreeMap::new(), cwd: PathBuf::from("/") }
    }
}

/// Ordered package-manager steps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    /// Environment for every step.
    pub env: ExecEnv,
    /// Steps, run in order.
    pub steps: Vec<Step>,
}

impl UpdatePlan {
    /// The apt sequence: refresh, repair half-configured packages, refresh again with
    /// confold options, dist-upgrade, autoremove.
    pub fn apt() -> Self {
        let mut vars = BTreeMap::new();
        vars.insert("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string());

        Self {
            env: ExecEnv { vars, cwd: PathBuf::from("/") },
            steps: vec![
                Step::required("apt-auto-update", "apt-get", &["-y", "update"]),
                Step::tolerated("dpkg-configure", "dpkg", &["--configure", "-a"]).quiet(),
                Step::required("apt-auto-update", "apt-get", &with_confold("update")),
                Step::required("apt-dist-upgrade", "apt-get", &with_confold("dist-upgrade")),
                Step::tolerated("apt-autoremove", "apt", &["autoremove", "-y"]).quiet(),
            ],
        }
    }
}

fn with_confold(verb: &str) -> Vec<&str> {
    let mut args = vec!["-y"];
    args.extend(DPKG_CONFOLD_ARGS);
    args.push(verb);
    args
}

/// How to tell whether the freshly updated system wants a reboot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RebootCheck {
    /// Command whose output mentions a pending restart.
    pub motd: Step,
    /// Substring in `motd` output that means a reboot is required.
    pub pattern: String,
    /// File whose presence means a reboot is required.
    pub marker_file: PathBuf,
}

impl Default for RebootCheck {
    fn default() -> Self {
        Self {
            motd: Step::tolerated("update-motd", "/usr/sbin/update-motd", &[]).quiet(),
            pattern: "restart".to_string(),
            marker_file: PathBuf::from("/var/run/reboot-required"),
        }
    }
}

impl RebootCheck {
    /// Whether captured motd output asks for a restart.
    pub fn motd_requests_restart(&self, output: &str) -> bool {
        output.lines().any(|l| l.contains(&self.pattern))
    }
}

/// Deferred reboot command.
pub fn reboot_step() -> Step {
    Step::required("reboot instance", "shutdown", &["-r", "+1", "auto-updater: packages updated"])
}
