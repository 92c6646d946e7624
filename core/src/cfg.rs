use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::schedule::{UpdatePolicy, DEFAULT_CHECK_INTERVAL_HOURS, DEFAULT_NODE_CHECK_DELAY_HOURS};

/// Identifier used to compute per-app configuration directories.
#[derive(Clone, Copy)]
pub struct AppId {
    /// Reverse-DNS style qualifier, e.g. `"com"`.
    pub qualifier: &'static str,
    /// Organization or vendor name, e.g. `"local"`.
    pub organization: &'static str,
    /// Application name, e.g. `"auto-updater"`.
    pub application: &'static str,
}

/// Application configuration persisted to `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracing level to use if `RUST_LOG` is not set (e.g. `"info"`).
    pub log_level: String,
    /// Host name override; the system hostname is used when unset.
    pub node_name: Option<String>,
    /// Directory for the last-update record; defaults to the app data dir.
    pub state_dir: Option<PathBuf>,
    /// See [`UpdatePolicy::check_interval_hours`].
    pub check_interval_hours: i64,
    /// See [`UpdatePolicy::node_check_delay_hours`].
    pub node_check_delay_hours: i64,
    /// See [`UpdatePolicy::reboot_if_needed`].
    pub reboot_if_needed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            node_name: None,
            state_dir: None,
            check_interval_hours: DEFAULT_CHECK_INTERVAL_HOURS,
            node_check_delay_hours: DEFAULT_NODE_CHECK_DELAY_HOURS,
            reboot_if_needed: false,
        }
    }
}

impl Config {
    /// Policy described by this config. Forcing is never a config setting.
    pub fn policy(&self) -> UpdatePolicy {
        UpdatePolicy {
            check_interval_hours: self.check_interval_hours,
            node_check_delay_hours: self.node_check_delay_hours,
            reboot_if_needed: self.reboot_if_needed,
            force_update_now: false,
        }
    }
}

fn project_dirs(app: &AppId) -> Result<ProjectDirs> {
    ProjectDirs::from(app.qualifier, app.organization, app.application)
        .ok_or_else(|| anyhow::anyhow!("failed to resolve ProjectDirs"))
}

/// Return the configuration directory for this app, creating it if needed.
pub fn config_dir(app: &AppId) -> Result<PathBuf> {
    let dir = project_dirs(app)?.config_dir().to_path_buf();
    fs::create_dir_all(&dir).with_context(|| format!("create config dir {}", dir.display()))?;
    Ok(dir)
}

/// Return the data directory for this app (not created).
pub fn data_dir(app: &AppId) -> Result<PathBuf> {
    Ok(project_dirs(app)?.data_dir().to_path_buf())
}

/// Load `config.toml` from the app config dir or create a default one.
pub fn load_or_init(app: &AppId) -> Result<Config> {
    let path = config_dir(app)?.join("config.toml");
    if path.exists() {
        load_from(&path)
    } else {
        let cfg = Config::default();
        save_config(&path, &cfg)?;
        Ok(cfg)
    }
}

/// Load a config file from an explicit path; missing keys take defaults.
pub fn load_from(path: &Path) -> Result<Config> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    let cfg: Config = toml::from_str(&txt)
        .with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
