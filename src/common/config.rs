//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config file < environment < CLI
use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MAX_INSTANCE_CAP: usize = 1024;
const MAX_RESTART_DELAY_MS: u64 = 60_000;

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "chatbridge")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("chatbridge.toml"))
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "chatbridge")
        .map(|p| p.data_dir().join("sessions"))
        .unwrap_or_else(|| PathBuf::from(".chatbridge-sessions"))
}

/// Sidecar program spawned once per instance token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarSettings {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for SidecarSettings {
    fn default() -> Self {
        Self {
            command: "wa-sidecar".to_string(),
            args: Vec::new(),
        }
    }
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub bind: String,
    /// Shared secret callers must present in `x-api-key`.
    pub api_key: String,
    /// Parent directory of per-token session directories.
    pub data_dir: PathBuf,
    pub max_instances: usize,
    pub restart_delay_ms: u64,
    pub shutdown_timeout_secs: u64,
    pub sidecar: SidecarSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            bind: "0.0.0.0".to_string(),
            api_key: "dev-secret".to_string(),
            data_dir: default_data_dir(),
            max_instances: 32,
            restart_delay_ms: 1000,
            shutdown_timeout_secs: 10,
            sidecar: SidecarSettings::default(),
        }
    }
}

impl AppConfig {
    /// Rejects values that would misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.api_key.trim().is_empty(),
            "Invalid config: api_key must not be empty"
        );
        ensure!(
            self.max_instances >= 1,
            "Invalid config: max_instances must be >= 1"
        );
        ensure!(
            self.max_instances <= MAX_INSTANCE_CAP,
            "Invalid config: max_instances must be <= {MAX_INSTANCE_CAP}"
        );
        ensure!(
            self.restart_delay_ms <= MAX_RESTART_DELAY_MS,
            "Invalid config: restart_delay_ms must be <= {MAX_RESTART_DELAY_MS}"
        );
        ensure!(
            self.shutdown_timeout_secs >= 1,
            "Invalid config: shutdown_timeout_secs must be >= 1"
        );
        ensure!(
            !self.sidecar.command.trim().is_empty(),
            "Invalid config: sidecar.command must not be empty"
        );
        Ok(())
    }
}

/// Runtime overrides taken from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub api_key: Option<String>,
}

/// Loads config from defaults/file/env.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);

    let config: AppConfig = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("CHATBRIDGE_").split("__"))
        .extract()
        .context("Failed to load configuration")?;

    config.validate()?;

    Ok(config)
}

/// Applies runtime overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if let Some(ref data_dir) = overrides.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(ref api_key) = overrides.api_key {
        config.api_key = api_key.clone();
    }
    config
}
