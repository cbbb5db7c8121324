use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::manager::WatcherOptions;

const DEFAULT_FOCUSED_INTERVAL_MS: u64 = 1000;
const DEFAULT_UNFOCUSED_INTERVAL_MS: u64 = 10_000;
const DEFAULT_BACKGROUND_INTERVAL_SECS: u64 = 60;
const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 15;

/// Watcher configuration loaded from file and/or environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub focused_interval: Duration,
    pub unfocused_interval: Duration,
    pub background_interval: Duration,
    pub cycle_timeout: Duration,
    /// Location of the settings JSON file.
    pub settings_path: PathBuf,
}

/// Raw TOML file structure for `~/.config/canopy/config.toml`.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    focused_interval_ms: Option<u64>,
    unfocused_interval_ms: Option<u64>,
    background_interval_secs: Option<u64>,
    cycle_timeout_secs: Option<u64>,
    settings_path: Option<PathBuf>,
}

/// Default config file location.
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("could not determine config directory")?;
    Ok(dir.join("canopy").join("config.toml"))
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<u64>().ok())
}

impl WatcherConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Priority: environment variables override file values.
    /// File path can be overridden by `config_path` argument.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };

        let file_config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ConfigFile>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        } else {
            ConfigFile::default()
        };

        Self::from_file_and_env(file_config)
    }

    /// Build config from parsed file values and current environment.
    fn from_file_and_env(file_config: ConfigFile) -> Result<Self> {
        let ConfigFile {
            focused_interval_ms,
            unfocused_interval_ms,
            background_interval_secs,
            cycle_timeout_secs,
            settings_path,
        } = file_config;

        let focused_interval_ms = env_u64("CANOPY_FOCUSED_INTERVAL_MS")
            .or(focused_interval_ms)
            .unwrap_or(DEFAULT_FOCUSED_INTERVAL_MS);
        let unfocused_interval_ms = env_u64("CANOPY_UNFOCUSED_INTERVAL_MS")
            .or(unfocused_interval_ms)
            .unwrap_or(DEFAULT_UNFOCUSED_INTERVAL_MS);
        let background_interval_secs = env_u64("CANOPY_BACKGROUND_INTERVAL_SECS")
            .or(background_interval_secs)
            .unwrap_or(DEFAULT_BACKGROUND_INTERVAL_SECS);
        let cycle_timeout_secs = env_u64("CANOPY_CYCLE_TIMEOUT_SECS")
            .or(cycle_timeout_secs)
            .unwrap_or(DEFAULT_CYCLE_TIMEOUT_SECS);
        let settings_path = std::env::var("CANOPY_SETTINGS_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or(settings_path);

        Self::build(
            focused_interval_ms,
            unfocused_interval_ms,
            background_interval_secs,
            cycle_timeout_secs,
            settings_path,
        )
    }

    /// Build config from resolved values (after file + env merging).
    fn build(
        focused_interval_ms: u64,
        unfocused_interval_ms: u64,
        background_interval_secs: u64,
        cycle_timeout_secs: u64,
        settings_path: Option<PathBuf>,
    ) -> Result<Self> {
        if focused_interval_ms == 0 {
            bail!("focused_interval_ms must be greater than zero");
        }
        if unfocused_interval_ms == 0 {
            bail!("unfocused_interval_ms must be greater than zero");
        }
        if background_interval_secs == 0 {
            bail!("background_interval_secs must be greater than zero");
        }
        if cycle_timeout_secs == 0 {
            bail!("cycle_timeout_secs must be greater than zero");
        }

        let settings_path =
            settings_path.unwrap_or_else(canopy_data::settings::default_settings_path);

        Ok(Self {
            focused_interval: Duration::from_millis(focused_interval_ms),
            unfocused_interval: Duration::from_millis(unfocused_interval_ms),
            background_interval: Duration::from_secs(background_interval_secs),
            cycle_timeout: Duration::from_secs(cycle_timeout_secs),
            settings_path,
        })
    }

    pub fn options(&self) -> WatcherOptions {
        WatcherOptions {
            focused_interval: self.focused_interval,
            unfocused_interval: self.unfocused_interval,
            background_interval: self.background_interval,
            cycle_timeout: self.cycle_timeout,
        }
    }
}
