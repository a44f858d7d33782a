//! Dashboard URL from the environment, plus the trigger definition
//! (schedule, machine hint, duration ceiling) from YAML or
//! built-in defaults.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::job::JOB_ID;
use crate::schedule::{CronPattern, ScheduleError};

pub const DASHBOARD_URL_ENV: &str = "DASHBOARD_URL";
pub const DEFAULT_DASHBOARD_URL: &str = "https://kindle-dash-server.onrender.com/dashboard";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid cron pattern: {0}")]
    Cron(#[from] ScheduleError),
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("max_duration_secs must be greater than zero")]
    ZeroMaxDuration,
}

/// Runtime settings read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub dashboard_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            dashboard_url: resolve_dashboard_url(std::env::var(DASHBOARD_URL_ENV).ok().as_deref()),
        }
    }
}

/// Fallback to the hosted service when the variable is unset or blank.
pub fn resolve_dashboard_url(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => DEFAULT_DASHBOARD_URL.to_string(),
    }
}

// ── Trigger definition ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CronConfig {
    pub pattern: String,
    pub timezone: String,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            pattern: "*/30 * * * *".to_string(),
            timezone: "Asia/Shanghai".to_string(),
        }
    }
}

/// Machine size hint handed to the hosting platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MachinePreset {
    #[default]
    Micro,
    #[serde(rename = "small-1x")]
    Small1x,
    #[serde(rename = "small-2x")]
    Small2x,
    #[serde(rename = "medium-1x")]
    Medium1x,
    #[serde(rename = "medium-2x")]
    Medium2x,
    #[serde(rename = "large-1x")]
    Large1x,
    #[serde(rename = "large-2x")]
    Large2x,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MachineConfig {
    pub preset: MachinePreset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Platform default; same as `info`.
    #[default]
    Log,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Log | LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Task definition: what the scheduler needs to know about the job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TriggerConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub cron: CronConfig,
    pub machine: MachineConfig,
    /// Hard ceiling for one run; enforced by the scheduler, not the job.
    pub max_duration_secs: u64,
    pub log_level: LogLevel,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            id: JOB_ID.to_string(),
            project: None,
            cron: CronConfig::default(),
            machine: MachineConfig::default(),
            // Covers the rendering service's free-tier cold start.
            max_duration_secs: 300,
            log_level: LogLevel::default(),
        }
    }
}

impl TriggerConfig {
    /// Load and validate a YAML trigger definition. Missing keys keep defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// `explicit` if given, else the per-user file if it exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_duration_secs == 0 {
            return Err(ConfigError::ZeroMaxDuration);
        }
        self.cron_pattern()?;
        Ok(())
    }

    /// IANA zone the cron pattern is evaluated in.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.cron
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.cron.timezone.clone()))
    }

    pub fn cron_pattern(&self) -> Result<CronPattern, ConfigError> {
        let tz = self.timezone()?;
        Ok(CronPattern::parse(&self.cron.pattern)?.with_timezone(tz))
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// `<config dir>/kindle-dash/trigger.yaml`, e.g. `~/.config/kindle-dash/trigger.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kindle-dash").join("trigger.yaml"))
}
