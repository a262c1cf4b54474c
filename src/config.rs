//! Process-wide settings for action pipelines.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ACTIONKIT_REPORT_MODE, ACTIONKIT_LOG_CALLS)
//! 2. Config file (.actionkit/config.yaml)
//! 3. Defaults (first_and_exhausted reporting, debug call logs)
//!
//! Config file discovery:
//! - Searches current directory and parents for .actionkit/config.yaml
//! - Falls back to ~/.actionkit/config.yaml
//!
//! The exception reporter and lifecycle subscribers can only be set in code,
//! through `Settings` builders and `install`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{ExceptionReporter, LifecycleSubscriber};
use crate::domain::ReportMode;

/// Environment override for the default reporting mode
pub const ENV_REPORT_MODE: &str = "ACTIONKIT_REPORT_MODE";

/// Environment override for the level of the "about to execute" log
pub const ENV_LOG_CALLS: &str = "ACTIONKIT_LOG_CALLS";

const CONFIG_DIR: &str = ".actionkit";
const CONFIG_FILE: &str = "config.yaml";

/// Installed settings, loaded on first use
static SETTINGS: OnceLock<RwLock<Arc<Settings>>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportingConfig {
    pub default_mode: Option<ReportMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    pub call: Option<LogLevel>,
    pub success: Option<LogLevel>,
    pub failure: Option<LogLevel>,
    pub exception: Option<LogLevel>,
}

/// Level of a pipeline log line; `Off` silences it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "false" => Ok(Self::Off),
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => anyhow::bail!("Unknown log level: {}", other),
        }
    }
}

/// Levels for the pipeline's own log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogSettings {
    /// "About to execute" line with filtered inputs
    pub call: LogLevel,
    pub success: LogLevel,
    pub failure: LogLevel,
    pub exception: LogLevel,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            call: LogLevel::Debug,
            success: LogLevel::Info,
            failure: LogLevel::Info,
            exception: LogLevel::Warn,
        }
    }
}

/// Resolved settings shared by every invocation
#[derive(Clone, Default)]
pub struct Settings {
    /// Reporting mode for actions without their own override
    pub default_report_mode: ReportMode,
    pub log: LogSettings,
    /// Receives exceptions that pass the retry gate
    pub reporter: Option<Arc<dyn ExceptionReporter>>,
    pub subscribers: Vec<Arc<dyn LifecycleSubscriber>>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Schema version declared by the config file
    pub config_version: Option<String>,
}

impl Settings {
    pub fn with_default_report_mode(mut self, mode: ReportMode) -> Self {
        self.default_report_mode = mode;
        self
    }

    pub fn with_log(mut self, log: LogSettings) -> Self {
        self.log = log;
        self
    }

    pub fn with_reporter<R>(mut self, reporter: R) -> Self
    where
        R: ExceptionReporter + 'static,
    {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn LifecycleSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("default_report_mode", &self.default_report_mode)
            .field("log", &self.log)
            .field("reporter", &self.reporter.is_some())
            .field("subscribers", &self.subscribers.len())
            .field("config_file", &self.config_file)
            .field("config_version", &self.config_version)
            .finish()
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Find config file from the current directory, then the home directory
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(found) = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file_from(&cwd))
    {
        return Some(found);
    }

    let home_config = dirs::home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
    home_config.exists().then_some(home_config)
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Merge defaults, a parsed config file and environment lookups
pub fn resolve<F>(file: Option<&ConfigFile>, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    if let Some(file) = file {
        settings.config_version = file.version.clone();
        if let Some(mode) = file.reporting.default_mode {
            settings.default_report_mode = mode;
        }
        let log = &file.log;
        settings.log = LogSettings {
            call: log.call.unwrap_or(settings.log.call),
            success: log.success.unwrap_or(settings.log.success),
            failure: log.failure.unwrap_or(settings.log.failure),
            exception: log.exception.unwrap_or(settings.log.exception),
        };
    }

    if let Some(raw) = env(ENV_REPORT_MODE) {
        settings.default_report_mode = raw
            .parse::<ReportMode>()
            .with_context(|| format!("Invalid {}: {}", ENV_REPORT_MODE, raw))?;
    }
    if let Some(raw) = env(ENV_LOG_CALLS) {
        settings.log.call = raw
            .parse::<LogLevel>()
            .with_context(|| format!("Invalid {}: {}", ENV_LOG_CALLS, raw))?;
    }

    Ok(settings)
}

/// Load settings from all sources
pub fn load() -> Result<Settings> {
    let config_file = find_config_file();
    let file = config_file.as_deref().map(load_config_file).transpose()?;
    if let (Some(path), Some(file)) = (&config_file, &file) {
        debug!(
            path = %path.display(),
            version = file.version.as_deref().unwrap_or("unversioned"),
            "Loaded config file"
        );
    }

    let mut settings = resolve(file.as_ref(), |key| std::env::var(key).ok())?;
    settings.config_file = config_file;
    Ok(settings)
}

fn global() -> &'static RwLock<Arc<Settings>> {
    SETTINGS.get_or_init(|| {
        let settings = load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load settings, using defaults");
            Settings::default()
        });
        RwLock::new(Arc::new(settings))
    })
}

/// Get the process-wide settings (loads once, then cached)
pub fn settings() -> Arc<Settings> {
    let guard = global().read().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(&guard)
}

/// Replace the process-wide settings; later invocations see the new value
pub fn install(settings: Settings) {
    let mut guard = global().write().unwrap_or_else(PoisonError::into_inner);
    *guard = Arc::new(settings);
}
