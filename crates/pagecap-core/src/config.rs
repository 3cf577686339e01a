//! Configuration management for pagecap
//!
//! Handles loading and validation of pagecap.toml configuration files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Config file name looked up under the platform config directory.
pub const CONFIG_FILE_NAME: &str = "pagecap.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Which pages are capture targets
    #[serde(default)]
    pub target: TargetConfig,

    /// Capture timing settings
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Artifact persistence settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Visual feedback settings
    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Agent → coordinator channel settings
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly colored output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Optional log file (appended to)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Data directory (settings store, default download root)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            log_file: None,
            data_dir: default_data_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pagecap")
}

/// Target page configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    /// Host that navigation signals must match exactly
    #[serde(default = "default_target_host")]
    pub host: String,

    /// Path prefix identifying a profile page
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_target_host(),
            path_prefix: default_path_prefix(),
        }
    }
}

fn default_target_host() -> String {
    "www.linkedin.com".to_string()
}

fn default_path_prefix() -> String {
    "/in/".to_string()
}

/// What to do with an in-flight capture when a newer one starts on the same page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Every attempt runs to completion and emits its event
    #[default]
    Concurrent,
    /// An attempt that was overtaken by a newer one drops its event
    Supersede,
}

/// Capture timing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Heading poll interval while resolving the derived name
    #[serde(default = "default_name_poll_interval")]
    pub name_poll_interval_ms: u64,

    /// Give up on the heading after this long and use the sentinel name
    #[serde(default = "default_name_timeout")]
    pub name_timeout_ms: u64,

    /// CSS selector for the heading element (browser host)
    #[serde(default = "default_heading_selector")]
    pub heading_selector: String,

    /// Interval between document-extent samples
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,

    /// Settle period after a repeated sample
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// Upper bound on extent samples per capture
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Upper bound on wall-clock time spent stabilizing
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,

    /// Overlapping capture attempts on one page
    #[serde(default)]
    pub overlap: OverlapPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            name_poll_interval_ms: default_name_poll_interval(),
            name_timeout_ms: default_name_timeout(),
            heading_selector: default_heading_selector(),
            sample_interval_ms: default_sample_interval(),
            settle_ms: default_settle(),
            max_rounds: default_max_rounds(),
            max_wait_ms: default_max_wait(),
            overlap: OverlapPolicy::default(),
        }
    }
}

fn default_name_poll_interval() -> u64 {
    100
}

fn default_name_timeout() -> u64 {
    10_000
}

fn default_heading_selector() -> String {
    "h1".to_string()
}

fn default_sample_interval() -> u64 {
    400
}

fn default_settle() -> u64 {
    1000
}

fn default_max_rounds() -> u32 {
    750
}

fn default_max_wait() -> u64 {
    300_000
}

impl CaptureConfig {
    #[must_use]
    pub fn name_poll_interval(&self) -> Duration {
        Duration::from_millis(self.name_poll_interval_ms)
    }

    #[must_use]
    pub fn name_timeout(&self) -> Duration {
        Duration::from_millis(self.name_timeout_ms)
    }

    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Artifact persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// Top-level folder for all artifacts
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// File name prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// File extension (without dot)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// MIME type of the data URI handed to the download facility
    #[serde(default = "default_mime")]
    pub mime: String,

    /// Download root; defaults to `<data_dir>/downloads`
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            prefix: default_prefix(),
            extension: default_extension(),
            mime: default_mime(),
            download_dir: None,
        }
    }
}

fn default_namespace() -> String {
    "LinkedIn_Profiles".to_string()
}

fn default_prefix() -> String {
    "linkedin".to_string()
}

fn default_extension() -> String {
    "html".to_string()
}

fn default_mime() -> String {
    "text/html".to_string()
}

/// Visual feedback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackConfig {
    /// How long a success/failure badge stays up
    #[serde(default = "default_flash")]
    pub flash_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            flash_ms: default_flash(),
        }
    }
}

fn default_flash() -> u64 {
    1200
}

impl FeedbackConfig {
    #[must_use]
    pub fn flash(&self) -> Duration {
        Duration::from_millis(self.flash_ms)
    }
}

/// Channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Bounded capacity of the capture request queue
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    64
}

impl Config {
    /// Default config file location (`<config_dir>/pagecap/pagecap.toml`)
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pagecap").join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location, falling back to defaults
    /// when no file exists.
    pub fn load() -> crate::Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(raw: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// Reject values that would stall or misdirect the capture loop
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("capture.name_poll_interval_ms", self.capture.name_poll_interval_ms),
            ("capture.sample_interval_ms", self.capture.sample_interval_ms),
            ("capture.max_wait_ms", self.capture.max_wait_ms),
            ("feedback.flash_ms", self.feedback.flash_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!("{key} must be > 0")));
            }
        }
        if self.capture.max_rounds < 2 {
            return Err(ConfigError::ValidationError(
                "capture.max_rounds must be >= 2".to_string(),
            ));
        }
        if self.channel.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "channel.capacity must be >= 1".to_string(),
            ));
        }
        if self.target.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "target.host must not be empty".to_string(),
            ));
        }
        if !self.target.path_prefix.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "target.path_prefix must start with '/'".to_string(),
            ));
        }
        if self.persistence.namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "persistence.namespace must not be empty".to_string(),
            ));
        }
        if self.persistence.extension.contains('.') || self.persistence.extension.is_empty() {
            return Err(ConfigError::ValidationError(
                "persistence.extension must be a bare extension like \"html\"".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective download root
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.persistence
            .download_dir
            .clone()
            .unwrap_or_else(|| self.general.data_dir.join("downloads"))
    }

    /// Settings store location
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.general.data_dir.join(crate::settings::SETTINGS_FILE_NAME)
    }
}
