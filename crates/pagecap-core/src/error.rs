//! Error types for pagecap-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pagecap-core
#[derive(Error, Debug)]
pub enum Error {
    /// Page-context errors (evaluation failed, page gone)
    #[error("Page error: {0}")]
    Page(#[from] PageError),

    /// Download facility errors
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Settings store errors
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Runtime errors (channel failures, injection failures, etc.)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Page(err) => Some(err.remediation()),
            Self::Download(err) => Some(err.remediation()),
            Self::Settings(_) => Some(
                Remediation::new("Check that the data directory is writable, then retry.")
                    .command("Show setting", "pagecap settings show")
                    .alternative("Delete a corrupt settings.json to fall back to the default."),
            ),
            Self::Config(err) => Some(err.remediation()),
            Self::Runtime(_) => Some(
                Remediation::new("Restart the capture session or reload the page.")
                    .command("Watch again", "pagecap watch --url <profile-url>"),
            ),
        }
    }
}

/// Errors raised while talking to a page context
#[derive(Error, Debug)]
pub enum PageError {
    /// The page context is gone (tab closed, target detached)
    #[error("Page context closed: {0}")]
    Closed(String),

    /// Script evaluation inside the page failed
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// The history hook could not be installed
    #[error("Failed to install history hook: {0}")]
    HookInstall(String),
}

impl PageError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Closed(_) => Remediation::new(
                "The page was closed while a capture was in progress. Re-open the profile.",
            ),
            Self::Evaluation(_) => {
                Remediation::new("Page evaluation failed. Reload the page and retry.")
                    .alternative("Check that the heading selector matches the target site.")
            }
            Self::HookInstall(_) => Remediation::new(
                "Navigation hook could not be installed. Reload the page to re-activate capture.",
            ),
        }
    }
}

/// Errors reported by the download facility
#[derive(Error, Debug)]
pub enum DownloadError {
    /// URL is not a data URI this facility understands
    #[error("Unsupported download URL: {0}")]
    InvalidUrl(String),

    /// Target filename is absolute, empty, or escapes the download root
    #[error("Invalid target filename: {0}")]
    InvalidFilename(String),

    /// Every uniquified candidate name is taken
    #[error("No free filename for {0}")]
    Exhausted(String),

    /// Filesystem failure
    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::InvalidUrl(_) => Remediation::new("Only data: URIs can be persisted."),
            Self::InvalidFilename(_) => Remediation::new(
                "Use a relative artifact namespace without `..` components.",
            )
            .command("Check config", "pagecap config"),
            Self::Exhausted(_) => Remediation::new(
                "Too many artifacts share one name. Archive the partition directory and retry.",
            ),
            Self::Io(_) => Remediation::new("Check that the download directory is writable.")
                .command("Check config", "pagecap config"),
        }
    }
}

/// Settings store errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Read(std::io::Error),

    #[error("failed to write settings: {0}")]
    Write(std::io::Error),

    #[error("settings file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Config value out of range
    #[error("Invalid config value: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::ReadFailed { path, .. } => {
                Remediation::new(format!("Check that {path} exists and is readable."))
                    .command("Show defaults", "pagecap config")
            }
            Self::ParseError(_) => Remediation::new("Fix the TOML syntax in pagecap.toml.")
                .command("Show defaults", "pagecap config")
                .alternative("Remove the file to fall back to built-in defaults."),
            Self::ValidationError(_) => {
                Remediation::new("Adjust the offending value in pagecap.toml.")
                    .command("Show effective config", "pagecap config")
            }
        }
    }
}
