//! pagecap CLI
//!
//! Thin wrapper over `pagecap-core`: the auto-capture settings surface, an
//! artifact path preview, the effective configuration, and (feature
//! `browser`) a live capture session against Chrome.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use pagecap_core::artifact::artifact_path;
use pagecap_core::config::{Config, LogFormat};
use pagecap_core::error::{ConfigError, Remediation};
use pagecap_core::logging::{LogConfig, init_logging};
use pagecap_core::naming::derive_name;
use pagecap_core::settings::{FileSettingsStore, SettingsStore, status_message};

#[derive(Parser)]
#[command(name = "pagecap")]
#[command(author, version, about = "Archive single-page-app documents once their lazy content settles")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (defaults to <config_dir>/pagecap/pagecap.toml)
    #[arg(long, global = true, env = "PAGECAP_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory holding settings and downloads
    #[arg(long, global = true, env = "PAGECAP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the auto-capture setting
    Settings {
        #[arg(value_enum, default_value_t = SettingsAction::Show)]
        action: SettingsAction,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Preview where a capture of NAME would be stored
    Path {
        /// Heading text to derive the name from
        name: String,

        /// Capture instant (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Open URL in Chrome and capture target pages until Ctrl-C
    #[cfg(feature = "browser")]
    Watch {
        /// Page to open
        #[arg(long)]
        url: String,

        /// Run without a visible window
        #[arg(long)]
        headless: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SettingsAction {
    Show,
    On,
    Off,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsReport {
    auto_save_enabled: bool,
    path: PathBuf,
    message: &'static str,
}

fn load_config(global: &GlobalOpts) -> Result<Config> {
    let mut config = match &global.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load().context("loading default config")?,
    };
    if let Some(dir) = &global.data_dir {
        config.general.data_dir.clone_from(dir);
    }
    if let Some(level) = &global.log_level {
        config.general.log_level.clone_from(level);
    }
    if let Some(format) = global.log_format {
        config.general.log_format = format;
    }
    config.validate().context("validating config")?;
    Ok(config)
}

async fn run_settings(config: &Config, action: SettingsAction, json: bool) -> Result<()> {
    let store = FileSettingsStore::new(config.settings_path());
    match action {
        SettingsAction::Show => {}
        SettingsAction::On => store.set_auto_capture_enabled(true).await?,
        SettingsAction::Off => store.set_auto_capture_enabled(false).await?,
    }
    let enabled = store
        .auto_capture_enabled()
        .await
        .with_context(|| format!("reading {}", store.path().display()))?;

    if json {
        let report = SettingsReport {
            auto_save_enabled: enabled,
            path: store.path().to_path_buf(),
            message: status_message(enabled),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", status_message(enabled));
    }
    Ok(())
}

fn run_path(config: &Config, name: &str, at: Option<DateTime<Utc>>) {
    let derived = derive_name(name);
    let relative = artifact_path(&config.persistence, &derived, at.unwrap_or_else(Utc::now));
    println!("{}", config.download_dir().join(relative).display());
}

#[cfg(feature = "browser")]
async fn run_watch(config: &Config, url: &str, headless: bool) -> Result<()> {
    use std::sync::Arc;

    use pagecap_core::agent::CaptureAgent;
    use pagecap_core::browser::{BrowserHost, CdpPage};
    use pagecap_core::channel::capture_channel;
    use pagecap_core::context::PageContext;
    use pagecap_core::coordinator::{CaptureCoordinator, ScriptInjector};
    use pagecap_core::downloads::FsDownloads;
    use pagecap_core::feedback::{FeedbackIndicator, LogBadgeSurface};
    use pagecap_core::host::AgentHost;
    use pagecap_core::target::TargetPattern;
    use tokio::sync::{mpsc, watch};

    let settings = Arc::new(FileSettingsStore::new(config.settings_path()));
    let target = TargetPattern::from(&config.target);
    let (outbox, inbox) = capture_channel(config.channel.capacity);
    let agent = Arc::new(CaptureAgent::new(
        Arc::clone(&settings),
        outbox,
        config.capture.clone(),
        target.clone(),
    ));
    let host: Arc<AgentHost<_, CdpPage>> = Arc::new(AgentHost::new(agent));
    let coordinator = Arc::new(CaptureCoordinator::new(
        Arc::clone(&settings),
        FsDownloads::new(config.download_dir()),
        FeedbackIndicator::new(LogBadgeSurface, config.feedback.flash()),
        Arc::clone(&host),
        target.clone(),
        config.persistence.clone(),
    ));

    let (events_tx, events_rx) = mpsc::channel(config.channel.capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let browser = BrowserHost::launch(headless, &config.capture.heading_selector, events_tx).await?;
    let run = tokio::spawn(Arc::clone(&coordinator).run(inbox, events_rx, shutdown_rx));

    let page = browser.open(url).await?;
    let context = page.context_id();
    host.register_page(page);
    // Full page loads run the agent directly; in-app navigations go through the coordinator.
    if target.matches_signal(url) {
        match host.inject(&context, url).await {
            Ok(activation) => tracing::info!(context = %context, ?activation, "Agent activated"),
            Err(err) => tracing::warn!(context = %context, error = %err, "Agent activation failed"),
        }
    }

    println!("Watching {url}. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    let _ = shutdown_tx.send(true);
    run.await.context("coordinator task")?;
    browser.close().await;
    Ok(())
}

fn remediation_for(err: &anyhow::Error) -> Option<Remediation> {
    err.chain().find_map(|cause| {
        if let Some(core) = cause.downcast_ref::<pagecap_core::Error>() {
            core.remediation()
        } else {
            cause.downcast_ref::<ConfigError>().map(ConfigError::remediation)
        }
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.global)?;
    init_logging(&LogConfig::from(&config.general)).context("initializing logging")?;

    match cli.command {
        Commands::Settings { action, json } => run_settings(&config, action, json).await,
        Commands::Path { name, at } => {
            run_path(&config, &name, at);
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        #[cfg(feature = "browser")]
        Commands::Watch { url, headless } => run_watch(&config, &url, headless).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(remediation) = remediation_for(&err) {
                eprintln!();
                eprintln!("{}", remediation.render_plain());
            }
            ExitCode::FAILURE
        }
    }
}
