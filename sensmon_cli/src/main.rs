mod cli;
mod error_fmt;
mod monitor;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use sensmon_config::Config;
use sensmon_core::error::{MonitorError, Result};

fn config_err(e: &eyre::Report) -> MonitorError {
    MonitorError::Config(format!("{e:#}"))
}

/// Read, calibrate and validate the configuration.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| MonitorError::Config(format!("read {}: {e}", path.display())))?;
            sensmon_config::load_toml(&text)
                .map_err(|e| MonitorError::Config(format!("parse {}: {e}", path.display())))?
        }
        None => Config::default(),
    };
    if let Some(path) = &cli.calibration {
        let cal = sensmon_config::load_calibration_csv(path).map_err(|e| config_err(&e))?;
        cfg.apply_calibration(&cal).map_err(|e| config_err(&e))?;
        tracing::debug!(channels = cal.len(), "calibration applied");
    }
    cfg.validate().map_err(|e| config_err(&e))?;
    Ok(cfg)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console layer on stderr, plus a JSON file layer when `[logging].file` is set.
/// The returned guard must outlive every log call.
fn init_tracing(cli: &Cli, logging: Option<&sensmon_config::Logging>) -> Result<Option<WorkerGuard>> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let console: BoxedLayer = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };
    let mut layers = vec![console];
    let mut file_guard = None;

    if let Some(logging) = logging
        && let Some(file) = logging.file.as_deref()
    {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| MonitorError::Config(format!("logging.file '{file}' has no file name")))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        let level = logging.level.as_deref().unwrap_or("info");
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new(level))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(file_guard)
}

fn execute(cli: &Cli, cfg: &Config) -> Result<()> {
    match cli.cmd {
        Commands::Run { duration_s } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
                tracing::warn!(error = %e, "Ctrl-C handler not installed");
            }
            let summary = monitor::run(cfg, duration_s.map(Duration::from_secs), &shutdown)?;
            monitor::print_run_summary(&summary, cli.json);
        }
        Commands::Snapshot { wait_ms } => {
            let snap = monitor::snapshot(cfg, Duration::from_millis(wait_ms))?;
            monitor::print_snapshot(&snap, cli.json);
        }
        Commands::SelfCheck => monitor::self_check(cfg)?,
        Commands::Health { wait_ms } => monitor::health(cfg, Duration::from_millis(wait_ms))?,
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let loaded = load_config(&cli);
    let guard = match init_tracing(&cli, loaded.as_ref().ok().map(|c| &c.logging)) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("warning: logging disabled: {e:#}");
            None
        }
    };

    let result = loaded.and_then(|cfg| execute(&cli, &cfg));
    if let Err(err) = result {
        tracing::debug!(error = ?err, "command failed");
        if cli.json {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        drop(guard);
        std::process::exit(exit_code_for_error(&err));
    }
}
