//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "sensmon", version, about = "DC current sensor monitor")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Optional calibration CSV (strict header: channel,volts,amps)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log and print results as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins when set
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor until Ctrl-C, the duration elapses, or the bus is lost for good
    Run {
        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration_s: Option<u64>,
    },
    /// Sample for a while and print the smoothed channel values
    Snapshot {
        /// How long to sample before printing
        #[arg(long, value_name = "MS", default_value_t = 1500)]
        wait_ms: u64,
    },
    /// Verify config and calibration and connect the analog bus once
    SelfCheck,
    /// Report bus status after a short acquisition run
    Health {
        /// How long to run acquisition before reporting
        #[arg(long, value_name = "MS", default_value_t = 500)]
        wait_ms: u64,
    },
}
