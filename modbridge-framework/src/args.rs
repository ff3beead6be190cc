//! Command line arguments.

use std::path::PathBuf;

use clap::Parser;

use modbridge_common::{LogFormat, LoggingConfig};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG: &str = "modbus.json5";

#[derive(Parser, Debug, Clone)]
#[command(name = "modbridge", version, about = "Demand-driven Modbus to Zenoh bridge")]
pub struct BridgeArgs {
    /// Path to the JSON5 configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override the configured log filter (e.g. "debug" or "modbridge=trace").
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines regardless of the configured format.
    #[arg(long)]
    pub json_logs: bool,
}

impl BridgeArgs {
    /// Parse the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Apply command line overrides on top of the configured logging section.
    pub fn logging(&self, configured: &LoggingConfig) -> LoggingConfig {
        LoggingConfig {
            level: self
                .log_level
                .clone()
                .unwrap_or_else(|| configured.level.clone()),
            format: if self.json_logs {
                LogFormat::Json
            } else {
                configured.format
            },
        }
    }
}
