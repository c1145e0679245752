//! CLI argument parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::settings::{LogFormat, LoggingConfig};

/// Publish SQL query results as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "sqlmetrics-exporter")]
#[command(about = "Export SQL query results as Prometheus metrics")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the scrape endpoint.
    Serve(ServeArgs),
}

/// Options of the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Path to the metric configuration file (JSON or JSON5).
    #[arg(long, env = "SQLMETRICS_CONFIG_FILE", default_value = "metrics.json")]
    pub config_file: PathBuf,

    /// Inline metric configuration; used instead of the file when not blank.
    #[arg(long, env = "SQLMETRICS_CONFIG_TEXT")]
    pub config_text: Option<String>,

    /// Publish sqlmetrics_* health metrics for every data source.
    #[arg(long, env = "SQLMETRICS_ADD_EXPORTER_METRICS")]
    pub add_exporter_metrics: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SQLMETRICS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "SQLMETRICS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// HTTP listen address (overrides ServerPort).
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

impl ServeArgs {
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }
}
