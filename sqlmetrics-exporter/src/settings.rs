//! Runtime settings resolved from the command line.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use clap::ValueEnum;
use sqlmetrics_core::MetricFile;
use tracing::info;

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,

    /// Log output format: "text" or "json".
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Driver logs are
/// capped at `warn` unless `RUST_LOG` says otherwise.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("{},sqlx=warn", config.level))
            .map_err(|_| Error::LogFilter(config.level.clone()))?,
    };

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Tracing(e.to_string()))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Tracing(e.to_string()))?;
        }
    }

    Ok(())
}

/// Load the metric file, preferring inline text over the file on disk.
pub fn load_metric_file(path: &Path, inline: Option<&str>) -> Result<MetricFile> {
    match inline.filter(|text| !text.trim().is_empty()) {
        Some(text) => {
            info!("Loading metric configuration from inline text");
            Ok(MetricFile::parse(text)?)
        }
        None => {
            info!(path = %path.display(), "Loading metric configuration");
            Ok(MetricFile::load_from_file(path)?)
        }
    }
}

/// Address the scrape endpoint listens on.
pub fn listen_addr(file: &MetricFile, listen: Option<SocketAddr>) -> SocketAddr {
    listen.unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, file.server_port)))
}
