use sqlmetrics_core::{ConfigError, RegistryError};
use thiserror::Error;

/// Startup errors of the exporter process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to register exporter metrics: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),

    #[error("Invalid log filter '{0}'")]
    LogFilter(String),
}

/// Result type alias using the exporter's Error.
pub type Result<T> = std::result::Result<T, Error>;
