//! Error types for query construction and execution.

use std::time::Duration;

use thiserror::Error;

use crate::registry::InstrumentKind;

/// Errors raised while creating or looking up instruments.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The name is already taken by an instrument of another kind.
    #[error("Metric '{name}' is already registered as a {registered}, not a {requested}")]
    KindMismatch {
        name: String,
        registered: InstrumentKind,
        requested: InstrumentKind,
    },

    /// The name is already taken with a different label set.
    #[error("Metric '{name}' is already registered with labels [{registered}], not [{requested}]")]
    LabelMismatch {
        name: String,
        registered: String,
        requested: String,
    },

    /// Two label columns map to the same label name.
    #[error("Metric '{name}' declares label '{label}' more than once")]
    DuplicateLabel { name: String, label: String },
}

/// Errors raised by the query factory.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Undefined QueryUsage '{usage}' for query '{query}'")]
    UnrecognizedUsage { query: String, usage: String },

    #[error("Failed to create instruments for query '{query}': {source}")]
    Registry {
        query: String,
        #[source]
        source: RegistryError,
    },
}

/// Errors reported by a data source.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The data source could not be reached or the session was lost.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The statement was rejected or failed while running.
    #[error("Query failed: {0}")]
    Query(String),
}

impl DataSourceError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Whether the remaining queries of a pass should be abandoned.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Outcome of a single failed query attempt.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),
}

impl QueryError {
    /// Short failure kind used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Timeout(_) => "timeout",
            QueryError::DataSource(DataSourceError::Connection(_)) => "connection",
            QueryError::DataSource(DataSourceError::Query(_)) => "query",
        }
    }
}
