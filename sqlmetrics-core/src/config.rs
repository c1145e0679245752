//! Metric configuration model.
//!
//! The document is a strict ownership tree: a [`MetricFile`] owns its
//! [`MetricConfig`]s, which own their [`MetricQuery`]s, which own their
//! [`Column`]s. Field names are PascalCase to match the JSON schema operators
//! already write for this exporter.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricFile {
    /// One entry per data source.
    #[serde(default)]
    pub configs: Vec<MetricConfig>,

    /// Default per-query timeout in milliseconds (default: 30000).
    #[serde(default = "default_timeout_ms")]
    pub millisecond_timeout: u64,

    /// Port of the scrape endpoint (default: 9399).
    #[serde(default = "default_server_port", deserialize_with = "deserialize_port")]
    pub server_port: u16,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_server_port() -> u16 {
    9399
}

impl Default for MetricFile {
    fn default() -> Self {
        Self {
            configs: Vec::new(),
            millisecond_timeout: default_timeout_ms(),
            server_port: default_server_port(),
        }
    }
}

impl MetricFile {
    /// Load configuration from a JSON or JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON or JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: MetricFile = json5::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    /// Validate structural requirements.
    ///
    /// Semantic problems (unknown usage kinds, blank data sources) are left
    /// to the factory and exporter so they only disable the offending part.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_port == 0 {
            return Err(ConfigError::Validation(
                "ServerPort must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }

    /// The file-level query timeout. Zero falls back to the built-in default.
    pub fn default_timeout(&self) -> Duration {
        match self.millisecond_timeout {
            0 => Duration::from_millis(default_timeout_ms()),
            ms => Duration::from_millis(ms),
        }
    }
}

/// Queries executed against one data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricConfig {
    /// Name used in logs and exporter metrics instead of the connection string.
    #[serde(default)]
    pub name: Option<String>,

    /// Opaque connection descriptor.
    #[serde(default)]
    pub data_source: Option<String>,

    #[serde(default)]
    pub queries: Vec<MetricQuery>,
}

impl MetricConfig {
    /// The connection descriptor, if one is present and not blank.
    pub fn data_source(&self) -> Option<&str> {
        self.data_source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Display name for this config; `index` is its position in the file.
    pub fn display_name(&self, index: usize) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("config-{}", index),
        }
    }
}

/// A single SQL query and the roles of its result columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricQuery {
    /// Metric name.
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// SQL text.
    pub query: String,

    #[serde(default)]
    pub query_usage: QueryUsage,

    /// Overrides [`MetricFile::millisecond_timeout`] for this query.
    #[serde(default)]
    pub millisecond_timeout: Option<u64>,

    #[serde(default)]
    pub columns: Vec<Column>,
}

impl MetricQuery {
    /// Per-query timeout override, if set to a non-zero value.
    pub fn timeout(&self) -> Option<Duration> {
        self.millisecond_timeout
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Role of one result column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Column {
    /// Column name in the SQL result set.
    pub name: String,

    pub column_usage: ColumnUsage,

    /// Position in the label tuple (default: 0).
    #[serde(default)]
    pub order: Option<i32>,

    /// Exposed label name or metric name (default: `name`).
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Value published by generic queries when the column is null or absent.
    #[serde(default)]
    pub default_value: Option<f64>,
}

impl Column {
    pub fn label(&self) -> &str {
        match self.label.as_deref() {
            Some(label) if !label.trim().is_empty() => label,
            _ => &self.name,
        }
    }

    pub fn order(&self) -> i32 {
        self.order.unwrap_or(0)
    }
}

/// How a query's result set is mapped onto instruments.
///
/// Unknown strings are kept rather than rejected so that a single bad query
/// fails in the factory instead of failing the whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QueryUsage {
    Counter,
    Gauge,
    /// Fixed set of label-less instruments. Written as `Empty` or `Generic`.
    #[default]
    Generic,
    Unrecognized(String),
}

impl From<String> for QueryUsage {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("counter") {
            QueryUsage::Counter
        } else if trimmed.eq_ignore_ascii_case("gauge") {
            QueryUsage::Gauge
        } else if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("empty")
            || trimmed.eq_ignore_ascii_case("generic")
        {
            QueryUsage::Generic
        } else {
            QueryUsage::Unrecognized(value)
        }
    }
}

impl From<QueryUsage> for String {
    fn from(value: QueryUsage) -> Self {
        value.to_string()
    }
}

impl fmt::Display for QueryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryUsage::Counter => f.write_str("Counter"),
            QueryUsage::Gauge => f.write_str("Gauge"),
            QueryUsage::Generic => f.write_str("Empty"),
            QueryUsage::Unrecognized(other) => f.write_str(other),
        }
    }
}

/// Role of a column within its query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnUsage {
    Counter,
    CounterLabel,
    Gauge,
    GaugeLabel,
    Unrecognized(String),
}

impl From<String> for ColumnUsage {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "counter" => ColumnUsage::Counter,
            "counterlabel" => ColumnUsage::CounterLabel,
            "gauge" => ColumnUsage::Gauge,
            "gaugelabel" => ColumnUsage::GaugeLabel,
            _ => ColumnUsage::Unrecognized(value),
        }
    }
}

impl From<ColumnUsage> for String {
    fn from(value: ColumnUsage) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ColumnUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnUsage::Counter => f.write_str("Counter"),
            ColumnUsage::CounterLabel => f.write_str("CounterLabel"),
            ColumnUsage::Gauge => f.write_str("Gauge"),
            ColumnUsage::GaugeLabel => f.write_str("GaugeLabel"),
            ColumnUsage::Unrecognized(other) => f.write_str(other),
        }
    }
}

/// Accept `ServerPort` as either a number or a numeric string.
fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    struct PortVisitor;

    impl Visitor<'_> for PortVisitor {
        type Value = u16;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a port number or a string containing one")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u16, E> {
            u16::try_from(v).map_err(|_| E::custom(format!("port out of range: {}", v)))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u16, E> {
            u16::try_from(v).map_err(|_| E::custom(format!("port out of range: {}", v)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u16, E> {
            if v.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&v) {
                Ok(v as u16)
            } else {
                Err(E::custom(format!("invalid port: {}", v)))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u16, E> {
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid port: {:?}", v)))
        }
    }

    deserializer.deserialize_any(PortVisitor)
}
