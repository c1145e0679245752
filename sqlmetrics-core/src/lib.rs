//! Query-to-metric mapping engine for sqlmetrics.
//!
//! This crate turns SQL result sets into Prometheus instruments. An operator
//! declares queries in a [`MetricFile`]; each query's columns are annotated as
//! labels or values, and every scrape re-runs the queries and writes the rows
//! into a shared [`MetricRegistry`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   MetricFile    │────>│     Factory     │────>│ QueryStrategy   │
//! │ (config model)  │     │  (build_query)  │     │ (counter/gauge/ │
//! └─────────────────┘     └─────────────────┘     │    generic)     │
//!                                                 └────────┬────────┘
//! ┌─────────────────┐     ┌─────────────────┐              │
//! │   DataSource    │<────│OnDemandCollector│<─────────────┘
//! │  (SQL session)  │     │ (one per source)│────> MetricRegistry
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sqlmetrics_core::{Exporter, ExporterOptions, MetricFile, MetricRegistry};
//!
//! let file = MetricFile::load_from_file("metrics.json")?;
//! let exporter = Exporter::build(
//!     &file,
//!     Arc::new(MetricRegistry::new()),
//!     ExporterOptions::default(),
//!     |_name, url| MySource::open(url),
//! )?;
//! let body = exporter.scrape().await?;
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod factory;
pub mod mapping;
pub mod query;
pub mod registry;
pub mod self_metrics;
pub mod source;

pub use collector::{CollectReport, OnDemandCollector, Phase};
pub use config::{Column, ColumnUsage, ConfigError, MetricConfig, MetricFile, MetricQuery, QueryUsage};
pub use error::{BuildError, DataSourceError, QueryError, RegistryError};
pub use exporter::{Exporter, ExporterOptions};
pub use factory::build_query;
pub use query::QueryStrategy;
pub use registry::{MetricRegistry, SharedRegistry};
pub use self_metrics::SelfMetrics;
pub use source::{Connection, DataSource, Row, Value};
