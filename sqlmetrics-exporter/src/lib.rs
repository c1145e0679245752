//! Prometheus exporter for SQL query results.
//!
//! This crate wires the [`sqlmetrics_core`] engine to real databases through
//! `sqlx` and serves the scrape endpoint over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Databases    │<────│   Collectors    │<────│   HTTP Server   │
//! │ (sqlx, 1 conn)  │     │ (one per source)│     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Each request to `/metrics` runs every configured query, then encodes the
//! registry.
//!
//! # Usage
//!
//! ```bash
//! sqlmetrics-exporter serve --config-file metrics.json
//! ```

pub mod args;
pub mod error;
pub mod http;
pub mod settings;
pub mod sql;

pub use args::{Cli, Command, ServeArgs};
pub use error::{Error, Result};
pub use http::{HttpServer, create_router};
pub use settings::{LogFormat, LoggingConfig, init_tracing, listen_addr, load_metric_file};
pub use sql::{SqlxConnection, SqlxDataSource};
