//! Metrics describing the exporter's own collection passes.

use std::time::Duration;

use crate::error::{QueryError, RegistryError};
use crate::registry::{CounterFamily, GaugeFamily, MetricRegistry};

/// Per-data-source health instruments.
#[derive(Debug, Clone)]
pub struct SelfMetrics {
    up: GaugeFamily,
    scrape_duration: GaugeFamily,
    query_errors: CounterFamily,
    rows_skipped: CounterFamily,
}

impl SelfMetrics {
    pub fn register(registry: &MetricRegistry) -> Result<Self, RegistryError> {
        let source = vec!["data_source".to_string()];
        let source_query = vec!["data_source".to_string(), "query".to_string()];
        let source_query_kind = vec![
            "data_source".to_string(),
            "query".to_string(),
            "kind".to_string(),
        ];

        Ok(Self {
            up: registry.gauge(
                "sqlmetrics_up",
                "Whether the last pass reached the data source",
                &source,
            )?,
            scrape_duration: registry.gauge(
                "sqlmetrics_scrape_duration_seconds",
                "Duration of the last collection pass",
                &source,
            )?,
            query_errors: registry.counter(
                "sqlmetrics_query_errors",
                "Failed query executions",
                &source_query_kind,
            )?,
            rows_skipped: registry.counter(
                "sqlmetrics_rows_skipped",
                "Result rows dropped because they could not be converted",
                &source_query,
            )?,
        })
    }

    pub(crate) fn record_pass(&self, data_source: &str, connected: bool, elapsed: Duration) {
        let labels = [data_source.to_string()];
        self.up.set(&labels, if connected { 1.0 } else { 0.0 });
        self.scrape_duration.set(&labels, elapsed.as_secs_f64());
    }

    pub(crate) fn record_error(&self, data_source: &str, query: &str, error: &QueryError) {
        self.query_errors.inc(&[
            data_source.to_string(),
            query.to_string(),
            error.kind().to_string(),
        ]);
    }

    pub(crate) fn record_skipped(&self, data_source: &str, query: &str, rows: usize) {
        let labels = [data_source.to_string(), query.to_string()];
        self.rows_skipped.inc_by(&labels, rows as f64);
    }

    pub fn up(&self) -> &GaugeFamily {
        &self.up
    }

    pub fn query_errors(&self) -> &CounterFamily {
        &self.query_errors
    }

    pub fn rows_skipped(&self) -> &CounterFamily {
        &self.rows_skipped
    }
}
