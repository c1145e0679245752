//! On-demand collection of one data source.
//!
//! A collector owns the compiled queries of a single [`MetricConfig`] and runs
//! them, in declaration order, each time a scrape asks for fresh values.
//!
//! [`MetricConfig`]: crate::config::MetricConfig

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{DataSourceError, QueryError};
use crate::query::QueryStrategy;
use crate::self_metrics::SelfMetrics;
use crate::source::{Connection, DataSource, Row};

/// Lifecycle of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Collecting,
}

/// Outcome of one collection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectReport {
    pub data_source: String,
    pub queries_succeeded: usize,
    pub queries_failed: usize,
    /// Queries never attempted because the data source was unreachable.
    pub queries_skipped: usize,
    pub rows_skipped: usize,
    /// False when a connection attempt failed during the pass.
    pub connected: bool,
    pub elapsed: Duration,
}

impl CollectReport {
    fn new(data_source: &str) -> Self {
        Self {
            data_source: data_source.to_string(),
            queries_succeeded: 0,
            queries_failed: 0,
            queries_skipped: 0,
            rows_skipped: 0,
            connected: true,
            elapsed: Duration::ZERO,
        }
    }

    /// Whether every query ran and produced rows.
    pub fn is_clean(&self) -> bool {
        self.connected && self.queries_failed == 0 && self.queries_skipped == 0
    }
}

/// Puts the collector back to [`Phase::Idle`] however the pass ends.
struct PhaseGuard<'a> {
    phase: &'a Mutex<Phase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a Mutex<Phase>) -> Self {
        *phase.lock() = Phase::Collecting;
        Self { phase }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.phase.lock() = Phase::Idle;
    }
}

/// Runs the queries of one data source when a scrape is requested.
pub struct OnDemandCollector<D: DataSource> {
    name: String,
    source: D,
    queries: Vec<QueryStrategy>,
    default_timeout: Duration,
    pass: tokio::sync::Mutex<()>,
    phase: Mutex<Phase>,
    self_metrics: Option<SelfMetrics>,
}

impl<D: DataSource> OnDemandCollector<D> {
    pub fn new(
        name: impl Into<String>,
        source: D,
        queries: Vec<QueryStrategy>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            queries,
            default_timeout,
            pass: tokio::sync::Mutex::new(()),
            phase: Mutex::new(Phase::Idle),
            self_metrics: None,
        }
    }

    /// Report pass health through `metrics`.
    pub fn with_self_metrics(mut self, metrics: SelfMetrics) -> Self {
        self.self_metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    pub fn queries(&self) -> &[QueryStrategy] {
        &self.queries
    }

    /// Run one collection pass.
    ///
    /// Passes of the same collector never overlap: a caller arriving while a
    /// pass is in flight waits for it and then runs its own. Failures are
    /// logged and reported; they never escape as errors.
    pub async fn collect(&self) -> CollectReport {
        let _pass = self.pass.lock().await;
        let _phase = PhaseGuard::enter(&self.phase);

        let started = Instant::now();
        let mut report = CollectReport::new(&self.name);
        let mut connection: Option<D::Connection> = None;

        for (index, query) in self.queries.iter().enumerate() {
            let timeout = query.timeout().unwrap_or(self.default_timeout);

            if connection.is_none() {
                match self.connect(timeout).await {
                    Ok(conn) => connection = Some(conn),
                    Err(e) => {
                        error!(
                            data_source = %self.name,
                            error = %e,
                            "Failed to connect; skipping remaining queries"
                        );
                        self.record_error(query, &QueryError::DataSource(e));
                        report.connected = false;
                        report.queries_skipped = self.queries.len() - index;
                        break;
                    }
                }
            }
            let Some(conn) = connection.as_mut() else {
                break;
            };

            match execute(conn, query.sql(), timeout).await {
                Ok(rows) => {
                    let applied = query.apply(&rows);
                    debug!(
                        data_source = %self.name,
                        query = %query.name(),
                        rows = rows.len(),
                        observed = applied.observed,
                        "Query collected"
                    );
                    if applied.skipped > 0 {
                        report.rows_skipped += applied.skipped;
                        if let Some(metrics) = &self.self_metrics {
                            metrics.record_skipped(&self.name, query.name(), applied.skipped);
                        }
                    }
                    report.queries_succeeded += 1;
                }
                Err(e) => {
                    self.record_error(query, &e);
                    report.queries_failed += 1;

                    match &e {
                        QueryError::Timeout(_) => {
                            error!(
                                data_source = %self.name,
                                query = %query.name(),
                                timeout_ms = timeout.as_millis() as u64,
                                "Query timed out"
                            );
                            // The cancelled statement may still own the session.
                            connection = None;
                        }
                        QueryError::DataSource(source) if source.is_connection() => {
                            error!(
                                data_source = %self.name,
                                query = %query.name(),
                                error = %source,
                                "Lost connection; skipping remaining queries"
                            );
                            report.connected = false;
                            report.queries_skipped = self.queries.len() - index - 1;
                            break;
                        }
                        QueryError::DataSource(source) => {
                            warn!(
                                data_source = %self.name,
                                query = %query.name(),
                                error = %source,
                                "Query failed"
                            );
                        }
                    }
                }
            }
        }

        report.elapsed = started.elapsed();
        if let Some(metrics) = &self.self_metrics {
            metrics.record_pass(&self.name, report.connected, report.elapsed);
        }

        debug!(
            data_source = %self.name,
            succeeded = report.queries_succeeded,
            failed = report.queries_failed,
            skipped = report.queries_skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Collection pass finished"
        );
        report
    }

    async fn connect(&self, timeout: Duration) -> Result<D::Connection, DataSourceError> {
        tokio::time::timeout(timeout, self.source.connect())
            .await
            .map_err(|_| {
                DataSourceError::connection(format!(
                    "connect timed out after {}ms",
                    timeout.as_millis()
                ))
            })?
    }

    fn record_error(&self, query: &QueryStrategy, error: &QueryError) {
        if let Some(metrics) = &self.self_metrics {
            metrics.record_error(&self.name, query.name(), error);
        }
    }
}

impl<D: DataSource> std::fmt::Debug for OnDemandCollector<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnDemandCollector")
            .field("name", &self.name)
            .field("queries", &self.queries.len())
            .field("default_timeout", &self.default_timeout)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Run `sql` on `conn`, giving up after `timeout`.
async fn execute<C: Connection>(
    conn: &mut C,
    sql: &str,
    timeout: Duration,
) -> Result<Vec<Row>, QueryError> {
    match tokio::time::timeout(timeout, conn.query(sql)).await {
        Ok(rows) => Ok(rows?),
        Err(_) => Err(QueryError::Timeout(timeout)),
    }
}
