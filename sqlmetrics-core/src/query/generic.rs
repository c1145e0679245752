//! Fixed-column strategy for scalar queries.
//!
//! The query is expected to return at most one row. Each declared column is
//! its own label-less instrument, named after the column's label.

use std::time::Duration;

use tracing::{debug, warn};

use crate::mapping::extract_numeric_value;
use crate::query::ApplyReport;
use crate::registry::{CounterFamily, CounterUpdate, GaugeFamily};
use crate::source::{Row, Value};

/// A gauge column and the value published when it has none.
#[derive(Debug, Clone)]
pub struct GaugeColumn {
    pub name: String,
    pub gauge: GaugeFamily,
    pub default_value: f64,
}

#[derive(Debug, Clone)]
pub struct CounterColumn {
    pub name: String,
    pub counter: CounterFamily,
}

#[derive(Debug, Clone)]
pub struct GenericQuery {
    name: String,
    sql: String,
    gauges: Vec<GaugeColumn>,
    counters: Vec<CounterColumn>,
    timeout: Option<Duration>,
}

impl GenericQuery {
    pub fn new(
        name: impl Into<String>,
        sql: impl Into<String>,
        gauges: Vec<GaugeColumn>,
        counters: Vec<CounterColumn>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            gauges,
            counters,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn gauges(&self) -> &[GaugeColumn] {
        &self.gauges
    }

    pub fn counters(&self) -> &[CounterColumn] {
        &self.counters
    }

    pub(crate) fn apply(&self, rows: &[Row]) -> ApplyReport {
        let mut report = ApplyReport::default();

        if rows.len() > 1 {
            debug!(
                query = %self.name,
                rows = rows.len(),
                "Generic query returned more than one row; using the first"
            );
        }
        let row = rows.first();

        for column in &self.gauges {
            let value = self
                .numeric_cell(row, &column.name)
                .unwrap_or(column.default_value);
            column.gauge.set(&[], value);
            report.observed += 1;
        }

        // Counters have no default that preserves monotonicity.
        for column in &self.counters {
            let Some(value) = self.numeric_cell(row, &column.name) else {
                continue;
            };

            match column.counter.advance_to(&[], value) {
                CounterUpdate::Regressed { current } => {
                    warn!(
                        query = %self.name,
                        column = %column.name,
                        current,
                        observed = value,
                        "Counter value decreased; keeping previous value"
                    );
                }
                CounterUpdate::Rejected => {
                    warn!(
                        query = %self.name,
                        column = %column.name,
                        observed = value,
                        "Counter value is negative or not finite; ignoring"
                    );
                }
                CounterUpdate::Advanced(_) | CounterUpdate::Unchanged => {}
            }
            report.observed += 1;
        }

        report
    }

    /// Numeric value of `column`, or `None` when it is absent, null or not a
    /// number. Non-numeric values are logged.
    fn numeric_cell(&self, row: Option<&Row>, column: &str) -> Option<f64> {
        let value = row?.get(column)?;
        let numeric = extract_numeric_value(value);
        if numeric.is_none() && *value != Value::Null {
            warn!(
                query = %self.name,
                column = %column,
                value = ?value,
                "Column value is not numeric; ignoring"
            );
        }
        numeric
    }
}
