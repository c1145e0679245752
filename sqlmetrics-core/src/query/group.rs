//! Label-set strategies.
//!
//! Every row of the result set is one observation of a single metric,
//! addressed by the tuple of its label column values in `Order` sequence.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::mapping::{extract_numeric_value, label_value};
use crate::query::ApplyReport;
use crate::registry::{CounterFamily, CounterUpdate, GaugeFamily, MetricRegistry};
use crate::source::Row;

/// A label or value column of a group query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupColumn {
    /// Column name in the result set.
    pub name: String,
    pub order: i32,
    /// Exposed label name.
    pub label: String,
}

impl GroupColumn {
    pub fn new(name: impl Into<String>, order: i32, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order,
            label: label.into(),
        }
    }
}

/// What a group query needs to know besides its instrument.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub name: String,
    pub description: String,
    pub sql: String,
    pub labels: Vec<GroupColumn>,
    pub value: Option<GroupColumn>,
    pub timeout: Option<Duration>,
}

impl GroupSpec {
    /// Sort label columns by ascending `Order`, keeping declaration order on ties.
    fn normalized(mut self) -> Self {
        self.labels.sort_by_key(|column| column.order);
        if self.value.is_none() {
            warn!(
                query = %self.name,
                "Query has no value column; it will run but never record a value"
            );
        }
        self
    }

    fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|c| c.label.clone()).collect()
    }

    /// Turn rows into `(label values, value)` observations.
    ///
    /// Rows with a missing label column or a non-numeric value are skipped
    /// individually.
    fn observations(&self, rows: &[Row], report: &mut ApplyReport) -> Vec<(Vec<String>, f64)> {
        let Some(value_column) = &self.value else {
            return Vec::new();
        };

        let mut observations = Vec::with_capacity(rows.len());
        'rows: for (index, row) in rows.iter().enumerate() {
            let mut values = Vec::with_capacity(self.labels.len());
            for column in &self.labels {
                match row.get(&column.name) {
                    Some(value) => values.push(label_value(value)),
                    None => {
                        warn!(
                            query = %self.name,
                            row = index,
                            column = %column.name,
                            "Label column missing from result; skipping row"
                        );
                        report.skipped += 1;
                        continue 'rows;
                    }
                }
            }

            match row.get(&value_column.name).and_then(extract_numeric_value) {
                Some(value) => observations.push((values, value)),
                None => {
                    warn!(
                        query = %self.name,
                        row = index,
                        column = %value_column.name,
                        "Value column is missing or not numeric; skipping row"
                    );
                    report.skipped += 1;
                }
            }
        }
        observations
    }
}

/// Publishes each row as a gauge set to the observed value.
#[derive(Debug, Clone)]
pub struct GaugeGroupQuery {
    spec: GroupSpec,
    gauge: GaugeFamily,
}

impl GaugeGroupQuery {
    pub fn new(spec: GroupSpec, registry: &MetricRegistry) -> Result<Self, RegistryError> {
        let spec = spec.normalized();
        let gauge = registry.gauge(&spec.name, &spec.description, &spec.label_names())?;
        Ok(Self { spec, gauge })
    }

    pub fn spec(&self) -> &GroupSpec {
        &self.spec
    }

    pub fn gauge(&self) -> &GaugeFamily {
        &self.gauge
    }

    pub(crate) fn apply(&self, rows: &[Row]) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (labels, value) in self.spec.observations(rows, &mut report) {
            self.gauge.set(&labels, value);
            report.observed += 1;
        }
        report
    }
}

/// Publishes each row as a counter advanced to the observed cumulative value.
#[derive(Debug, Clone)]
pub struct CounterGroupQuery {
    spec: GroupSpec,
    counter: CounterFamily,
}

impl CounterGroupQuery {
    pub fn new(spec: GroupSpec, registry: &MetricRegistry) -> Result<Self, RegistryError> {
        let spec = spec.normalized();
        let counter = registry.counter(&spec.name, &spec.description, &spec.label_names())?;
        Ok(Self { spec, counter })
    }

    pub fn spec(&self) -> &GroupSpec {
        &self.spec
    }

    pub fn counter(&self) -> &CounterFamily {
        &self.counter
    }

    pub(crate) fn apply(&self, rows: &[Row]) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (labels, value) in self.spec.observations(rows, &mut report) {
            match self.counter.advance_to(&labels, value) {
                CounterUpdate::Advanced(delta) => {
                    debug!(query = %self.spec.name, ?labels, delta, "Counter advanced");
                }
                CounterUpdate::Unchanged => {}
                CounterUpdate::Regressed { current } => {
                    warn!(
                        query = %self.spec.name,
                        ?labels,
                        current,
                        observed = value,
                        "Counter value decreased; keeping previous value"
                    );
                }
                CounterUpdate::Rejected => {
                    warn!(
                        query = %self.spec.name,
                        ?labels,
                        observed = value,
                        "Counter value is negative or not finite; ignoring"
                    );
                }
            }
            report.observed += 1;
        }
        report
    }
}
