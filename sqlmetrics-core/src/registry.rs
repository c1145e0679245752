//! Metric-instrument registry addressed by metric name and label tuple.
//!
//! Instrument families are created once per metric name when queries are
//! built. Individual series are created lazily, the first time a label tuple
//! is observed, and are never removed: a series missing from one scrape's
//! result set keeps its last value.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::{Mutex, RwLock};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::error::RegistryError;
use crate::mapping::{escape_label_value, sanitize_label_name, sanitize_metric_name};

/// Label key-value pairs in positional order.
pub type LabelSet = Vec<(String, String)>;

type GaugeMetric = Gauge<f64, AtomicU64>;
type CounterMetric = Counter<f64, AtomicU64>;

/// The kinds of instrument a query can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter,
    Gauge,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Series shared between a family handle and the registry.
#[derive(Debug)]
struct Series<M> {
    name: String,
    label_names: Vec<String>,
    family: Family<LabelSet, M>,
    observed: RwLock<HashSet<LabelSet>>,
}

impl<M: Default> Series<M> {
    fn new(name: String, label_names: Vec<String>) -> Self {
        Self {
            name,
            label_names,
            family: Family::default(),
            observed: RwLock::new(HashSet::new()),
        }
    }

    fn label_set(&self, values: &[String]) -> LabelSet {
        debug_assert_eq!(values.len(), self.label_names.len());
        self.label_names
            .iter()
            .cloned()
            .zip(values.iter().map(|v| escape_label_value(v)))
            .collect()
    }

    fn mark_observed(&self, labels: &LabelSet) {
        if !self.observed.read().contains(labels) {
            self.observed.write().insert(labels.clone());
        }
    }

    fn is_observed(&self, labels: &LabelSet) -> bool {
        self.observed.read().contains(labels)
    }

    fn check_labels(&self, requested: &[String]) -> Result<(), RegistryError> {
        if self.label_names == requested {
            return Ok(());
        }
        Err(RegistryError::LabelMismatch {
            name: self.name.clone(),
            registered: self.label_names.join(","),
            requested: requested.join(","),
        })
    }
}

/// Handle to a gauge family.
#[derive(Debug, Clone)]
pub struct GaugeFamily {
    series: Arc<Series<GaugeMetric>>,
}

impl GaugeFamily {
    pub fn name(&self) -> &str {
        &self.series.name
    }

    pub fn label_names(&self) -> &[String] {
        &self.series.label_names
    }

    /// Set the gauge addressed by `values`, creating it on first use.
    pub fn set(&self, values: &[String], value: f64) {
        let labels = self.series.label_set(values);
        self.series.family.get_or_create(&labels).set(value);
        self.series.mark_observed(&labels);
    }

    /// Current value of an already observed series.
    pub fn value(&self, values: &[String]) -> Option<f64> {
        let labels = self.series.label_set(values);
        if !self.series.is_observed(&labels) {
            return None;
        }
        Some(self.series.family.get_or_create(&labels).get())
    }

    /// Number of label tuples observed so far.
    pub fn series_count(&self) -> usize {
        self.series.observed.read().len()
    }
}

/// Result of moving a counter to an observed cumulative value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterUpdate {
    /// The counter moved forward by the contained delta.
    Advanced(f64),
    /// The observed value equals the current one.
    Unchanged,
    /// The observed value is below the current one; nothing was written.
    Regressed { current: f64 },
    /// The observed value is negative or not finite; nothing was written.
    Rejected,
}

/// Handle to a counter family.
#[derive(Debug, Clone)]
pub struct CounterFamily {
    series: Arc<Series<CounterMetric>>,
}

impl CounterFamily {
    pub fn name(&self) -> &str {
        &self.series.name
    }

    pub fn label_names(&self) -> &[String] {
        &self.series.label_names
    }

    /// Move the counter addressed by `values` up to `target`.
    ///
    /// Counters never decrease; a lower target is reported back to the caller
    /// and the stored value is kept.
    pub fn advance_to(&self, values: &[String], target: f64) -> CounterUpdate {
        if !target.is_finite() || target < 0.0 {
            return CounterUpdate::Rejected;
        }

        let labels = self.series.label_set(values);
        let update = {
            let counter = self.series.family.get_or_create(&labels);
            let current = counter.get();
            if target > current {
                counter.inc_by(target - current);
                CounterUpdate::Advanced(target - current)
            } else if target == current {
                CounterUpdate::Unchanged
            } else {
                CounterUpdate::Regressed { current }
            }
        };
        self.series.mark_observed(&labels);
        update
    }

    /// Increment the counter addressed by `values` by one.
    pub fn inc(&self, values: &[String]) {
        self.inc_by(values, 1.0);
    }

    pub fn inc_by(&self, values: &[String], amount: f64) {
        let labels = self.series.label_set(values);
        self.series.family.get_or_create(&labels).inc_by(amount);
        self.series.mark_observed(&labels);
    }

    /// Current value of an already observed series.
    pub fn value(&self, values: &[String]) -> Option<f64> {
        let labels = self.series.label_set(values);
        if !self.series.is_observed(&labels) {
            return None;
        }
        Some(self.series.family.get_or_create(&labels).get())
    }

    /// Number of label tuples observed so far.
    pub fn series_count(&self) -> usize {
        self.series.observed.read().len()
    }
}

#[derive(Debug, Clone)]
enum Instrument {
    Counter(CounterFamily),
    Gauge(GaugeFamily),
}

impl Instrument {
    fn kind(&self) -> InstrumentKind {
        match self {
            Instrument::Counter(_) => InstrumentKind::Counter,
            Instrument::Gauge(_) => InstrumentKind::Gauge,
        }
    }

    fn check_labels(&self, requested: &[String]) -> Result<(), RegistryError> {
        match self {
            Instrument::Counter(family) => family.series.check_labels(requested),
            Instrument::Gauge(family) => family.series.check_labels(requested),
        }
    }
}

/// Thread-safe instrument registry shared by all collectors.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    registry: Mutex<Registry>,
    instruments: Mutex<HashMap<String, Instrument>>,
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or get the gauge family `name` with the given label names.
    pub fn gauge(
        &self,
        name: &str,
        help: &str,
        label_names: &[String],
    ) -> Result<GaugeFamily, RegistryError> {
        let name = sanitize_metric_name(name);
        let label_names = sanitize_label_names(&name, label_names)?;
        let mut instruments = self.instruments.lock();

        match instruments.get(&name) {
            Some(Instrument::Gauge(existing)) => {
                existing.series.check_labels(&label_names)?;
                return Ok(existing.clone());
            }
            Some(other) => {
                return Err(RegistryError::KindMismatch {
                    name,
                    registered: other.kind(),
                    requested: InstrumentKind::Gauge,
                });
            }
            None => {}
        }

        let family = GaugeFamily {
            series: Arc::new(Series::new(name.clone(), label_names)),
        };
        self.registry
            .lock()
            .register(name.clone(), help, family.series.family.clone());
        instruments.insert(name, Instrument::Gauge(family.clone()));
        Ok(family)
    }

    /// Create or get the counter family `name` with the given label names.
    ///
    /// A trailing `_total` is dropped because the encoder appends it.
    pub fn counter(
        &self,
        name: &str,
        help: &str,
        label_names: &[String],
    ) -> Result<CounterFamily, RegistryError> {
        let name = counter_base_name(&sanitize_metric_name(name));
        let label_names = sanitize_label_names(&name, label_names)?;
        let mut instruments = self.instruments.lock();

        match instruments.get(&name) {
            Some(Instrument::Counter(existing)) => {
                existing.series.check_labels(&label_names)?;
                return Ok(existing.clone());
            }
            Some(other) => {
                return Err(RegistryError::KindMismatch {
                    name,
                    registered: other.kind(),
                    requested: InstrumentKind::Counter,
                });
            }
            None => {}
        }

        let family = CounterFamily {
            series: Arc::new(Series::new(name.clone(), label_names)),
        };
        self.registry
            .lock()
            .register(name.clone(), help, family.series.family.clone());
        instruments.insert(name, Instrument::Counter(family.clone()));
        Ok(family)
    }

    /// Check that `name` could be created as `kind` with `label_names`,
    /// without registering anything.
    pub fn check(
        &self,
        name: &str,
        kind: InstrumentKind,
        label_names: &[String],
    ) -> Result<(), RegistryError> {
        let name = match kind {
            InstrumentKind::Counter => counter_base_name(&sanitize_metric_name(name)),
            InstrumentKind::Gauge => sanitize_metric_name(name),
        };
        let label_names = sanitize_label_names(&name, label_names)?;

        match self.instruments.lock().get(&name) {
            Some(existing) if existing.kind() != kind => Err(RegistryError::KindMismatch {
                registered: existing.kind(),
                requested: kind,
                name,
            }),
            Some(existing) => existing.check_labels(&label_names),
            None => Ok(()),
        }
    }

    /// Number of registered metric names.
    pub fn len(&self) -> usize {
        self.instruments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.lock().is_empty()
    }

    /// Render every instrument in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, fmt::Error> {
        let mut output = String::new();
        encode(&mut output, &self.registry.lock())?;
        Ok(output)
    }
}

fn sanitize_label_names(metric: &str, names: &[String]) -> Result<Vec<String>, RegistryError> {
    let mut seen = HashSet::with_capacity(names.len());
    let mut sanitized = Vec::with_capacity(names.len());
    for name in names {
        let label = sanitize_label_name(name);
        if !seen.insert(label.clone()) {
            return Err(RegistryError::DuplicateLabel {
                name: metric.to_string(),
                label,
            });
        }
        sanitized.push(label);
    }
    Ok(sanitized)
}

fn counter_base_name(name: &str) -> String {
    match name.strip_suffix("_total") {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => name.to_string(),
    }
}
