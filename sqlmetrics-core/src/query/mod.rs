//! Query strategies: how a result set becomes instrument updates.
//!
//! The set of strategies is fixed by the configuration schema, so they are a
//! closed enum chosen once by [`crate::factory::build_query`].

mod generic;
mod group;

use std::time::Duration;

pub use generic::{CounterColumn, GaugeColumn, GenericQuery};
pub use group::{CounterGroupQuery, GaugeGroupQuery, GroupColumn, GroupSpec};

use crate::source::Row;

/// Per-execution bookkeeping returned by [`QueryStrategy::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Instrument updates written.
    pub observed: usize,
    /// Rows dropped because they could not be converted.
    pub skipped: usize,
}

/// A compiled query.
#[derive(Debug, Clone)]
pub enum QueryStrategy {
    CounterGroup(CounterGroupQuery),
    GaugeGroup(GaugeGroupQuery),
    Generic(GenericQuery),
}

impl QueryStrategy {
    pub fn name(&self) -> &str {
        match self {
            QueryStrategy::CounterGroup(q) => &q.spec().name,
            QueryStrategy::GaugeGroup(q) => &q.spec().name,
            QueryStrategy::Generic(q) => q.name(),
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            QueryStrategy::CounterGroup(q) => &q.spec().sql,
            QueryStrategy::GaugeGroup(q) => &q.spec().sql,
            QueryStrategy::Generic(q) => q.sql(),
        }
    }

    /// Per-query timeout override.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            QueryStrategy::CounterGroup(q) => q.spec().timeout,
            QueryStrategy::GaugeGroup(q) => q.spec().timeout,
            QueryStrategy::Generic(q) => q.timeout(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueryStrategy::CounterGroup(_) => "counter",
            QueryStrategy::GaugeGroup(_) => "gauge",
            QueryStrategy::Generic(_) => "generic",
        }
    }

    /// Write the rows of one execution into the instruments.
    pub fn apply(&self, rows: &[Row]) -> ApplyReport {
        match self {
            QueryStrategy::CounterGroup(q) => q.apply(rows),
            QueryStrategy::GaugeGroup(q) => q.apply(rows),
            QueryStrategy::Generic(q) => q.apply(rows),
        }
    }
}
