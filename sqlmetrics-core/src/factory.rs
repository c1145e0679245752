//! Compiles a declared [`MetricQuery`] into a [`QueryStrategy`].

use tracing::{error, warn};

use crate::config::{Column, ColumnUsage, MetricQuery, QueryUsage};
use crate::error::{BuildError, RegistryError};
use crate::query::{
    CounterColumn, CounterGroupQuery, GaugeColumn, GaugeGroupQuery, GenericQuery, GroupColumn,
    GroupSpec, QueryStrategy,
};
use crate::registry::{InstrumentKind, MetricRegistry};

/// Build the strategy for `query`, creating its instrument families.
///
/// No database access happens here. Failures are logged with the query name
/// and only affect this query.
pub fn build_query(
    query: &MetricQuery,
    registry: &MetricRegistry,
) -> Result<QueryStrategy, BuildError> {
    warn_unrecognized_columns(query);

    let result = match &query.query_usage {
        QueryUsage::Counter => {
            let spec = group_spec(query, ColumnUsage::CounterLabel, ColumnUsage::Counter);
            CounterGroupQuery::new(spec, registry).map(QueryStrategy::CounterGroup)
        }
        QueryUsage::Gauge => {
            let spec = group_spec(query, ColumnUsage::GaugeLabel, ColumnUsage::Gauge);
            GaugeGroupQuery::new(spec, registry).map(QueryStrategy::GaugeGroup)
        }
        QueryUsage::Generic => generic_query(query, registry).map(QueryStrategy::Generic),
        QueryUsage::Unrecognized(usage) => {
            error!(query = %query.name, usage = %usage, "Failed to create query");
            return Err(BuildError::UnrecognizedUsage {
                query: query.name.clone(),
                usage: usage.clone(),
            });
        }
    };

    result.map_err(|source| {
        error!(query = %query.name, error = %source, "Failed to create query");
        BuildError::Registry {
            query: query.name.clone(),
            source,
        }
    })
}

fn group_spec(query: &MetricQuery, label_usage: ColumnUsage, value_usage: ColumnUsage) -> GroupSpec {
    let labels = query
        .columns
        .iter()
        .filter(|c| c.column_usage == label_usage)
        .map(group_column)
        .collect();

    let mut values = query.columns.iter().filter(|c| c.column_usage == value_usage);
    let value = values.next().map(group_column);
    let ignored: Vec<&str> = values.map(|c| c.name.as_str()).collect();
    if !ignored.is_empty() {
        warn!(
            query = %query.name,
            ?ignored,
            "Query declares more than one {} column; using the first",
            value_usage
        );
    }

    GroupSpec {
        name: query.name.clone(),
        description: query.description.clone().unwrap_or_default(),
        sql: query.query.clone(),
        labels,
        value,
        timeout: query.timeout(),
    }
}

fn group_column(column: &Column) -> GroupColumn {
    GroupColumn::new(&column.name, column.order(), column.label())
}

fn generic_query(
    query: &MetricQuery,
    registry: &MetricRegistry,
) -> Result<GenericQuery, RegistryError> {
    let mut metrics = Vec::new();
    for column in &query.columns {
        match column.column_usage {
            ColumnUsage::Gauge => metrics.push((column, InstrumentKind::Gauge)),
            ColumnUsage::Counter => metrics.push((column, InstrumentKind::Counter)),
            ColumnUsage::GaugeLabel | ColumnUsage::CounterLabel => {
                warn!(
                    query = %query.name,
                    column = %column.name,
                    "Label columns are ignored by generic queries"
                );
            }
            ColumnUsage::Unrecognized(_) => {}
        }
    }

    // Nothing is registered unless every column can be.
    let scratch = MetricRegistry::new();
    for (column, kind) in &metrics {
        match kind {
            InstrumentKind::Gauge => scratch.gauge(column.label(), "", &[]).map(drop)?,
            InstrumentKind::Counter => scratch.counter(column.label(), "", &[]).map(drop)?,
        }
        registry.check(column.label(), *kind, &[])?;
    }

    let mut gauges = Vec::new();
    let mut counters = Vec::new();
    for (column, kind) in metrics {
        let help = column.description.as_deref().unwrap_or(column.label());
        match kind {
            InstrumentKind::Gauge => gauges.push(GaugeColumn {
                name: column.name.clone(),
                gauge: registry.gauge(column.label(), help, &[])?,
                default_value: column.default_value.unwrap_or(0.0),
            }),
            InstrumentKind::Counter => counters.push(CounterColumn {
                name: column.name.clone(),
                counter: registry.counter(column.label(), help, &[])?,
            }),
        }
    }

    Ok(GenericQuery::new(
        &query.name,
        &query.query,
        gauges,
        counters,
        query.timeout(),
    ))
}

fn warn_unrecognized_columns(query: &MetricQuery) {
    for column in &query.columns {
        if let ColumnUsage::Unrecognized(usage) = &column.column_usage {
            warn!(
                query = %query.name,
                column = %column.name,
                usage = %usage,
                "Unrecognized ColumnUsage; column ignored"
            );
        }
    }
}
