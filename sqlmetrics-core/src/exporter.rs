//! Exporter root: one collector per configured data source.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::collector::{CollectReport, OnDemandCollector};
use crate::config::MetricFile;
use crate::error::{DataSourceError, RegistryError};
use crate::factory::build_query;
use crate::registry::SharedRegistry;
use crate::self_metrics::SelfMetrics;
use crate::source::DataSource;

/// Startup switches that are not part of the metric file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExporterOptions {
    /// Publish `sqlmetrics_*` health metrics for every data source.
    pub self_metrics: bool,
}

/// All active collectors and the registry they write into.
pub struct Exporter<D: DataSource> {
    registry: SharedRegistry,
    collectors: Vec<Arc<OnDemandCollector<D>>>,
}

impl<D: DataSource> Exporter<D> {
    /// Assemble collectors from `file`.
    ///
    /// `open` turns a config's display name and connection descriptor into a
    /// data source; it must not perform I/O. Configs without a data source,
    /// or whose source cannot be opened, are logged and skipped. Queries
    /// that fail to build are dropped from their collector.
    pub fn build<F>(
        file: &MetricFile,
        registry: SharedRegistry,
        options: ExporterOptions,
        mut open: F,
    ) -> Result<Self, RegistryError>
    where
        F: FnMut(&str, &str) -> Result<D, DataSourceError>,
    {
        let self_metrics = if options.self_metrics {
            Some(SelfMetrics::register(&registry)?)
        } else {
            None
        };

        let default_timeout = file.default_timeout();
        let mut collectors = Vec::new();

        for (index, config) in file.configs.iter().enumerate() {
            let name = config.display_name(index);

            let Some(descriptor) = config.data_source() else {
                error!(data_source = %name, "Config has no DataSource; skipping");
                continue;
            };

            let source = match open(&name, descriptor) {
                Ok(source) => source,
                Err(e) => {
                    error!(data_source = %name, error = %e, "Failed to open data source; skipping");
                    continue;
                }
            };

            let queries: Vec<_> = config
                .queries
                .iter()
                .filter_map(|query| build_query(query, &registry).ok())
                .collect();

            let dropped = config.queries.len() - queries.len();
            if dropped > 0 {
                warn!(data_source = %name, dropped, "Some queries were not created");
            }

            info!(
                data_source = %name,
                queries = queries.len(),
                timeout_ms = default_timeout.as_millis() as u64,
                "Collector ready"
            );

            let mut collector = OnDemandCollector::new(name, source, queries, default_timeout);
            if let Some(metrics) = &self_metrics {
                collector = collector.with_self_metrics(metrics.clone());
            }
            collectors.push(Arc::new(collector));
        }

        if collectors.is_empty() {
            warn!("No active collectors; scrapes will only return exporter metrics");
        }

        Ok(Self {
            registry,
            collectors,
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn collectors(&self) -> &[Arc<OnDemandCollector<D>>] {
        &self.collectors
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.len()
    }

    /// Run one pass on every collector, concurrently across data sources.
    pub async fn collect(&self) -> Vec<CollectReport> {
        let mut tasks = JoinSet::new();
        for collector in &self.collectors {
            let collector = Arc::clone(collector);
            tasks.spawn(async move { collector.collect().await });
        }

        let mut reports = Vec::with_capacity(self.collectors.len());
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Collector task failed"),
            }
        }
        reports
    }

    /// Collect fresh values and encode the registry as exposition text.
    pub async fn scrape(&self) -> Result<String, fmt::Error> {
        self.collect().await;
        self.registry.encode()
    }
}

impl<D: DataSource> fmt::Debug for Exporter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("collectors", &self.collectors)
            .finish()
    }
}
