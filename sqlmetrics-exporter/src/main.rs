//! Prometheus exporter for SQL query results.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use sqlmetrics_core::{Exporter, ExporterOptions, MetricRegistry};
use sqlmetrics_exporter::{
    Cli, Command, HttpServer, ServeArgs, SqlxDataSource, init_tracing, listen_addr,
    load_metric_file,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    init_tracing(&args.logging()).context("Failed to initialize tracing")?;

    info!("Starting sqlmetrics exporter");

    let file = load_metric_file(&args.config_file, args.config_text.as_deref())
        .context("Failed to load metric configuration")?;

    let acquire_timeout = file.default_timeout();
    let exporter = Exporter::build(
        &file,
        Arc::new(MetricRegistry::new()),
        ExporterOptions {
            self_metrics: args.add_exporter_metrics,
        },
        |name, url| SqlxDataSource::open(name, url, acquire_timeout),
    )?;
    let exporter = Arc::new(exporter);

    info!(
        collectors = exporter.collector_count(),
        exporter_metrics = args.add_exporter_metrics,
        "Exporter configured"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(exporter.clone(), listen_addr(&file, args.listen));
    let mut http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal, or for the server to stop on its own
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = &mut http_task => {
            error!("HTTP server exited unexpectedly");
        }
    }

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    // Wait for in-flight scrapes to complete
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        if !http_task.is_finished() {
            let _ = http_task.await;
        }
    })
    .await;

    for collector in exporter.collectors() {
        collector.source().close().await;
    }

    info!("Exporter stopped");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
