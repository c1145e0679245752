//! HTTP server for the Prometheus scrape endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use sqlmetrics_core::{DataSource, Exporter};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Application state shared across handlers.
struct AppState<D: DataSource> {
    exporter: Arc<Exporter<D>>,
}

impl<D: DataSource> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            exporter: Arc::clone(&self.exporter),
        }
    }
}

/// Create the HTTP router.
pub fn create_router<D: DataSource>(exporter: Arc<Exporter<D>>) -> Router {
    let state = AppState { exporter };

    Router::new()
        .route("/metrics", get(metrics_handler::<D>))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler::<D>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the /metrics endpoint: collect, then encode.
async fn metrics_handler<D: DataSource>(State(state): State<AppState<D>>) -> Response {
    match state.exporter.scrape().await {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", OPENMETRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics\n").into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler<D: DataSource>(State(state): State<AppState<D>>) -> Response {
    if state.exporter.collector_count() > 0 {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no active data sources\n",
        )
            .into_response()
    }
}

/// HTTP server configuration.
pub struct HttpServer<D: DataSource> {
    exporter: Arc<Exporter<D>>,
    listen_addr: SocketAddr,
}

impl<D: DataSource> HttpServer<D> {
    pub fn new(exporter: Arc<Exporter<D>>, listen_addr: SocketAddr) -> Self {
        Self {
            exporter,
            listen_addr,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.exporter);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
