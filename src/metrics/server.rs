//! HTTP endpoint serving the registry.

use super::{MetricsRegistry, MetricsSnapshot};
use crate::config::MetricsConfig;
use crate::pipeline::PipelineStats;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Errors that can occur while serving metrics.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Where the metrics server listens.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address the exporter listens on.
    pub bind_addr: SocketAddr,
}

impl MetricsServerConfig {
    /// Listens on all interfaces at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }

    /// Server settings from the `[metrics]` table; `None` when disabled.
    pub fn from_config(config: &MetricsConfig) -> Option<Self> {
        (config.port != 0).then(|| Self::with_port(config.port))
    }
}

/// Registry shared between the pipeline thread and the server.
pub struct MetricsState {
    registry: MetricsRegistry,
    run_finished: bool,
}

impl MetricsState {
    /// Publishes the latest pipeline totals.
    pub fn publish(&mut self, stats: &PipelineStats, finished: bool) {
        self.registry.update(&MetricsSnapshot::from_stats(stats));
        self.run_finished = finished;
    }
}

/// HTTP server exposing `/metrics` and `/health`.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: Arc<RwLock<MetricsState>>,
}

impl MetricsServer {
    /// Creates a server that exposes `registry`.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MetricsState {
                registry,
                run_finished: false,
            })),
        }
    }

    /// Handle for publishing updates while the server runs.
    pub fn state(&self) -> Arc<RwLock<MetricsState>> {
        Arc::clone(&self.state)
    }

    /// Serves requests until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .with_state(self.state)
            .layer(CorsLayer::permissive());

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Metrics server listening");

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }
}

async fn metrics_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> impl IntoResponse {
    let state = state.read().await;

    match state.registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

async fn health_handler(State(state): State<Arc<RwLock<MetricsState>>>) -> impl IntoResponse {
    if state.read().await.run_finished {
        (StatusCode::OK, "finished")
    } else {
        (StatusCode::OK, "running")
    }
}
