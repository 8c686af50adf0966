//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the engine:
//! - Task pool submissions, failures and panics
//! - Event hub publications per event kind
//! - Chat messages sent and edited per request kind
//! - Inbound actions per outcome
//!
//! # Example
//!
//! ```rust,no_run
//! use storefront_sync_runtime::metrics::MetricsServer;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a recorder is
    /// already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|_| {
            MetricsError::Install("a metrics recorder is already installed".to_string())
        })?;

        register_metrics();

        let addr = self.addr;
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!(addr = %addr, "Metrics listener stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Task Pool Metrics
    describe_counter!(
        "task_pool_tasks_submitted_total",
        "Total number of tasks accepted by the task pool"
    );
    describe_counter!(
        "task_pool_tasks_failed_total",
        "Total number of tasks that returned an error"
    );
    describe_counter!(
        "task_pool_tasks_panicked_total",
        "Total number of tasks that panicked"
    );

    // Event Hub Metrics
    describe_counter!(
        "event_hub_published_total",
        "Total number of event publications, by event kind"
    );

    // Synchronizer Metrics
    describe_counter!(
        "sync_messages_sent_total",
        "Total number of chat messages created, by request kind"
    );
    describe_counter!(
        "sync_messages_edited_total",
        "Total number of chat messages edited, by request kind"
    );

    // Action Handler Metrics
    describe_counter!(
        "actions_processed_total",
        "Total number of inbound actions, by outcome"
    );
}
