//! Gateway runtime
//!
//! ## Table of Contents
//! - **RuntimeState**: Lifecycle of the serving loop
//! - **Gateway**: Owns the supervisor and serves it over HTTP

use crate::admission::AdmissionController;
use crate::builder::GatewayConfig;
use crate::error::Result;
use crate::inference::PoolStats;
use crate::metrics::GatewayMetrics;
use crate::networking::{self, HttpServer, HttpState, InstanceInfo};
use crate::supervisor::RequestSupervisor;
use crate::types::InferenceResponse;
use axum::Router;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Not serving
    Stopped,
    /// Serving HTTP
    Running,
    /// Draining connections
    ShuttingDown,
}

/// Inference gateway
pub struct Gateway {
    config: GatewayConfig,
    supervisor: Arc<RequestSupervisor>,
    metrics: Option<Arc<GatewayMetrics>>,
    info: Arc<InstanceInfo>,
    state: RwLock<RuntimeState>,
    shutdown_tx: watch::Sender<bool>,
}

impl Gateway {
    /// Create a new gateway (use GatewayBuilder instead)
    pub(crate) fn new(
        config: GatewayConfig,
        supervisor: RequestSupervisor,
        metrics: Option<Arc<GatewayMetrics>>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let info = Arc::new(InstanceInfo::new(config.instance_name.clone()));

        Self {
            config,
            supervisor: Arc::new(supervisor),
            metrics,
            info,
            state: RwLock::new(RuntimeState::Stopped),
            shutdown_tx,
        }
    }

    /// Gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Current runtime state
    pub fn state(&self) -> RuntimeState {
        *self.state.read()
    }

    /// Admission controller
    pub fn admission(&self) -> &AdmissionController {
        self.supervisor.admission()
    }

    /// Get metrics instance
    pub fn metrics(&self) -> Option<&Arc<GatewayMetrics>> {
        self.metrics.as_ref()
    }

    /// Worker pool statistics
    pub fn pool_stats(&self) -> PoolStats {
        self.supervisor.pool().stats()
    }

    /// Seconds since the gateway was built
    pub fn uptime_secs(&self) -> u64 {
        self.info.uptime_secs()
    }

    /// Classify `texts` in-process, under the same admission and deadlines as HTTP
    pub async fn predict(&self, texts: Vec<String>) -> Result<InferenceResponse> {
        self.supervisor.handle(texts).await
    }

    /// HTTP router bound to this gateway
    pub fn router(&self) -> Router {
        networking::router(HttpState {
            supervisor: Arc::clone(&self.supervisor),
            metrics: self.metrics.clone(),
            info: Arc::clone(&self.info),
        })
    }

    /// Serve on the configured address until shutdown is signalled
    pub async fn run(&self) -> Result<()> {
        let server = HttpServer::new(self.config.http_config.clone()).with_router(self.router());
        self.drive(server.serve_with_shutdown(self.shutdown_signal()))
            .await
    }

    /// Serve on an already bound listener until shutdown is signalled
    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        self.drive(HttpServer::serve_listener(
            listener,
            self.router(),
            self.shutdown_signal(),
        ))
        .await
    }

    async fn drive(&self, serve: impl Future<Output = Result<()>>) -> Result<()> {
        *self.state.write() = RuntimeState::Running;
        info!(
            instance = %self.config.instance_name,
            workers = self.config.num_workers,
            permits = self.config.max_concurrent_requests,
            "Gateway running"
        );

        let result = serve.await;
        if let Err(e) = &result {
            error!(error = %e, "HTTP server error");
        }

        *self.state.write() = RuntimeState::Stopped;
        info!(instance = %self.config.instance_name, "Gateway stopped");
        result
    }

    fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        }
    }

    /// Signal shutdown; in-flight requests are allowed to finish
    pub fn signal_shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == RuntimeState::Running {
                *state = RuntimeState::ShuttingDown;
            }
        }
        info!("Shutdown signal received");
        self.shutdown_tx.send_replace(true);
    }

    /// Subscribe to the shutdown signal
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}
