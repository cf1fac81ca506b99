//! HTTP surface of the gateway
//!
//! ## Table of Contents
//! - **HttpServerConfig**: Bind address
//! - **HttpServer**: Axum server with graceful shutdown
//! - **router**: Routes for `/`, `/predict`, `/health`, `/ready`, `/metrics`
//! - **ErrorResponse**: JSON error body carrying a stable `kind`

use crate::error::{ErrorKind, GatewayError, Result};
use crate::inference::PoolStats;
use crate::metrics::{GatewayMetrics, Timer};
use crate::supervisor::RequestSupervisor;
use crate::types::{InferenceResponse, PredictRequest};
use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Response header carrying server-side handling time
pub const EXECUTION_TIME_HEADER: &str = "x-execution-time";

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Bind address
    pub bind_addr: SocketAddr,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8000).into(),
        }
    }
}

impl HttpServerConfig {
    /// Create with custom bind address
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse from string address
    pub fn with_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid address: {}", e)))?;
        Ok(self)
    }
}

/// Facts about the running instance
#[derive(Debug)]
pub struct InstanceInfo {
    /// Instance name
    pub name: String,
    /// Wall-clock start time
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl InstanceInfo {
    /// Record the start of an instance
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Seconds since start
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    /// Request supervisor
    pub supervisor: Arc<RequestSupervisor>,
    /// Metrics, if enabled
    pub metrics: Option<Arc<GatewayMetrics>>,
    /// Instance facts for `/health`
    pub info: Arc<InstanceInfo>,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,
    /// Stable error classification
    pub kind: ErrorKind,
    /// HTTP status code
    pub code: u16,
}

impl From<GatewayError> for ErrorResponse {
    fn from(err: GatewayError) -> Self {
        let kind = err.kind();
        Self {
            error: err.to_string(),
            kind,
            code: kind.status_code(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Admission pool snapshot
#[derive(Debug, Serialize, Deserialize)]
pub struct AdmissionStatus {
    /// Total permits
    pub capacity: usize,
    /// Free permits
    pub available: usize,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "healthy" while the server answers
    pub status: String,
    /// Crate version
    pub version: String,
    /// Instance name
    pub instance: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Seconds since start
    pub uptime_secs: u64,
    /// Permit pool
    pub admission: AdmissionStatus,
    /// Worker pool size
    pub workers: usize,
    /// Workers running compute right now
    pub busy_workers: usize,
    /// Worker pool statistics
    pub pool: PoolStats,
}

/// Build the gateway router
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .with_state(state)
}

/// Time every request, set `X-Execution-Time` and record HTTP metrics
async fn track_requests(State(state): State<HttpState>, req: Request, next: Next) -> Response {
    let timer = Timer::start();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let mut response = next.run(req).await;

    let elapsed = timer.elapsed_secs();
    if let Ok(value) = HeaderValue::from_str(&format!("{:.3}s", elapsed)) {
        response.headers_mut().insert(EXECUTION_TIME_HEADER, value);
    }
    if let Some(metrics) = &state.metrics {
        metrics.record_http_request(&method, &path, response.status().as_u16(), elapsed);
    }
    debug!(method = %method, path = %path, status = response.status().as_u16(), elapsed_ms = (elapsed * 1000.0) as u64, "HTTP request");

    response
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the inference gateway. Use the /predict endpoint to classify texts."
    }))
}

async fn predict_handler(
    State(state): State<HttpState>,
    Json(body): Json<PredictRequest>,
) -> std::result::Result<Json<InferenceResponse>, ErrorResponse> {
    state
        .supervisor
        .handle(body.texts)
        .await
        .map(Json)
        .map_err(ErrorResponse::from)
}

async fn health_handler(State(state): State<HttpState>) -> Json<HealthResponse> {
    let admission = state.supervisor.admission();
    let pool = state.supervisor.pool();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance: state.info.name.clone(),
        started_at: state.info.started_at,
        uptime_secs: state.info.uptime_secs(),
        admission: AdmissionStatus {
            capacity: admission.capacity(),
            available: admission.available(),
        },
        workers: pool.size(),
        busy_workers: pool.busy(),
        pool: pool.stats(),
    })
}

async fn ready_handler() -> StatusCode {
    StatusCode::OK
}

async fn metrics_handler(State(state): State<HttpState>) -> std::result::Result<String, StatusCode> {
    match &state.metrics {
        Some(m) => m
            .gather_text()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// HTTP server wrapper
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: HttpServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
        }
    }

    /// Set the router
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Bind and serve until `signal` resolves
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| GatewayError::network(format!("Failed to bind: {}", e)))?;

        Self::serve_listener(listener, self.router, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves
    pub async fn serve_listener<F>(listener: TcpListener, router: Router, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(addr = %addr, "HTTP server starting");

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| GatewayError::network(format!("Server error: {}", e)))?;

        info!(addr = %addr, "HTTP server stopped");
        Ok(())
    }
}
