//! Request supervision
//!
//! Drives one request through its whole lifecycle:
//!
//! ```text
//! Pending ──validate──▶ Admitted ──▶ Batching ──▶ Awaiting ──▶ Completed
//!    │                                               │
//!    ├──▶ Rejected (bad input, no permit in time)    ├──▶ Failed   (a batch errored)
//!                                                    └──▶ TimedOut (deadline passed)
//! ```
//!
//! Validation runs before admission and never touches the permit pool. The
//! request deadline covers the admitted span only; queuing for a permit is
//! bounded separately by the admission timeout. The permit is a guard and is
//! returned on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::admission::AdmissionController;
use crate::error::{GatewayError, Result};
use crate::inference::{Batcher, WorkerPool};
use crate::metrics::{GatewayMetrics, Timer};
use crate::types::{InferenceRequest, InferenceResponse};

/// Lifecycle state of a supervised request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Arrived, not yet admitted
    Pending,
    /// Holding a permit
    Admitted,
    /// Being split and dispatched
    Batching,
    /// Waiting on batch results
    Awaiting,
    /// All batches succeeded
    Completed,
    /// Refused before any compute
    Rejected,
    /// A batch failed
    Failed,
    /// Deadline passed with batches outstanding
    TimedOut,
}

impl RequestState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Completed
                | RequestState::Rejected
                | RequestState::Failed
                | RequestState::TimedOut
        )
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Pending, Admitted)
                | (Pending, Rejected)
                | (Admitted, Batching)
                | (Batching, Awaiting)
                | (Awaiting, Completed)
                | (Awaiting, Failed)
                | (Awaiting, TimedOut)
        )
    }

    /// Label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Admitted => "admitted",
            RequestState::Batching => "batching",
            RequestState::Awaiting => "awaiting",
            RequestState::Completed => "completed",
            RequestState::Rejected => "rejected",
            RequestState::Failed => "failed",
            RequestState::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and logs the state of one request
#[derive(Debug)]
struct Lifecycle {
    state: RequestState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: RequestState::Pending,
        }
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Request state change");
        self.state = next;
    }
}

/// Limits applied to every request
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Maximum items per request
    pub max_request_items: usize,
    /// Longest wait for an admission permit
    pub admission_timeout: Duration,
    /// Deadline for the admitted part of a request
    pub request_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_request_items: 128,
            admission_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(90),
        }
    }
}

/// Runs requests through admission, batching and the deadline race
pub struct RequestSupervisor {
    config: SupervisorConfig,
    admission: Arc<AdmissionController>,
    batcher: Batcher,
    pool: Arc<WorkerPool>,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl RequestSupervisor {
    /// Create a new supervisor
    pub fn new(
        config: SupervisorConfig,
        admission: Arc<AdmissionController>,
        batcher: Batcher,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            config,
            admission,
            batcher,
            pool,
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Option<Arc<GatewayMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Request limits
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Admission controller shared with this supervisor
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Worker pool shared with this supervisor
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Classify `texts`, returning a complete response or a single error
    pub async fn handle(&self, texts: Vec<String>) -> Result<InferenceResponse> {
        let timer = Timer::start();
        let mut lifecycle = Lifecycle::new();

        let result = match InferenceRequest::new(texts, self.config.max_request_items) {
            Ok(request) => {
                let span = info_span!(
                    "inference",
                    request_id = %request.id(),
                    items = request.len()
                );
                self.drive(request, &mut lifecycle).instrument(span).await
            }
            Err(e) => {
                lifecycle.advance(RequestState::Rejected);
                warn!(error = %e, "Request rejected");
                Err(e)
            }
        };

        let outcome = match &result {
            Ok(_) => "completed",
            Err(GatewayError::AdmissionTimeout { .. }) => "overloaded",
            Err(_) => lifecycle.state.as_str(),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_request(outcome, timer.elapsed_secs());
        }

        result
    }

    async fn drive(
        &self,
        request: InferenceRequest,
        lifecycle: &mut Lifecycle,
    ) -> Result<InferenceResponse> {
        let permit = match self.admission.acquire(self.config.admission_timeout).await {
            Ok(permit) => permit,
            Err(e) => {
                lifecycle.advance(RequestState::Rejected);
                warn!(error = %e, "Request not admitted");
                return Err(e);
            }
        };
        lifecycle.advance(RequestState::Admitted);
        let admitted_at = Instant::now();

        lifecycle.advance(RequestState::Batching);
        let batches = self.batcher.split(request.shared_texts());
        let batch_count = batches.len();
        let pending = self.batcher.dispatch(&self.pool, batches);

        lifecycle.advance(RequestState::Awaiting);
        let joined = tokio::time::timeout(self.config.request_timeout, try_join_all(pending)).await;

        let result = match joined {
            Ok(Ok(outputs)) => self
                .batcher
                .reassemble(request.len(), outputs)
                .and_then(|predictions| InferenceResponse::from_predictions(&request, predictions)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GatewayError::RequestTimeout {
                elapsed: admitted_at.elapsed(),
            }),
        };

        let elapsed_ms = admitted_at.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                lifecycle.advance(RequestState::Completed);
                info!(batches = batch_count, elapsed_ms, "Request completed");
            }
            Err(GatewayError::RequestTimeout { .. }) => {
                lifecycle.advance(RequestState::TimedOut);
                warn!(batches = batch_count, elapsed_ms, "Request timed out, abandoning batches");
            }
            Err(e) => {
                lifecycle.advance(RequestState::Failed);
                warn!(batches = batch_count, elapsed_ms, error = %e, "Request failed");
            }
        }

        drop(permit);
        result
    }
}
