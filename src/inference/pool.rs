//! Worker pool for blocking compute
//!
//! A fixed-size rayon thread pool is the only path to the classifier. It
//! keeps synchronous compute off the async runtime and bounds how many
//! compute calls run at any instant, no matter how many requests or
//! batches are in flight.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::batch::Batch;
use super::classifier::Classifier;
use crate::error::{GatewayError, Result};
use crate::metrics::{GatewayMetrics, Timer};
use crate::types::ClassId;

/// Predictions for one finished batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutput {
    /// Batch position among its siblings
    pub index: usize,
    /// Offset of the batch's first item in the request
    pub offset: usize,
    /// One class id per batch item
    pub predictions: Vec<ClassId>,
}

/// Handle to a submitted batch
///
/// Resolves once a worker has run the batch. Dropping it abandons the
/// result; a compute call that already started still runs to completion.
#[derive(Debug)]
pub struct PendingBatch {
    index: usize,
    offset: usize,
    rx: oneshot::Receiver<Result<Vec<ClassId>>>,
}

impl PendingBatch {
    /// Batch position among its siblings
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Future for PendingBatch {
    type Output = Result<BatchOutput>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let index = self.index;
        let offset = self.offset;

        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(Ok(predictions))) => Poll::Ready(Ok(BatchOutput {
                index,
                offset,
                predictions,
            })),
            Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(e)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(GatewayError::compute(format!(
                "worker dropped batch {}",
                index
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Statistics for the worker pool
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    /// Batches that ran compute
    pub total_batches: u64,
    /// Items across those batches
    pub total_items: u64,
    /// Batches whose compute failed
    pub failed_batches: u64,
    /// Batches skipped because their request was already abandoned
    pub skipped_batches: u64,
    /// Average batch size
    pub avg_batch_size: f64,
    /// Average compute time in ms
    pub avg_compute_ms: f64,
    /// Most worker slots ever busy at once
    pub peak_busy: usize,
}

impl PoolStats {
    fn record(&mut self, items: usize, compute_ms: f64, success: bool) {
        self.total_batches += 1;
        self.total_items += items as u64;
        if !success {
            self.failed_batches += 1;
        }

        let n = self.total_batches as f64;
        self.avg_batch_size = self.avg_batch_size * (n - 1.0) / n + items as f64 / n;
        self.avg_compute_ms = self.avg_compute_ms * (n - 1.0) / n + compute_ms / n;
    }
}

/// Fixed-size pool running classifier calls
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    classifier: Arc<dyn Classifier>,
    size: usize,
    busy: Arc<AtomicUsize>,
    stats: Arc<Mutex<PoolStats>>,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl WorkerPool {
    /// Create a pool of `size` worker threads that owns `classifier`
    pub fn new(size: usize, classifier: Arc<dyn Classifier>) -> Result<Self> {
        if size == 0 {
            return Err(GatewayError::config("worker pool size must be at least 1"));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("inference-worker-{}", i))
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build worker pool: {}", e)))?;

        info!(workers = size, classifier = %classifier.name(), "Worker pool started");

        Ok(Self {
            pool,
            classifier,
            size,
            busy: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(Mutex::new(PoolStats::default())),
            metrics: None,
        })
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Option<Arc<GatewayMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Number of worker slots
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots currently running compute
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Snapshot of pool statistics
    pub fn stats(&self) -> PoolStats {
        self.stats.lock().clone()
    }

    /// Queue a batch for compute without waiting for it
    pub fn submit(&self, batch: Batch) -> PendingBatch {
        let (tx, rx) = oneshot::channel();
        let index = batch.index();
        let offset = batch.offset();

        let classifier = Arc::clone(&self.classifier);
        let busy = Arc::clone(&self.busy);
        let stats = Arc::clone(&self.stats);
        let metrics = self.metrics.clone();

        self.pool.spawn(move || {
            if tx.is_closed() {
                stats.lock().skipped_batches += 1;
                debug!(batch = index, "Skipping batch of abandoned request");
                return;
            }

            let now_busy = busy.fetch_add(1, Ordering::SeqCst) + 1;
            {
                let mut stats = stats.lock();
                stats.peak_busy = stats.peak_busy.max(now_busy);
            }
            if let Some(m) = &metrics {
                m.record_compute_started();
            }

            let timer = Timer::start();
            let result = run_compute(classifier.as_ref(), &batch);
            let elapsed = timer.elapsed_secs();

            busy.fetch_sub(1, Ordering::SeqCst);
            stats.lock().record(batch.len(), elapsed * 1000.0, result.is_ok());
            if let Some(m) = &metrics {
                m.record_batch(result.is_ok(), elapsed);
            }

            if let Err(e) = &result {
                warn!(batch = index, items = batch.len(), error = %e, "Batch compute failed");
            }

            if tx.send(result).is_err() {
                debug!(batch = index, "Batch result discarded, request no longer waiting");
            }
        });

        PendingBatch { index, offset, rx }
    }
}

fn run_compute(classifier: &dyn Classifier, batch: &Batch) -> Result<Vec<ClassId>> {
    let outcome = catch_unwind(AssertUnwindSafe(|| classifier.predict(batch.items())));

    match outcome {
        Ok(Ok(predictions)) if predictions.len() == batch.len() => Ok(predictions),
        Ok(Ok(predictions)) => Err(GatewayError::compute(format!(
            "classifier returned {} predictions for {} inputs",
            predictions.len(),
            batch.len()
        ))),
        Ok(Err(e @ GatewayError::ComputeFailure(_))) => Err(e),
        Ok(Err(e)) => Err(GatewayError::compute(e.to_string())),
        Err(panic) => Err(GatewayError::compute(format!(
            "classifier panicked: {}",
            panic_message(&*panic)
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
