//! Admission control for inference requests
//!
//! A counting permit pool bounds how many requests may drive batch work at
//! once. Requests beyond capacity queue for at most a grace period and are
//! then rejected with [`GatewayError::AdmissionTimeout`].
//!
//! Permits bound *requests*, not batches. A request holding one permit may
//! still have several batches queued on the worker pool.

use crate::error::{GatewayError, Result};
use crate::metrics::GatewayMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Global request permit pool
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl AdmissionController {
    /// Create a controller with `capacity` permits
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Option<Arc<GatewayMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Wait up to `timeout` for a free permit
    ///
    /// Dropping the returned [`Permit`] gives it back. If the wait times out
    /// no permit was granted and the pool is unchanged.
    pub async fn acquire(&self, timeout: Duration) -> Result<Permit> {
        let start = Instant::now();
        let acquire = Arc::clone(&self.semaphore).acquire_owned();

        let inner = match tokio::time::timeout(timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(GatewayError::internal("admission pool closed")),
            Err(_) => {
                return Err(GatewayError::AdmissionTimeout {
                    waited: start.elapsed(),
                })
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_admitted();
        }

        debug!(
            waited_ms = start.elapsed().as_millis() as u64,
            available = self.available(),
            "Admission permit acquired"
        );

        Ok(Permit {
            _inner: inner,
            metrics: self.metrics.clone(),
            acquired_at: Instant::now(),
        })
    }

    /// Total number of permits
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

/// An admission ticket held for the lifetime of one request
///
/// Released exactly once, when dropped.
pub struct Permit {
    _inner: OwnedSemaphorePermit,
    metrics: Option<Arc<GatewayMetrics>>,
    acquired_at: Instant,
}

impl Permit {
    /// How long this permit has been held
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_released();
        }
        debug!(held_ms = self.held_for().as_millis() as u64, "Admission permit released");
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("held_for", &self.held_for())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let controller = AdmissionController::new(2);
        assert_eq!(controller.available(), 2);

        let p1 = controller.acquire(Duration::from_millis(50)).await.unwrap();
        let p2 = controller.acquire(Duration::from_millis(50)).await.unwrap();
        assert_eq!(controller.available(), 0);
        assert_eq!(controller.in_flight(), 2);

        drop(p1);
        assert_eq!(controller.available(), 1);
        drop(p2);
        assert_eq!(controller.available(), 2);
    }

    #[tokio::test]
    async fn test_timeout_when_exhausted() {
        let controller = AdmissionController::new(1);
        let _held = controller.acquire(Duration::from_millis(50)).await.unwrap();

        let result = controller.acquire(Duration::from_millis(30)).await;
        match result {
            Err(GatewayError::AdmissionTimeout { waited }) => {
                assert!(waited >= Duration::from_millis(30));
            }
            other => panic!("expected admission timeout, got {:?}", other),
        }

        // Timed-out waiter was never granted a permit
        assert_eq!(controller.available(), 0);
        assert_eq!(controller.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_waiter_admitted_when_permit_frees() {
        let controller = Arc::new(AdmissionController::new(1));
        let held = controller.acquire(Duration::from_millis(50)).await.unwrap();

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.acquire(Duration::from_secs(2)).await.is_ok() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap());
        assert_eq!(controller.available(), 1);
    }

    #[tokio::test]
    async fn test_permit_updates_in_flight_gauge() {
        let metrics = Arc::new(GatewayMetrics::new().unwrap());
        let controller = AdmissionController::new(3).with_metrics(Some(Arc::clone(&metrics)));

        let permit = controller.acquire(Duration::from_millis(50)).await.unwrap();
        assert_eq!(metrics.requests_in_flight.get() as i64, 1);
        drop(permit);
        assert_eq!(metrics.requests_in_flight.get() as i64, 0);
    }
}
