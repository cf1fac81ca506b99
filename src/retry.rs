//! Client-side retries for an overloaded or slow gateway
//!
//! The gateway itself never retries. Callers that would rather wait than
//! see a 429 or 504 can wrap their calls in a [`RetryPolicy`], which only
//! retries errors whose kind is retryable.

use crate::error::{GatewayError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Growth factor between retries
    pub multiplier: f64,
    /// Spread delays by up to 25%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier (at least 1.0)
    pub fn multiplier(mut self, mult: f64) -> Self {
        self.multiplier = mult.max(1.0);
        self
    }

    /// Enable/disable jitter
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }
}

/// Exponential backoff schedule
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new schedule
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Next delay, or None once retries are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_retries {
            return None;
        }
        let delay = self.delay_for(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let max_ns = self.config.max_delay.as_nanos() as f64;
        let base = self.config.initial_delay.as_nanos() as f64 * self.config.multiplier.powi(attempt as i32);
        let capped = base.min(max_ns);
        let spread = if self.config.jitter {
            capped * 0.25 * unit_jitter()
        } else {
            0.0
        };
        Duration::from_nanos((capped + spread).min(max_ns) as u64)
    }

    /// Retries handed out so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start over
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Uniform value in [0, 1) drawn from a v4 uuid's random bits
fn unit_jitter() -> f64 {
    let bits = Uuid::new_v4().as_u128() as u64 & ((1u64 << 53) - 1);
    bits as f64 / (1u64 << 53) as f64
}

/// Runs a gateway call, retrying on retryable errors
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Retry while the error is [`GatewayError::is_retryable`]
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_if(operation, GatewayError::is_retryable).await
    }

    /// Retry while `should_retry` accepts the error
    pub async fn execute_if<F, Fut, T, C>(&self, mut operation: F, should_retry: C) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&GatewayError) -> bool,
    {
        let mut backoff = ExponentialBackoff::new(self.config.clone());

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !should_retry(&err) {
                return Err(err);
            }
            let Some(delay) = backoff.next_delay() else {
                return Err(err);
            };
            debug!(
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                kind = %err.kind(),
                "Retrying gateway call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
