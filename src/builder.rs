//! GatewayBuilder for configuring and constructing Gateway instances
//!
//! ## Table of Contents
//! - **GatewayConfig**: Complete configuration struct (defaults, env, JSON file)
//! - **GatewayBuilder**: Builder pattern for Gateway configuration

use crate::admission::AdmissionController;
use crate::error::{GatewayError, Result};
use crate::inference::{BatchConfig, Batcher, Classifier, WorkerPool};
use crate::metrics::GatewayMetrics;
use crate::networking::HttpServerConfig;
use crate::runtime::Gateway;
use crate::supervisor::{RequestSupervisor, SupervisorConfig};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Environment variable naming an optional JSON config file
pub const CONFIG_FILE_ENV: &str = "GATEWAY_CONFIG";

/// Complete gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Items handed to one compute call
    pub batch_limit: usize,
    /// Items accepted per request
    pub max_request_items: usize,
    /// Worker pool threads
    pub num_workers: usize,
    /// Admission permits (requests allowed to run at once)
    pub max_concurrent_requests: usize,
    /// Longest wait for an admission permit
    pub admission_timeout: Duration,
    /// Deadline for an admitted request
    pub request_timeout: Duration,
    /// Tokens per item read by the built-in classifier
    pub max_tokens: usize,
    /// HTTP server config
    pub http_config: HttpServerConfig,
    /// Enable metrics
    pub metrics_enabled: bool,
    /// Instance name for logs and health output
    pub instance_name: String,
    /// Permits were set by some source and no longer follow `num_workers`
    permits_explicit: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            batch_limit: 16,
            max_request_items: 128,
            num_workers: 4,
            max_concurrent_requests: 4,
            admission_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(90),
            max_tokens: 128,
            http_config: HttpServerConfig::default(),
            metrics_enabled: true,
            instance_name: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "inference-gateway".to_string()),
            permits_explicit: false,
        }
    }
}

/// Where a set of overrides came from, for error messages
#[derive(Debug, Clone, Copy)]
enum Origin {
    Env,
    File,
}

impl Origin {
    fn name(self, var: &'static str, field: &'static str) -> &'static str {
        match self {
            Origin::Env => var,
            Origin::File => field,
        }
    }
}

/// Optional overrides, read from a JSON file or the environment
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverrides {
    batch_limit: Option<usize>,
    max_request_items: Option<usize>,
    num_workers: Option<usize>,
    max_concurrent_requests: Option<usize>,
    admission_timeout_secs: Option<f64>,
    request_timeout_secs: Option<f64>,
    max_tokens: Option<usize>,
    bind_addr: Option<String>,
    metrics_enabled: Option<bool>,
    instance_name: Option<String>,
}

impl ConfigOverrides {
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            batch_limit: parse_var(&lookup, "GATEWAY_BATCH_LIMIT")?,
            max_request_items: parse_var(&lookup, "GATEWAY_MAX_REQUEST_ITEMS")?,
            num_workers: parse_var(&lookup, "GATEWAY_NUM_WORKERS")?,
            max_concurrent_requests: parse_var(&lookup, "GATEWAY_MAX_CONCURRENT_REQUESTS")?,
            admission_timeout_secs: parse_var(&lookup, "GATEWAY_ADMISSION_TIMEOUT_SECS")?,
            request_timeout_secs: parse_var(&lookup, "GATEWAY_REQUEST_TIMEOUT_SECS")?,
            max_tokens: parse_var(&lookup, "GATEWAY_MAX_TOKENS")?,
            bind_addr: lookup("GATEWAY_BIND_ADDR"),
            metrics_enabled: parse_var(&lookup, "GATEWAY_METRICS")?,
            instance_name: lookup("GATEWAY_INSTANCE_NAME"),
        })
    }

    fn apply(self, config: &mut GatewayConfig, origin: Origin) -> Result<()> {
        if let Some(v) = self.batch_limit {
            config.batch_limit = v;
        }
        if let Some(v) = self.max_request_items {
            config.max_request_items = v;
        }
        if let Some(v) = self.max_concurrent_requests {
            config.set_max_concurrent_requests(v);
        }
        if let Some(v) = self.num_workers {
            config.set_workers(v);
        }
        if let Some(v) = self.admission_timeout_secs {
            let name = origin.name("GATEWAY_ADMISSION_TIMEOUT_SECS", "admission_timeout_secs");
            config.admission_timeout = secs(name, v)?;
        }
        if let Some(v) = self.request_timeout_secs {
            let name = origin.name("GATEWAY_REQUEST_TIMEOUT_SECS", "request_timeout_secs");
            config.request_timeout = secs(name, v)?;
        }
        if let Some(v) = self.max_tokens {
            config.max_tokens = v;
        }
        if let Some(addr) = self.bind_addr {
            config.http_config = config.http_config.clone().with_addr_str(&addr)?;
        }
        if let Some(v) = self.metrics_enabled {
            config.metrics_enabled = v;
        }
        if let Some(v) = self.instance_name {
            config.instance_name = v;
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| GatewayError::config(format!("{}={:?}: {}", name, raw, e))),
        None => Ok(None),
    }
}

fn secs(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        GatewayError::config(format!(
            "{}={}: expected a non-negative number of seconds ({})",
            name, value, e
        ))
    })
}

impl GatewayConfig {
    /// Defaults overlaid with `GATEWAY_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().overlay_env(lookup)
    }

    /// Defaults overlaid with a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        config.overlay_file(path)?;
        Ok(config)
    }

    /// Defaults, then the file named by `GATEWAY_CONFIG` if set, then the environment
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            config.overlay_file(&path)?;
        }
        config.overlay_env(|name| std::env::var(name).ok())
    }

    fn overlay_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        ConfigOverrides::from_lookup(lookup)?.apply(&mut self, Origin::Env)?;
        Ok(self)
    }

    fn overlay_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let overrides: ConfigOverrides = serde_json::from_str(&raw)?;
        overrides.apply(self, Origin::File)
    }

    /// Set the worker count; permits follow it until set on their own
    pub fn set_workers(&mut self, workers: usize) {
        self.num_workers = workers;
        if !self.permits_explicit {
            self.max_concurrent_requests = workers;
        }
    }

    /// Set the permit count, detaching it from the worker count
    pub fn set_max_concurrent_requests(&mut self, permits: usize) {
        self.max_concurrent_requests = permits;
        self.permits_explicit = true;
    }

    /// Reject settings the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("batch_limit", self.batch_limit),
            ("max_request_items", self.max_request_items),
            ("num_workers", self.num_workers),
            ("max_concurrent_requests", self.max_concurrent_requests),
            ("max_tokens", self.max_tokens),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(GatewayError::config(format!("{} must be at least 1", name)));
            }
        }
        if self.admission_timeout.is_zero() {
            return Err(GatewayError::config("admission timeout must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(GatewayError::config("request timeout must be positive"));
        }
        Ok(())
    }

    /// Limits handed to the request supervisor
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            max_request_items: self.max_request_items,
            admission_timeout: self.admission_timeout,
            request_timeout: self.request_timeout,
        }
    }
}

/// Builder for constructing Gateway instances
pub struct GatewayBuilder {
    config: GatewayConfig,
    classifier: Option<Arc<dyn Classifier>>,
}

impl GatewayBuilder {
    /// Create a new GatewayBuilder with default configuration
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            classifier: None,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the compute backend; the worker pool becomes its only caller
    pub fn with_classifier<C: Classifier + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Set items per compute call
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.config.batch_limit = limit;
        self
    }

    /// Set items accepted per request
    pub fn with_max_request_items(mut self, max: usize) -> Self {
        self.config.max_request_items = max;
        self
    }

    /// Set worker pool size; admission permits follow unless set explicitly
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.set_workers(workers);
        self
    }

    /// Set admission permits
    pub fn with_max_concurrent_requests(mut self, permits: usize) -> Self {
        self.config.set_max_concurrent_requests(permits);
        self
    }

    /// Set admission wait
    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.config.admission_timeout = timeout;
        self
    }

    /// Set request deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set HTTP bind address
    pub fn with_http_addr(mut self, addr: &str) -> Result<Self> {
        self.config.http_config = self.config.http_config.with_addr_str(addr)?;
        Ok(self)
    }

    /// Enable or disable metrics
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.config.metrics_enabled = enabled;
        self
    }

    /// Set instance name
    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.config.instance_name = name.into();
        self
    }

    /// Build the Gateway instance
    pub fn build(self) -> Result<Gateway> {
        self.config.validate()?;
        let classifier = self
            .classifier
            .ok_or_else(|| GatewayError::config("no classifier configured"))?;

        info!(
            instance = %self.config.instance_name,
            workers = self.config.num_workers,
            permits = self.config.max_concurrent_requests,
            batch_limit = self.config.batch_limit,
            "Building gateway"
        );

        let metrics = if self.config.metrics_enabled {
            Some(Arc::new(GatewayMetrics::new()?))
        } else {
            None
        };

        let pool = WorkerPool::new(self.config.num_workers, classifier)?
            .with_metrics(metrics.clone());
        let admission = AdmissionController::new(self.config.max_concurrent_requests)
            .with_metrics(metrics.clone());
        let batcher = Batcher::new(BatchConfig::new().max_size(self.config.batch_limit));

        let supervisor = RequestSupervisor::new(
            self.config.supervisor_config(),
            Arc::new(admission),
            batcher,
            Arc::new(pool),
        )
        .with_metrics(metrics.clone());

        Ok(Gateway::new(self.config, supervisor, metrics))
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::LexiconClassifier;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.batch_limit, 16);
        assert_eq!(config.max_request_items, 128);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.max_concurrent_requests, 4);
        assert_eq!(config.admission_timeout, Duration::from_secs(20));
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GATEWAY_NUM_WORKERS", "8"),
            ("GATEWAY_BATCH_LIMIT", "32"),
            ("GATEWAY_REQUEST_TIMEOUT_SECS", "1.5"),
            ("GATEWAY_BIND_ADDR", "127.0.0.1:9100"),
            ("GATEWAY_METRICS", "false"),
        ]))
        .unwrap();

        assert_eq!(config.num_workers, 8);
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.batch_limit, 32);
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.http_config.bind_addr.port(), 9100);
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_explicit_permits_win_over_workers() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GATEWAY_NUM_WORKERS", "8"),
            ("GATEWAY_MAX_CONCURRENT_REQUESTS", "2"),
        ]))
        .unwrap();
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.max_concurrent_requests, 2);
    }

    #[test]
    fn test_malformed_env_names_variable() {
        let err = GatewayConfig::from_lookup(lookup(&[("GATEWAY_NUM_WORKERS", "four")]))
            .unwrap_err();
        assert!(err.to_string().contains("GATEWAY_NUM_WORKERS"));

        let err = GatewayConfig::from_lookup(lookup(&[("GATEWAY_ADMISSION_TIMEOUT_SECS", "-1")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_out_of_range_timeout_is_config_error() {
        let err = GatewayConfig::from_lookup(lookup(&[("GATEWAY_REQUEST_TIMEOUT_SECS", "1e30")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        assert!(err.to_string().contains("GATEWAY_REQUEST_TIMEOUT_SECS"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"admission_timeout_secs": 1e300}}"#).unwrap();
        let err = GatewayConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("admission_timeout_secs"));
    }

    #[test]
    fn test_file_permits_survive_env_workers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_concurrent_requests": 8}}"#).unwrap();

        let config = GatewayConfig::from_file(file.path())
            .unwrap()
            .overlay_env(lookup(&[("GATEWAY_NUM_WORKERS", "2")]))
            .unwrap();
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.max_concurrent_requests, 8);
    }

    #[test]
    fn test_file_workers_carry_permits_until_env_sets_them() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"num_workers": 6}}"#).unwrap();

        let config = GatewayConfig::from_file(file.path())
            .unwrap()
            .overlay_env(lookup(&[]))
            .unwrap();
        assert_eq!(config.max_concurrent_requests, 6);

        let config = GatewayConfig::from_file(file.path())
            .unwrap()
            .overlay_env(lookup(&[("GATEWAY_MAX_CONCURRENT_REQUESTS", "3")]))
            .unwrap();
        assert_eq!(config.num_workers, 6);
        assert_eq!(config.max_concurrent_requests, 3);
    }

    #[test]
    fn test_builder_workers_move_permits() {
        let gateway = GatewayBuilder::new()
            .with_classifier(LexiconClassifier::default())
            .with_workers(8)
            .with_metrics(false)
            .build()
            .unwrap();
        assert_eq!(gateway.admission().capacity(), 8);

        let gateway = GatewayBuilder::new()
            .with_classifier(LexiconClassifier::default())
            .with_max_concurrent_requests(3)
            .with_workers(8)
            .with_metrics(false)
            .build()
            .unwrap();
        assert_eq!(gateway.config().num_workers, 8);
        assert_eq!(gateway.admission().capacity(), 3);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"batch_limit": 8, "admission_timeout_secs": 5, "instance_name": "edge-1"}}"#
        )
        .unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.batch_limit, 8);
        assert_eq!(config.admission_timeout, Duration::from_secs(5));
        assert_eq!(config.instance_name, "edge-1");
        assert_eq!(config.max_request_items, 128);
    }

    #[test]
    fn test_from_file_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"batch_limt": 8}}"#).unwrap();
        assert!(matches!(
            GatewayConfig::from_file(file.path()),
            Err(GatewayError::Serialization(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mut config = GatewayConfig::default();
        config.num_workers = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_default() {
        let gateway = GatewayBuilder::new()
            .with_classifier(LexiconClassifier::default())
            .build();
        assert!(gateway.is_ok());
    }

    #[test]
    fn test_builder_requires_classifier() {
        assert!(matches!(
            GatewayBuilder::new().build(),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_builder_settings() {
        let gateway = GatewayBuilder::new()
            .with_classifier(LexiconClassifier::default())
            .with_workers(2)
            .with_max_concurrent_requests(3)
            .with_batch_limit(8)
            .with_metrics(false)
            .build()
            .unwrap();

        assert_eq!(gateway.config().num_workers, 2);
        assert_eq!(gateway.admission().capacity(), 3);
        assert!(gateway.metrics().is_none());
    }
}
