//! # Inference Gateway
//!
//! A bounded-concurrency gateway in front of a batch classifier. Requests
//! carrying up to 128 texts are admitted under a fixed number of permits,
//! cut into batches, fanned out to a worker pool and joined back in input
//! order under a request deadline.
//!
//! ## Features
//!
//! - **Admission control**: Semaphore permits with a bounded wait (429 on expiry)
//! - **Batching**: Order-preserving split and reassembly
//! - **Worker pool**: Fixed threads, panics contained as compute failures
//! - **Deadlines**: Fail-fast fan-in bounded by a request timeout (504)
//! - **Metrics**: Prometheus-compatible metrics export
//! - **Client**: HTTP client with retry for overload and timeouts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inference_gateway::{GatewayBuilder, LexiconClassifier};
//!
//! #[tokio::main]
//! async fn main() -> inference_gateway::Result<()> {
//!     let gateway = GatewayBuilder::new()
//!         .with_classifier(LexiconClassifier::default())
//!         .with_workers(4)
//!         .build()?;
//!
//!     let response = gateway
//!         .predict(vec!["great service".into(), "not good".into()])
//!         .await?;
//!     println!("{:?}", response.results);
//!
//!     gateway.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Client Usage
//!
//! ```rust,no_run
//! use inference_gateway::client::GatewayClient;
//! use inference_gateway::retry::RetryConfig;
//!
//! #[tokio::main]
//! async fn main() -> inference_gateway::Result<()> {
//!     let client = GatewayClient::new("http://localhost:8000")?;
//!     let response = client
//!         .predict_with_retry(["I love it", "I hate it"], RetryConfig::default())
//!         .await?;
//!     assert_eq!(response.batch_size, 2);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod admission;
pub mod builder;
pub mod client;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod networking;
pub mod retry;
pub mod runtime;
pub mod supervisor;
pub mod types;

// Re-exports for ergonomic API
pub use admission::{AdmissionController, Permit};
pub use builder::{GatewayBuilder, GatewayConfig};
pub use client::GatewayClient;
pub use error::{ErrorKind, GatewayError, Result};
pub use inference::{Batch, BatchConfig, Batcher, Classifier, LexiconClassifier, PoolStats, WorkerPool};
pub use metrics::GatewayMetrics;
pub use networking::{ErrorResponse, HttpServer, HttpServerConfig};
pub use runtime::{Gateway, RuntimeState};
pub use supervisor::{RequestState, RequestSupervisor, SupervisorConfig};
pub use types::{ClassId, InferenceRequest, InferenceResponse, PredictRequest, PredictionResult, RequestId};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::GatewayBuilder;
    pub use crate::client::GatewayClient;
    pub use crate::error::{GatewayError, Result};
    pub use crate::inference::{Classifier, LexiconClassifier};
    pub use crate::runtime::Gateway;
    pub use crate::types::{ClassId, InferenceResponse, PredictionResult};
}
