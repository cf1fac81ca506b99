//! Batched inference over a bounded worker pool
//!
//! Provides request splitting, the compute worker pool and the classifier
//! interface it drives.

pub mod batch;
pub mod classifier;
pub mod pool;

pub use batch::{Batch, BatchConfig, Batcher};
pub use classifier::{Classifier, LexiconClassifier};
pub use pool::{BatchOutput, PendingBatch, PoolStats, WorkerPool};
