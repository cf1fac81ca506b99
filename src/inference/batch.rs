//! Request batching for inference
//!
//! Splits a request into fixed-size, order-preserving batches, fans them out
//! to the worker pool and joins the predictions back into input order.

use std::ops::Range;
use std::sync::Arc;

use super::pool::{BatchOutput, PendingBatch, WorkerPool};
use crate::error::{GatewayError, Result};
use crate::types::ClassId;

/// Configuration for batch splitting
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum items handed to one compute call
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_batch_size: 16 }
    }
}

impl BatchConfig {
    /// Create a new batch config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum batch size
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }
}

/// A contiguous slice of one request's items
///
/// Shares the request's texts; owns only its position.
#[derive(Debug, Clone)]
pub struct Batch {
    index: usize,
    range: Range<usize>,
    texts: Arc<[String]>,
}

impl Batch {
    /// Position of this batch among its siblings
    pub fn index(&self) -> usize {
        self.index
    }

    /// Offset of the first item in the original request
    pub fn offset(&self) -> usize {
        self.range.start
    }

    /// Items in this batch
    pub fn items(&self) -> &[String] {
        &self.texts[self.range.clone()]
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Whether the batch holds no items
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Splits, dispatches and reassembles batches
#[derive(Debug, Clone)]
pub struct Batcher {
    config: BatchConfig,
}

impl Batcher {
    /// Create a new batcher
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Maximum items per batch
    pub fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    /// Cut `texts` into ceil(n / max_batch_size) ordered batches
    pub fn split(&self, texts: Arc<[String]>) -> Vec<Batch> {
        let total = texts.len();
        let size = self.config.max_batch_size.max(1);

        (0..total)
            .step_by(size)
            .enumerate()
            .map(|(index, start)| Batch {
                index,
                range: start..(start + size).min(total),
                texts: Arc::clone(&texts),
            })
            .collect()
    }

    /// Submit every batch to the pool before awaiting any of them
    pub fn dispatch(&self, pool: &WorkerPool, batches: Vec<Batch>) -> Vec<PendingBatch> {
        batches.into_iter().map(|batch| pool.submit(batch)).collect()
    }

    /// Place each batch's predictions at its original offset
    pub fn reassemble(&self, total: usize, outputs: Vec<BatchOutput>) -> Result<Vec<ClassId>> {
        let mut slots: Vec<Option<ClassId>> = vec![None; total];

        for output in outputs {
            for (i, prediction) in output.predictions.into_iter().enumerate() {
                let position = output.offset + i;
                let slot = slots.get_mut(position).ok_or_else(|| {
                    GatewayError::internal(format!(
                        "batch {} wrote past the end of the request ({} >= {})",
                        output.index, position, total
                    ))
                })?;
                if slot.replace(prediction).is_some() {
                    return Err(GatewayError::internal(format!(
                        "item {} predicted twice",
                        position
                    )));
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.ok_or_else(|| {
                    GatewayError::internal(format!("missing prediction for item {}", position))
                })
            })
            .collect()
    }
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::classifier::Classifier;

    fn shared(n: usize) -> Arc<[String]> {
        (0..n).map(|i| format!("item-{}", i)).collect::<Vec<_>>().into()
    }

    fn output(index: usize, offset: usize, predictions: Vec<ClassId>) -> BatchOutput {
        BatchOutput {
            index,
            offset,
            predictions,
        }
    }

    #[test]
    fn test_split_37_by_16() {
        let batcher = Batcher::new(BatchConfig::new().max_size(16));
        let batches = batcher.split(shared(37));

        let lens: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(lens, vec![16, 16, 5]);

        let offsets: Vec<usize> = batches.iter().map(|b| b.offset()).collect();
        assert_eq!(offsets, vec![0, 16, 32]);

        let rejoined: Vec<String> = batches.iter().flat_map(|b| b.items().to_vec()).collect();
        assert_eq!(rejoined, shared(37).to_vec());
    }

    #[test]
    fn test_split_small_request_is_one_batch() {
        let batcher = Batcher::default();
        assert_eq!(batcher.split(shared(1)).len(), 1);
        assert_eq!(batcher.split(shared(16)).len(), 1);
        assert_eq!(batcher.split(shared(17)).len(), 2);
    }

    #[test]
    fn test_split_preserves_every_item_once() {
        let batcher = Batcher::new(BatchConfig::new().max_size(7));
        for n in 1..=128 {
            let batches = batcher.split(shared(n));
            assert_eq!(batches.len(), (n + 6) / 7);
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 7));
            let total: usize = batches.iter().map(|b| b.len()).sum();
            assert_eq!(total, n);
            for (i, b) in batches.iter().enumerate() {
                assert_eq!(b.index(), i);
            }
        }
    }

    #[test]
    fn test_reassemble_out_of_order() {
        let batcher = Batcher::new(BatchConfig::new().max_size(2));
        let outputs = vec![
            output(2, 4, vec![5]),
            output(0, 0, vec![1, 2]),
            output(1, 2, vec![3, 4]),
        ];
        assert_eq!(batcher.reassemble(5, outputs).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_reassemble_detects_gaps_and_overlap() {
        let batcher = Batcher::default();
        assert!(batcher.reassemble(3, vec![output(0, 0, vec![1, 1])]).is_err());
        assert!(batcher
            .reassemble(2, vec![output(0, 0, vec![1, 1]), output(1, 1, vec![1])])
            .is_err());
        assert!(batcher.reassemble(1, vec![output(0, 0, vec![1, 1])]).is_err());
    }

    struct Echo;

    impl Classifier for Echo {
        fn predict(&self, batch: &[String]) -> Result<Vec<ClassId>> {
            batch
                .iter()
                .map(|t| {
                    t.trim_start_matches("item-")
                        .parse()
                        .map_err(|_| GatewayError::compute("bad item"))
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn test_dispatch_and_reassemble_preserve_order() {
        let pool = WorkerPool::new(4, Arc::new(Echo)).unwrap();
        let batcher = Batcher::new(BatchConfig::new().max_size(16));

        let pending = batcher.dispatch(&pool, batcher.split(shared(37)));
        assert_eq!(pending.len(), 3);
        let outputs = futures::future::try_join_all(pending).await.unwrap();

        let predictions = batcher.reassemble(37, outputs).unwrap();
        assert_eq!(predictions, (0..37).collect::<Vec<ClassId>>());
    }
}
