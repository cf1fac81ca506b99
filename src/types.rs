//! Core types for the inference gateway
//!
//! ## Table of Contents
//! - **RequestId**: Unique identifier for an inference request
//! - **InferenceRequest**: Validated, immutable list of input texts
//! - **PredictRequest**: Wire format of an inbound request
//! - **PredictionResult**: One text paired with its predicted class
//! - **InferenceResponse**: Ordered results for a whole request

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Class id produced by the compute collaborator
pub type ClassId = u32;

/// Unique identifier for an inference request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new random RequestId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", &self.0.to_string()[..8])
    }
}

/// Inbound request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Texts to classify, in order
    pub texts: Vec<String>,
}

impl PredictRequest {
    /// Create a request body from any iterator of strings
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: texts.into_iter().map(Into::into).collect(),
        }
    }
}

/// A validated inference request
///
/// Holds between 1 and `max_items` texts. The texts are shared, not copied,
/// with every batch cut from this request.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    id: RequestId,
    texts: Arc<[String]>,
}

impl InferenceRequest {
    /// Validate and wrap a list of texts
    pub fn new(texts: Vec<String>, max_items: usize) -> Result<Self> {
        if texts.is_empty() {
            return Err(GatewayError::EmptyInput);
        }
        if texts.len() > max_items {
            return Err(GatewayError::BatchTooLarge {
                len: texts.len(),
                max: max_items,
            });
        }

        Ok(Self {
            id: RequestId::new(),
            texts: texts.into(),
        })
    }

    /// Request identifier
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Input texts in arrival order
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Shared handle to the texts
    pub fn shared_texts(&self) -> Arc<[String]> {
        Arc::clone(&self.texts)
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Always false for a validated request
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Prediction for a single input item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Source text
    pub text: String,
    /// Predicted class id
    pub predicted_class: ClassId,
}

/// Response for a whole request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// Number of input items
    pub batch_size: usize,
    /// Results aligned 1:1 with the input order
    pub results: Vec<PredictionResult>,
}

impl InferenceResponse {
    /// Pair each input text with its prediction by position
    pub fn from_predictions(request: &InferenceRequest, predictions: Vec<ClassId>) -> Result<Self> {
        if predictions.len() != request.len() {
            return Err(GatewayError::internal(format!(
                "expected {} predictions, got {}",
                request.len(),
                predictions.len()
            )));
        }

        let results = request
            .texts()
            .iter()
            .zip(predictions)
            .map(|(text, predicted_class)| PredictionResult {
                text: text.clone(),
                predicted_class,
            })
            .collect();

        Ok(Self {
            batch_size: request.len(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text-{}", i)).collect()
    }

    #[test]
    fn test_request_validation() {
        assert!(matches!(
            InferenceRequest::new(Vec::new(), 128),
            Err(GatewayError::EmptyInput)
        ));
        assert!(matches!(
            InferenceRequest::new(texts(129), 128),
            Err(GatewayError::BatchTooLarge { len: 129, max: 128 })
        ));

        let one = InferenceRequest::new(texts(1), 128).unwrap();
        assert_eq!(one.len(), 1);
        let full = InferenceRequest::new(texts(128), 128).unwrap();
        assert_eq!(full.len(), 128);
    }

    #[test]
    fn test_response_pairs_by_position() {
        let request = InferenceRequest::new(texts(3), 128).unwrap();
        let response = InferenceResponse::from_predictions(&request, vec![2, 0, 1]).unwrap();

        assert_eq!(response.batch_size, 3);
        assert_eq!(response.results[0].text, "text-0");
        assert_eq!(response.results[0].predicted_class, 2);
        assert_eq!(response.results[2].text, "text-2");
        assert_eq!(response.results[2].predicted_class, 1);
    }

    #[test]
    fn test_response_rejects_length_mismatch() {
        let request = InferenceRequest::new(texts(3), 128).unwrap();
        assert!(InferenceResponse::from_predictions(&request, vec![1, 1]).is_err());
    }

    #[test]
    fn test_response_wire_format() {
        let request = InferenceRequest::new(vec!["great".to_string()], 128).unwrap();
        let response = InferenceResponse::from_predictions(&request, vec![2]).unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "batch_size": 1,
                "results": [{"text": "great", "predicted_class": 2}]
            })
        );
    }

    #[test]
    fn test_request_id_display() {
        let id = RequestId::new();
        assert!(id.to_string().starts_with("req-"));
        assert_eq!(id.to_string().len(), 12);
    }
}
