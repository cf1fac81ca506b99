//! HTTP client for a running gateway

use crate::error::{ErrorKind, GatewayError, Result};
use crate::networking::{ErrorResponse, HealthResponse};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::types::{InferenceResponse, PredictRequest};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

/// Gateway API client
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url`
    ///
    /// The transport timeout covers the gateway's default admission wait
    /// plus its request deadline.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(120))
    }

    /// Create a client with an explicit transport timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Classify `texts`
    pub async fn predict<I, S>(&self, texts: I) -> Result<InferenceResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send_predict(&PredictRequest::new(texts)).await
    }

    /// Classify `texts`, retrying while the gateway is overloaded or timing out
    pub async fn predict_with_retry<I, S>(&self, texts: I, config: RetryConfig) -> Result<InferenceResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = PredictRequest::new(texts);
        RetryPolicy::new(config)
            .execute(|| self.send_predict(&request))
            .await
    }

    async fn send_predict(&self, request: &PredictRequest) -> Result<InferenceResponse> {
        let resp = self
            .client
            .post(self.url("/predict"))
            .json(request)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let body: InferenceResponse = resp.json().await?;
        debug!(batch_size = body.batch_size, "Prediction received");
        Ok(body)
    }

    /// Fetch `/health`
    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self.client.get(self.url("/health")).send().await?;
        Ok(check_status(resp).await?.json().await?)
    }

    /// Whether `/ready` answers 200
    pub async fn ready(&self) -> Result<bool> {
        let resp = self.client.get(self.url("/ready")).send().await?;
        Ok(resp.status().is_success())
    }
}

/// Turn a non-2xx response into [`GatewayError::Remote`]
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let err = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => GatewayError::Remote {
            kind: body.kind,
            status: status.as_u16(),
            message: body.error,
        },
        // Rejected before reaching a handler (malformed JSON, wrong method)
        Err(_) => GatewayError::Remote {
            kind: ErrorKind::Internal,
            status: status.as_u16(),
            message: text,
        },
    };
    Err(err)
}
