use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::CollectorConfig;
use crate::error::{Result, TelemetryError};
use crate::metrics::Payload;

/// Header Django's CSRF middleware reads the anti-forgery token from.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Delivers one batch to the ingestion endpoint. `Ok` means the endpoint
/// accepted it (2xx); anything else leaves the batch buffered.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &Payload) -> Result<()>;
}

// ─── HTTP ────────────────────────────────────────────────────────

/// POSTs JSON batches with `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    csrf_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            csrf_token: config.csrf_token.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &Payload) -> Result<()> {
        let body = serde_json::to_vec(payload)?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.csrf_token {
            request = request.header(CSRF_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(
                category = %payload.category,
                samples = payload.metrics.len(),
                status = status.as_u16(),
                "batch accepted"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TelemetryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

// ─── Test double ─────────────────────────────────────────────────
