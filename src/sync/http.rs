//! sync::http
//!
//! HTTP adapter for the downstream endpoint.
//!
//! Posts the document as JSON. Server errors and transport failures are
//! retryable; 4xx responses are permanent rejections. Each attempt is
//! bounded by the client timeout.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::document::InterventionDocument;
use super::{Downstream, SyncError};

/// Per-attempt timeout.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP downstream adapter.
#[derive(Debug, Clone)]
pub struct HttpDownstream {
    client: Client,
    url: String,
}

impl HttpDownstream {
    /// Create an adapter for the configured endpoint URL.
    ///
    /// # Errors
    ///
    /// [`SyncError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The configured endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn upload(&self, document: &InterventionDocument) -> Result<(), SyncError> {
        let response = self
            .client
            .post(&self.url)
            .json(document)
            .send()
            .await
            .map_err(|e| SyncError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(SyncError::Rejected {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(SyncError::Unavailable(format!(
                "{}: {}",
                status.as_u16(),
                message
            )))
        }
    }
}
