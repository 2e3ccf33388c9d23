//! The network seam behind the dispatch queue.
//!
//! The worker never talks HTTP directly: it hands an [`OutboundRequest`] to
//! a [`Transport`] and classifies the status that comes back. Production
//! uses [`HttpTransport`]; tests substitute scripted transports.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

/// Authentication attached to an outbound request.
#[derive(Debug, Clone)]
pub enum RequestAuth {
    /// HTTP Basic `username:apiKey`, as used by the Cin7 Omni v1 API.
    Basic {
        username: String,
        api_key: SecretString,
    },
    /// Account-id/application-key header pair, as used by the Cin7 Core API.
    AccountKey {
        account_id: String,
        app_key: SecretString,
    },
}

/// A queued outbound HTTP POST.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Short human label for logs, e.g. `omni quote #1001`.
    pub label: String,
    pub url: String,
    pub auth: RequestAuth,
    pub body: Value,
}

/// Response surfaced to the dispatch worker.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, when the server sent one.
    pub retry_after: Option<Duration>,
    /// Response body, `Null` when it was not JSON.
    pub body: Value,
}

/// Transport-level failure: connect error, timeout, broken response stream.
/// Always treated as retryable by the worker.
#[derive(Debug, Clone, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Executes outbound requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no HTTP status was obtained at all;
    /// non-2xx statuses are returned as ordinary responses.
    async fn execute(&self, request: &OutboundRequest)
    -> Result<TransportResponse, TransportError>;
}

/// Production transport backed by reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a 30 second request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never happen
    /// under normal circumstances as we use standard TLS configuration.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &OutboundRequest,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.post(&request.url).json(&request.body);

        builder = match &request.auth {
            RequestAuth::Basic { username, api_key } => {
                builder.basic_auth(username, Some(api_key.expose_secret()))
            }
            RequestAuth::AccountKey {
                account_id,
                app_key,
            } => builder
                .header("api-auth-accountid", account_id)
                .header("api-auth-applicationkey", app_key.expose_secret()),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        // A non-JSON body (empty 5xx pages and the like) is not an error in
        // itself; the status carries the verdict.
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}
