use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to build request: {0}")]
    Request(String),

    #[error("Transport failure: {0}")]
    Network(reqwest::Error),

    #[error("No response within {0:?}")]
    Timeout(Duration),
}

/// A fully-read HTTP response.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    /// Best-effort human readable message from an error payload.
    ///
    /// Registry errors look like `{"message": ..., "details": {"reason": ...}}`
    /// or `{"message": ..., "details": "..."}`.
    pub fn error_message(&self) -> String {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            let message = value["message"].as_str();
            let reason = value["details"]["reason"]
                .as_str()
                .or_else(|| value["details"].as_str())
                .or_else(|| value["reason"].as_str());

            match (message, reason) {
                (Some(m), Some(r)) => return format!("{}: {}", m, r),
                (Some(m), None) => return m.to_string(),
                (None, Some(r)) => return r.to_string(),
                (None, None) => {}
            }
        }

        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        if text.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            text.chars().take(200).collect()
        }
    }
}

/// Shared reqwest client (rustls, so `https://` endpoints work) plus the
/// configured request timeout.
///
/// Dropping the future returned by [`HttpTransport::send`] aborts the request
/// and frees any partially-read body.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("certificate-notary/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self { client, timeout }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url).timeout(self.timeout)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url).timeout(self.timeout)
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<RawResponse, TransportError> {
        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if e.is_builder() {
            TransportError::Request(e.to_string())
        } else {
            TransportError::Network(e)
        }
    }
}
