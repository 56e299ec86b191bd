use crate::domain::{digest, ContentHash};
use crate::infrastructure::config::NotaryConfig;
use crate::infrastructure::http::{HttpTransport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Content identifier is empty or malformed")]
    InvalidIdentifier,

    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Unsupported gateway response (HTTP {status}): {message}")]
    UnsupportedResponse { status: u16, message: String },
}

impl From<TransportError> for RetrievalError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Request(_) => RetrievalError::InvalidIdentifier,
            other => RetrievalError::NetworkError(other.to_string()),
        }
    }
}

/// Trim a content identifier and check it can be placed in a gateway path.
///
/// CIDs are base32/base58 strings, optionally followed by a path inside a
/// pinned directory.
pub fn parse_content_id(content_id: &str) -> Result<&str, RetrievalError> {
    let content_id = content_id.trim();
    let well_formed = !content_id.is_empty()
        && !content_id.starts_with('/')
        && content_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));

    if well_formed {
        Ok(content_id)
    } else {
        Err(RetrievalError::InvalidIdentifier)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Upload rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Upload response did not include a content identifier")]
    MissingIdentifier,
}

impl From<TransportError> for StoreError {
    fn from(e: TransportError) -> Self {
        StoreError::NetworkError(e.to_string())
    }
}

/// Bytes fetched from the gateway plus the advertised media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub content_id: String,
    pub media_type: String,
    pub bytes: Bytes,
}

impl FetchedContent {
    pub fn digest(&self) -> ContentHash {
        digest(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the fetched bytes to a local file.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)?;
        info!("Saved {} bytes of {} to {}", self.len(), self.content_id, path.display());
        Ok(())
    }
}

#[async_trait]
pub trait ContentRetriever: Send + Sync {
    async fn fetch(&self, content_id: &str) -> Result<FetchedContent, RetrievalError>;
}

/// Pins document snapshots into content-addressed storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Returns the content identifier assigned by the storage service.
    async fn store(&self, filename: &str, content: &[u8]) -> Result<String, StoreError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(alias = "IpfsHash", alias = "Hash")]
    cid: Option<String>,
}

/// HTTP client for the content gateway and its upload endpoint.
pub struct GatewayClient {
    transport: HttpTransport,
    gateway_url: String,
    upload_url: String,
}

impl GatewayClient {
    pub fn new(config: &NotaryConfig) -> Self {
        Self {
            transport: HttpTransport::new(config.request_timeout),
            gateway_url: config.gateway_url.clone(),
            upload_url: config.upload_url.clone(),
        }
    }

    /// Public URL of a content identifier on the configured gateway
    pub fn gateway_url(&self, content_id: &str) -> String {
        format!("{}/{}", self.gateway_url, content_id.trim())
    }
}

#[async_trait]
impl ContentRetriever for GatewayClient {
    async fn fetch(&self, content_id: &str) -> Result<FetchedContent, RetrievalError> {
        let content_id = parse_content_id(content_id)?;

        let response = self
            .transport
            .send(self.transport.get(&self.gateway_url(content_id)))
            .await?;

        if response.status == StatusCode::NOT_FOUND {
            return Err(RetrievalError::NotFound(content_id.to_string()));
        }
        if !response.status.is_success() {
            return Err(RetrievalError::UnsupportedResponse {
                status: response.status.as_u16(),
                message: response.error_message(),
            });
        }

        debug!("Fetched {} bytes for {}", response.body.len(), content_id);

        Ok(FetchedContent {
            content_id: content_id.to_string(),
            media_type: response
                .content_type
                .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
            bytes: response.body,
        })
    }
}

#[async_trait]
impl ContentStore for GatewayClient {
    async fn store(&self, filename: &str, content: &[u8]) -> Result<String, StoreError> {
        let part = Part::bytes(content.to_vec()).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .transport
            .send(self.transport.post(&self.upload_url).multipart(form))
            .await?;
        if !response.status.is_success() {
            return Err(StoreError::Rejected {
                status: response.status.as_u16(),
                message: response.error_message(),
            });
        }

        let uploaded: UploadResponse =
            serde_json::from_slice(&response.body).map_err(|_| StoreError::MissingIdentifier)?;

        match uploaded.cid {
            Some(cid) if !cid.trim().is_empty() => {
                info!("Pinned {} ({} bytes) as {}", filename, content.len(), cid);
                Ok(cid)
            }
            _ => Err(StoreError::MissingIdentifier),
        }
    }
}

/// Holds at most one fetched buffer.
///
/// The previous buffer is dropped before a new fetch starts and when the slot
/// itself is dropped, so a component never keeps two snapshots alive.
pub struct ContentSlot {
    retriever: Arc<dyn ContentRetriever>,
    current: Option<FetchedContent>,
}

impl ContentSlot {
    pub fn new(retriever: Arc<dyn ContentRetriever>) -> Self {
        Self {
            retriever,
            current: None,
        }
    }

    pub async fn load(&mut self, content_id: &str) -> Result<&FetchedContent, RetrievalError> {
        self.release();
        let fetched = self.retriever.fetch(content_id).await?;
        Ok(self.current.insert(fetched))
    }

    pub fn current(&self) -> Option<&FetchedContent> {
        self.current.as_ref()
    }

    pub fn release(&mut self) {
        if let Some(previous) = self.current.take() {
            debug!("Releasing {} byte buffer for {}", previous.len(), previous.content_id);
        }
    }
}
