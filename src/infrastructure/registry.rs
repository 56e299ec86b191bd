use crate::domain::{CertificateRecord, ContentHash, IssueMetadata};
use crate::infrastructure::config::NotaryConfig;
use crate::infrastructure::http::{HttpTransport, RawResponse, TransportError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Business-level refusal from the registry. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    DuplicateHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(CertificateRecord),
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(CertificateRecord),
    NotFound,
}

/// Infrastructure failure talking to the registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Registry unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("Registry storage error: {0}")]
    Storage(String),
}

impl From<TransportError> for RegistryError {
    fn from(e: TransportError) -> Self {
        RegistryError::Network(e.to_string())
    }
}

/// Typed contract over an append-only certificate registry.
///
/// Implementations must never overwrite an accepted record: a second
/// `submit` of the same hash yields `Rejected(DuplicateHash)`.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Register `hash`, the digest of `content`. Registries that hash on
    /// their side receive the document itself and must agree on the digest.
    async fn submit(
        &self,
        hash: &ContentHash,
        content: &[u8],
        metadata: &IssueMetadata,
    ) -> Result<SubmitOutcome, RegistryError>;

    async fn lookup(&self, hash: &ContentHash) -> Result<LookupOutcome, RegistryError>;

    /// Every record in registry order, each hash at most once.
    async fn list(&self) -> Result<Vec<CertificateRecord>, RegistryError>;
}

/// Drop repeated hashes, keeping the first occurrence.
pub fn dedupe_by_hash(records: Vec<CertificateRecord>) -> Vec<CertificateRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.hash.clone()))
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueResponse {
    hash: ContentHash,
    #[serde(default, alias = "cid")]
    content_id: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyDetails {
    issued_to: String,
    issued_by: String,
    timestamp: i64,
    #[serde(default, alias = "cid")]
    content_id: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
    #[serde(default)]
    details: Option<VerifyDetails>,
}

/// Registry reached over HTTP.
///
/// - `POST /issue` with the document as multipart field `file`; the registry
///   hashes and pins it itself and answers with `{hash, cid}`. 409 means the
///   hash already exists
/// - `GET /verify/<hash>` returning `{valid, details}`
/// - `GET /certificates` returning a JSON array of records
pub struct HttpRegistryClient {
    transport: HttpTransport,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(config: &NotaryConfig) -> Self {
        Self {
            transport: HttpTransport::new(config.request_timeout),
            base_url: config.registry_url.clone(),
        }
    }

    fn is_duplicate(response: &RawResponse) -> bool {
        response.status == StatusCode::CONFLICT
            || response
                .error_message()
                .to_lowercase()
                .contains("already exists")
    }

    fn decode<'a, T: Deserialize<'a>>(response: &'a RawResponse) -> Result<T, RegistryError> {
        serde_json::from_slice(&response.body)
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))
    }

    fn unavailable(response: &RawResponse) -> RegistryError {
        RegistryError::Unavailable {
            status: response.status.as_u16(),
            message: response.error_message(),
        }
    }

    fn issue_form(hash: &ContentHash, content: &[u8], metadata: &IssueMetadata) -> Form {
        let filename = metadata
            .filename
            .clone()
            .unwrap_or_else(|| format!("certificate-{}", hash.short()));

        let mut form = Form::new()
            .part("file", Part::bytes(content.to_vec()).file_name(filename))
            .text("issuedTo", metadata.issued_to.clone())
            .text("issuedBy", metadata.issued_by.clone());
        if let Some(content_id) = &metadata.content_id {
            form = form.text("contentId", content_id.clone());
        }
        form
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn submit(
        &self,
        hash: &ContentHash,
        content: &[u8],
        metadata: &IssueMetadata,
    ) -> Result<SubmitOutcome, RegistryError> {
        let request = self
            .transport
            .post(&format!("{}/issue", self.base_url))
            .multipart(Self::issue_form(hash, content, metadata));

        let response = self.transport.send(request).await?;

        if !response.status.is_success() {
            if Self::is_duplicate(&response) {
                debug!("Registry reported duplicate hash {}", hash);
                return Ok(SubmitOutcome::Rejected(Rejection::DuplicateHash));
            }
            return Err(Self::unavailable(&response));
        }

        let issued: IssueResponse = Self::decode(&response)?;
        if issued.hash != *hash {
            return Err(RegistryError::InvalidResponse(format!(
                "registry acknowledged {} while {} was submitted",
                issued.hash, hash
            )));
        }

        let content_id = issued.content_id.or_else(|| metadata.content_id.clone());
        let record = match issued.timestamp {
            Some(timestamp) => {
                let mut record = CertificateRecord::from_submission(hash.clone(), metadata, timestamp);
                record.content_id = content_id;
                record
            }
            // The timestamp is assigned on-chain; read the stored record back.
            None => match self.lookup(hash).await? {
                LookupOutcome::Found(mut record) => {
                    record.content_id = record.content_id.or(content_id);
                    record.filename = record.filename.or_else(|| metadata.filename.clone());
                    record
                }
                LookupOutcome::NotFound => {
                    return Err(RegistryError::InvalidResponse(format!(
                        "accepted hash {} is not visible in the registry",
                        hash
                    )))
                }
            },
        };

        Ok(SubmitOutcome::Accepted(record))
    }

    async fn lookup(&self, hash: &ContentHash) -> Result<LookupOutcome, RegistryError> {
        let request = self
            .transport
            .get(&format!("{}/verify/{}", self.base_url, hash));

        let response = self.transport.send(request).await?;

        if response.status == StatusCode::NOT_FOUND {
            return Ok(LookupOutcome::NotFound);
        }
        if !response.status.is_success() {
            return Err(Self::unavailable(&response));
        }

        let verified: VerifyResponse = Self::decode(&response)?;
        if !verified.valid {
            return Ok(LookupOutcome::NotFound);
        }

        let details = verified.details.ok_or_else(|| {
            RegistryError::InvalidResponse("valid certificate without details".to_string())
        })?;

        Ok(LookupOutcome::Found(CertificateRecord {
            hash: hash.clone(),
            content_id: details.content_id,
            issued_to: details.issued_to,
            issued_by: details.issued_by,
            timestamp: details.timestamp,
            filename: details.filename,
        }))
    }

    async fn list(&self) -> Result<Vec<CertificateRecord>, RegistryError> {
        let request = self
            .transport
            .get(&format!("{}/certificates", self.base_url));

        let response = self.transport.send(request).await?;
        if !response.status.is_success() {
            return Err(Self::unavailable(&response));
        }

        let records: Vec<CertificateRecord> = Self::decode(&response)?;
        let total = records.len();
        let records = dedupe_by_hash(records);
        if records.len() != total {
            warn!(
                "Registry listed {} duplicate entries; keeping first occurrences",
                total - records.len()
            );
        }

        Ok(records)
    }
}
