use super::hasher::ContentHash;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Metadata supplied by the issuer alongside a document hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueMetadata {
    pub issued_to: String,
    pub issued_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl IssueMetadata {
    pub fn new(issued_to: &str, issued_by: &str) -> Self {
        Self {
            issued_to: issued_to.to_string(),
            issued_by: issued_by.to_string(),
            content_id: None,
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    pub fn with_content_id(mut self, content_id: &str) -> Self {
        self.content_id = Some(content_id.to_string());
        self
    }
}

/// A certificate as held by the registry. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub hash: ContentHash,
    #[serde(default, alias = "cid", skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    pub issued_to: String,
    pub issued_by: String,
    /// Seconds since epoch, assigned by the registry on acceptance
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl CertificateRecord {
    pub fn from_submission(hash: ContentHash, metadata: &IssueMetadata, timestamp: i64) -> Self {
        Self {
            hash,
            content_id: metadata.content_id.clone(),
            issued_to: metadata.issued_to.clone(),
            issued_by: metadata.issued_by.clone(),
            timestamp,
            filename: metadata.filename.clone(),
        }
    }

    /// Registry timestamp rendered as RFC 3339 UTC, e.g. `2024-01-01T00:00:00Z`
    pub fn issued_at(&self) -> Option<String> {
        DateTime::from_timestamp(self.timestamp, 0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// Case-insensitive substring match over the searchable fields.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }

        [
            Some(self.hash.as_str()),
            Some(self.issued_to.as_str()),
            Some(self.issued_by.as_str()),
            self.content_id.as_deref(),
            self.filename.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&query))
    }
}

/// Filter records by a free-text query, preserving their order.
pub fn search<'a>(records: &'a [CertificateRecord], query: &str) -> Vec<&'a CertificateRecord> {
    records.iter().filter(|r| r.matches_query(query)).collect()
}
