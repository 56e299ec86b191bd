use crate::domain::{CertificateRecord, ContentHash};
use serde::Serialize;

/// How a front end should present an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Normal result, even when negative (duplicate, not found)
    Informative,
    /// Failure that needs the user's attention (network, tampering)
    Attention,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IssuanceState {
    Idle,
    Hashing,
    Submitting { hash: ContentHash },
    Confirmed { record: CertificateRecord },
    Rejected { hash: ContentHash },
    Failed { hash: ContentHash, reason: String },
}

impl IssuanceState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, IssuanceState::Hashing | IssuanceState::Submitting { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IssuanceState::Confirmed { .. }
                | IssuanceState::Rejected { .. }
                | IssuanceState::Failed { .. }
        )
    }
}

/// Terminal result of a completed issuance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IssuanceOutcome {
    Confirmed { record: CertificateRecord },
    /// The registry already holds this hash; resubmitting will not help.
    Rejected { hash: ContentHash },
}

impl IssuanceOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, IssuanceOutcome::Confirmed { .. })
    }

    pub fn hash(&self) -> &ContentHash {
        match self {
            IssuanceOutcome::Confirmed { record } => &record.hash,
            IssuanceOutcome::Rejected { hash } => hash,
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Informative
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VerificationState {
    Idle,
    Querying { hash: ContentHash },
    Found { record: CertificateRecord },
    NotFound { hash: ContentHash },
    Error { hash: ContentHash, reason: String },
}

impl VerificationState {
    /// `Some(true)` for Found, `Some(false)` for NotFound, otherwise unknown.
    pub fn validity(&self) -> Option<bool> {
        match self {
            VerificationState::Found { .. } => Some(true),
            VerificationState::NotFound { .. } => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Found { record: CertificateRecord },
    NotFound { hash: ContentHash },
}

impl VerificationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationOutcome::Found { .. })
    }

    pub fn record(&self) -> Option<&CertificateRecord> {
        match self {
            VerificationOutcome::Found { record } => Some(record),
            VerificationOutcome::NotFound { .. } => None,
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Informative
    }
}

/// Result of re-hashing a stored snapshot against its certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ContentCheck {
    Intact {
        hash: ContentHash,
        content_id: String,
        media_type: String,
        size: usize,
    },
    /// The snapshot no longer digests to the registered hash.
    TamperDetected {
        expected: ContentHash,
        actual: ContentHash,
        content_id: String,
    },
}

impl ContentCheck {
    pub fn is_intact(&self) -> bool {
        matches!(self, ContentCheck::Intact { .. })
    }

    pub fn severity(&self) -> Severity {
        match self {
            ContentCheck::Intact { .. } => Severity::Informative,
            ContentCheck::TamperDetected { .. } => Severity::Attention,
        }
    }
}

/// Verification result shaped for display: `{valid, hash, details?, ...}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub valid: bool,
    pub hash: ContentHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CertificateRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_check: Option<ContentCheck>,
}

impl VerificationReport {
    pub fn from_outcome(outcome: &VerificationOutcome) -> Self {
        match outcome {
            VerificationOutcome::Found { record } => Self {
                valid: true,
                hash: record.hash.clone(),
                details: Some(record.clone()),
                issued_at: record.issued_at(),
                content_check: None,
            },
            VerificationOutcome::NotFound { hash } => Self {
                valid: false,
                hash: hash.clone(),
                details: None,
                issued_at: None,
                content_check: None,
            },
        }
    }

    pub fn with_content_check(mut self, check: ContentCheck) -> Self {
        self.content_check = Some(check);
        self
    }

    pub fn severity(&self) -> Severity {
        self.content_check
            .as_ref()
            .map(ContentCheck::severity)
            .unwrap_or(Severity::Informative)
    }
}
