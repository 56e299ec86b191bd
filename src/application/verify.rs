use super::inflight::OperationSlot;
use super::types::{ContentCheck, Severity, VerificationOutcome, VerificationState};
use crate::domain::{digest, CertificateRecord, ContentHash, HashFormatError};
use crate::infrastructure::gateway::{ContentRetriever, ContentSlot, RetrievalError};
use crate::infrastructure::registry::{LookupOutcome, RegistryClient, RegistryError};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] HashFormatError),

    #[error("Certificate {0} has no stored snapshot to re-verify")]
    NoSnapshot(ContentHash),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Content retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Superseded by a newer request")]
    Superseded,
}

impl VerifyError {
    pub fn severity(&self) -> Severity {
        match self {
            VerifyError::Registry(_) | VerifyError::Retrieval(_) => Severity::Attention,
            _ => Severity::Informative,
        }
    }
}

/// Looks hashes up in the registry and re-checks stored snapshots.
///
/// `Idle -> Querying -> Found | NotFound | Error`. Starting a new request
/// supersedes the one in flight: the stale call resolves to
/// [`VerifyError::Superseded`] and its network call is dropped before the new
/// one is sent.
pub struct VerificationCoordinator {
    registry: Arc<dyn RegistryClient>,
    // Held for the whole network phase so calls never overlap.
    content: tokio::sync::Mutex<ContentSlot>,
    state: Mutex<VerificationState>,
    operation: OperationSlot,
}

/// Drops an abandoned `Querying` state back to `Idle`.
struct ClearQuerying<'a> {
    state: &'a Mutex<VerificationState>,
    hash: &'a ContentHash,
}

impl Drop for ClearQuerying<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(&*state, VerificationState::Querying { hash } if hash == self.hash) {
            *state = VerificationState::Idle;
        }
    }
}

impl VerificationCoordinator {
    pub fn new(registry: Arc<dyn RegistryClient>, retriever: Arc<dyn ContentRetriever>) -> Self {
        Self {
            registry,
            content: tokio::sync::Mutex::new(ContentSlot::new(retriever)),
            state: Mutex::new(VerificationState::Idle),
            operation: OperationSlot::new(),
        }
    }

    pub fn state(&self) -> VerificationState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: VerificationState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Abandon the request in flight, if any.
    pub fn cancel(&self) -> bool {
        self.operation.cancel()
    }

    /// Verify a hash typed or pasted by the user.
    pub async fn verify(&self, input: &str) -> Result<VerificationOutcome, VerifyError> {
        let hash = ContentHash::parse(input)?;
        self.verify_hash(hash).await
    }

    /// Verify an original document by digesting it locally first.
    pub async fn verify_document(&self, content: &[u8]) -> Result<VerificationOutcome, VerifyError> {
        self.verify_hash(digest(content)).await
    }

    pub async fn verify_hash(&self, hash: ContentHash) -> Result<VerificationOutcome, VerifyError> {
        let operation = self.operation.supersede();
        let _network = operation
            .run(self.content.lock())
            .await
            .ok_or(VerifyError::Superseded)?;

        info!("Verifying hash {}", hash);
        self.set_state(VerificationState::Querying { hash: hash.clone() });
        let querying_hash = hash.clone();
        let _reset = ClearQuerying {
            state: &self.state,
            hash: &querying_hash,
        };

        let looked_up = operation
            .run(self.registry.lookup(&hash))
            .await
            .ok_or(VerifyError::Superseded)?;

        match looked_up {
            Ok(LookupOutcome::Found(record)) => {
                info!("Verification result for {}: valid", hash);
                self.set_state(VerificationState::Found {
                    record: record.clone(),
                });
                Ok(VerificationOutcome::Found { record })
            }
            Ok(LookupOutcome::NotFound) => {
                info!("Verification result for {}: not registered", hash);
                self.set_state(VerificationState::NotFound { hash: hash.clone() });
                Ok(VerificationOutcome::NotFound { hash })
            }
            Err(e) => {
                warn!("Verification of {} failed: {}", hash, e);
                self.set_state(VerificationState::Error {
                    hash,
                    reason: e.to_string(),
                });
                Err(VerifyError::Registry(e))
            }
        }
    }

    /// Fetch the record's snapshot, re-digest it and compare with the
    /// registered hash.
    ///
    /// Registries may leave the content id out of single-hash lookups; it is
    /// then resolved from the certificate listing.
    pub async fn reverify_content(
        &self,
        record: &CertificateRecord,
    ) -> Result<ContentCheck, VerifyError> {
        let operation = self.operation.supersede();
        let mut slot = operation
            .run(self.content.lock())
            .await
            .ok_or(VerifyError::Superseded)?;

        let content_id = match stored_content_id(record) {
            Some(content_id) => content_id,
            None => {
                debug!("No content id on {}, consulting the registry listing", record.hash);
                let listed = operation
                    .run(self.registry.list())
                    .await
                    .ok_or(VerifyError::Superseded)??;
                listed
                    .iter()
                    .filter(|r| r.hash == record.hash)
                    .find_map(stored_content_id)
                    .ok_or_else(|| VerifyError::NoSnapshot(record.hash.clone()))?
            }
        };

        let fetched = operation
            .run(slot.load(&content_id))
            .await
            .ok_or(VerifyError::Superseded)??;

        let actual = fetched.digest();
        if actual == record.hash {
            info!("Snapshot {} matches certificate {}", content_id, record.hash);
            Ok(ContentCheck::Intact {
                hash: actual,
                content_id,
                media_type: fetched.media_type.clone(),
                size: fetched.len(),
            })
        } else {
            error!(
                "Tamper detected: snapshot {} digests to {} but certificate holds {}",
                content_id, actual, record.hash
            );
            Ok(ContentCheck::TamperDetected {
                expected: record.hash.clone(),
                actual,
                content_id,
            })
        }
    }

    /// Free the buffer kept from the last re-verification.
    pub async fn release_content(&self) {
        self.content.lock().await.release();
    }
}

fn stored_content_id(record: &CertificateRecord) -> Option<String> {
    record
        .content_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
