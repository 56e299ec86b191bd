use super::inflight::OperationSlot;
use super::types::{IssuanceOutcome, IssuanceState, Severity};
use crate::domain::{digest, IssueMetadata};
use crate::infrastructure::gateway::ContentStore;
use crate::infrastructure::registry::{RegistryClient, RegistryError, Rejection, SubmitOutcome};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum IssueError {
    #[error("An issuance is already in progress")]
    OperationInProgress,

    #[error("Issuance was cancelled")]
    Cancelled,

    #[error("Failed to submit certificate: {0}")]
    Registry(#[from] RegistryError),
}

impl IssueError {
    pub fn severity(&self) -> Severity {
        match self {
            IssueError::Registry(_) => Severity::Attention,
            _ => Severity::Informative,
        }
    }
}

/// Hashes a document and anchors the hash in the registry.
///
/// `Idle -> Hashing -> Submitting -> Confirmed | Rejected | Failed`. Only one
/// issuance runs at a time; a concurrent request fails fast with
/// [`IssueError::OperationInProgress`].
pub struct IssuanceCoordinator {
    registry: Arc<dyn RegistryClient>,
    store: Option<Arc<dyn ContentStore>>,
    state: Mutex<IssuanceState>,
    operation: OperationSlot,
}

/// Puts the coordinator back to `Idle` if an issuance is abandoned midway.
struct ResetOnDrop<'a>(&'a Mutex<IssuanceState>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_in_progress() {
            *state = IssuanceState::Idle;
        }
    }
}

impl IssuanceCoordinator {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            registry,
            store: None,
            state: Mutex::new(IssuanceState::Idle),
            operation: OperationSlot::new(),
        }
    }

    /// Pin a snapshot of every issued document before submitting its hash.
    pub fn with_content_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn state(&self) -> IssuanceState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: IssuanceState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Abandon the running issuance. It resolves to [`IssueError::Cancelled`]
    /// and the coordinator returns to `Idle`.
    pub fn cancel(&self) -> bool {
        self.operation.cancel()
    }

    /// Return to `Idle` after a terminal state. No-op while an issuance runs.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.is_in_progress() {
            *state = IssuanceState::Idle;
        }
    }

    pub async fn issue(
        &self,
        content: &[u8],
        metadata: IssueMetadata,
    ) -> Result<IssuanceOutcome, IssueError> {
        let operation = self
            .operation
            .try_begin()
            .ok_or(IssueError::OperationInProgress)?;

        let _reset = ResetOnDrop(&self.state);
        info!(
            "Issuing certificate for {} ({} bytes) to {}",
            metadata.filename.as_deref().unwrap_or("<unnamed>"),
            content.len(),
            metadata.issued_to
        );

        self.set_state(IssuanceState::Hashing);
        let hash = digest(content);
        info!("Computed hash {}", hash);

        self.set_state(IssuanceState::Submitting { hash: hash.clone() });

        let mut metadata = metadata;
        if let Some(store) = self.store.as_ref().filter(|_| metadata.content_id.is_none()) {
            let filename = metadata
                .filename
                .clone()
                .unwrap_or_else(|| format!("certificate-{}", hash.short()));

            match operation.run(store.store(&filename, content)).await {
                None => return Err(IssueError::Cancelled),
                Some(Ok(content_id)) => {
                    info!("Stored snapshot of {} as {}", hash, content_id);
                    metadata.content_id = Some(content_id);
                }
                Some(Err(e)) => {
                    warn!("Snapshot storage failed for {}, issuing without content id: {}", hash, e);
                }
            }
        }

        let submitted = operation
            .run(self.registry.submit(&hash, content, &metadata))
            .await
            .ok_or(IssueError::Cancelled)?;

        match submitted {
            Ok(SubmitOutcome::Accepted(record)) => {
                info!("Certificate {} confirmed at {}", hash, record.timestamp);
                self.set_state(IssuanceState::Confirmed {
                    record: record.clone(),
                });
                Ok(IssuanceOutcome::Confirmed { record })
            }
            Ok(SubmitOutcome::Rejected(Rejection::DuplicateHash)) => {
                info!("Certificate {} already exists in the registry", hash);
                self.set_state(IssuanceState::Rejected { hash: hash.clone() });
                Ok(IssuanceOutcome::Rejected { hash })
            }
            Err(e) => {
                warn!("Submission of {} failed: {}", hash, e);
                self.set_state(IssuanceState::Failed {
                    hash,
                    reason: e.to_string(),
                });
                Err(IssueError::Registry(e))
            }
        }
    }
}
