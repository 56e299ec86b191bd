use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// The single in-flight operation of a coordinator, with a cancel handle.
pub(crate) struct OperationSlot {
    next_id: AtomicU64,
    active: Mutex<Option<(u64, CancellationToken)>>,
}

/// Claim on an [`OperationSlot`]; dropping it frees the slot.
pub(crate) struct ActiveOperation<'a> {
    slot: &'a OperationSlot,
    id: u64,
    token: CancellationToken,
}

impl OperationSlot {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, active: &mut Option<(u64, CancellationToken)>) -> ActiveOperation<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        *active = Some((id, token.clone()));
        ActiveOperation {
            slot: self,
            id,
            token,
        }
    }

    /// Claim the slot unless another operation still holds it.
    pub fn try_begin(&self) -> Option<ActiveOperation<'_>> {
        let mut active = self.lock();
        if active.is_some() {
            return None;
        }
        Some(self.install(&mut active))
    }

    /// Claim the slot, cancelling the operation that held it.
    pub fn supersede(&self) -> ActiveOperation<'_> {
        let mut active = self.lock();
        if let Some((_, previous)) = active.take() {
            previous.cancel();
        }
        self.install(&mut active)
    }

    /// Cancel the current operation, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.lock().as_ref() {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl ActiveOperation<'_> {
    /// Drive `future` unless this operation is cancelled first.
    pub async fn run<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            output = future => Some(output),
        }
    }
}

impl Drop for ActiveOperation<'_> {
    fn drop(&mut self) {
        let mut active = self.slot.lock();
        if matches!(active.as_ref(), Some((id, _)) if *id == self.id) {
            *active = None;
        }
    }
}
