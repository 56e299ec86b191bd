mod catalog;
mod inflight;
mod issue;
mod types;
mod verify;

pub use catalog::CatalogUseCase;
pub use issue::{IssuanceCoordinator, IssueError};
pub use types::{
    ContentCheck, IssuanceOutcome, IssuanceState, Severity, VerificationOutcome,
    VerificationReport, VerificationState,
};
pub use verify::{VerificationCoordinator, VerifyError};
