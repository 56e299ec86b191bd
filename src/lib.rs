pub mod application;
pub mod domain;
pub mod handlers;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{
    CatalogUseCase, IssuanceCoordinator, Severity, VerificationCoordinator, VerificationOutcome,
};
pub use domain::{digest, CertificateRecord, ContentHash, IssueMetadata};
pub use infrastructure::config::NotaryConfig;
pub use infrastructure::database::SqliteRegistry;
pub use infrastructure::gateway::{ContentRetriever, ContentStore, GatewayClient};
pub use infrastructure::registry::{HttpRegistryClient, RegistryClient};
