// Command handlers behind the CLI. Kept in the library so integration tests
// can drive them against a mock registry and gateway.

use crate::application::{
    CatalogUseCase, IssuanceCoordinator, Severity, VerificationCoordinator, VerificationReport,
};
use crate::domain::{digest, IssueMetadata};
use crate::infrastructure::config::NotaryConfig;
use crate::infrastructure::database::SqliteRegistry;
use crate::infrastructure::gateway::{ContentRetriever, ContentSlot, ContentStore, RetrievalError};
use crate::infrastructure::registry::{HttpRegistryClient, RegistryClient};
use serde_json::{json, Value};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// What a command produced, and how loudly to present it.
#[derive(Debug, Clone)]
pub struct CommandReport {
    pub severity: Severity,
    pub output: Value,
}

impl CommandReport {
    fn informative(output: Value) -> Self {
        Self {
            severity: Severity::Informative,
            output,
        }
    }

    fn error(severity: Severity, error: &dyn Error) -> Self {
        Self {
            severity,
            output: json!({ "error": error.to_string() }),
        }
    }
}

/// HTTP registry by default, or the local SQLite registry when a path is given.
pub fn open_registry(
    config: &NotaryConfig,
    local_db: Option<&str>,
) -> Result<Arc<dyn RegistryClient>, Box<dyn Error>> {
    match local_db {
        Some(path) => {
            let registry = SqliteRegistry::open(path)?;
            info!(
                "Using local registry {} with {} certificates",
                path,
                registry.count_certificates()?
            );
            Ok(Arc::new(registry))
        }
        None => {
            info!("Using registry at {}", config.registry_url);
            Ok(Arc::new(HttpRegistryClient::new(config)))
        }
    }
}

pub async fn handle_issue(
    registry: Arc<dyn RegistryClient>,
    store: Option<Arc<dyn ContentStore>>,
    path: &Path,
    issued_to: &str,
    issued_by: &str,
) -> Result<CommandReport, Box<dyn Error>> {
    let content = std::fs::read(path)?;
    let mut metadata = IssueMetadata::new(issued_to, issued_by);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        metadata = metadata.with_filename(name);
    }

    let mut coordinator = IssuanceCoordinator::new(registry);
    if let Some(store) = store {
        coordinator = coordinator.with_content_store(store);
    }

    Ok(match coordinator.issue(&content, metadata).await {
        Ok(outcome) => {
            let message = if outcome.is_confirmed() {
                "Certificate issued successfully"
            } else {
                "Certificate already exists"
            };
            CommandReport {
                severity: outcome.severity(),
                output: json!({ "message": message, "hash": outcome.hash(), "result": outcome }),
            }
        }
        Err(e) => CommandReport::error(e.severity(), &e),
    })
}

pub async fn handle_verify(
    registry: Arc<dyn RegistryClient>,
    retriever: Arc<dyn ContentRetriever>,
    input: &str,
    check_content: bool,
) -> Result<CommandReport, Box<dyn Error>> {
    let coordinator = VerificationCoordinator::new(registry, retriever);
    let outcome = match coordinator.verify(input).await {
        Ok(outcome) => outcome,
        Err(e) => return Ok(CommandReport::error(e.severity(), &e)),
    };

    let mut report = VerificationReport::from_outcome(&outcome);
    if check_content {
        if let Some(record) = outcome.record() {
            match coordinator.reverify_content(record).await {
                Ok(check) => report = report.with_content_check(check),
                Err(e) => {
                    let mut output = serde_json::to_value(&report)?;
                    output["contentCheckError"] = json!(e.to_string());
                    return Ok(CommandReport {
                        severity: e.severity(),
                        output,
                    });
                }
            }
        }
    }

    Ok(CommandReport {
        severity: report.severity(),
        output: serde_json::to_value(&report)?,
    })
}

/// Verify an original document by digesting it locally.
pub async fn handle_verify_file(
    registry: Arc<dyn RegistryClient>,
    retriever: Arc<dyn ContentRetriever>,
    path: &Path,
) -> Result<CommandReport, Box<dyn Error>> {
    let content = std::fs::read(path)?;
    let coordinator = VerificationCoordinator::new(registry, retriever);

    Ok(match coordinator.verify_document(&content).await {
        Ok(outcome) => CommandReport {
            severity: outcome.severity(),
            output: serde_json::to_value(VerificationReport::from_outcome(&outcome))?,
        },
        Err(e) => CommandReport::error(e.severity(), &e),
    })
}

pub async fn handle_list(
    registry: Arc<dyn RegistryClient>,
    query: Option<&str>,
) -> Result<CommandReport, Box<dyn Error>> {
    Ok(match CatalogUseCase::new(registry).execute(query).await {
        Ok(records) => {
            let certificates: Vec<Value> = records
                .iter()
                .map(|r| -> Result<Value, serde_json::Error> {
                    let mut entry = serde_json::to_value(r)?;
                    entry["issuedAt"] = json!(r.issued_at());
                    Ok(entry)
                })
                .collect::<Result<_, _>>()?;
            CommandReport::informative(json!(certificates))
        }
        Err(e) => CommandReport::error(Severity::Attention, &e),
    })
}

/// Fetch a snapshot, report its digest and optionally save it locally.
///
/// A failed save is reported in the output but does not fail the command.
pub async fn handle_fetch(
    retriever: Arc<dyn ContentRetriever>,
    content_id: &str,
    output: Option<&Path>,
) -> Result<CommandReport, Box<dyn Error>> {
    let mut slot = ContentSlot::new(retriever);
    let fetched = match slot.load(content_id).await {
        Ok(fetched) => fetched,
        Err(e) => {
            let severity = match e {
                RetrievalError::InvalidIdentifier | RetrievalError::NotFound(_) => {
                    Severity::Informative
                }
                _ => Severity::Attention,
            };
            return Ok(CommandReport::error(severity, &e));
        }
    };

    let saved = match output {
        Some(path) => match fetched.save_to(path) {
            Ok(()) => Some(true),
            Err(e) => {
                warn!("Could not save {} to {}: {}", fetched.content_id, path.display(), e);
                Some(false)
            }
        },
        None => None,
    };

    Ok(CommandReport::informative(json!({
        "contentId": fetched.content_id,
        "mediaType": fetched.media_type,
        "size": fetched.len(),
        "hash": fetched.digest(),
        "saved": saved,
    })))
}

pub fn handle_hash(path: &Path) -> Result<CommandReport, Box<dyn Error>> {
    let content = std::fs::read(path)?;
    Ok(CommandReport::informative(json!({
        "file": path.display().to_string(),
        "size": content.len(),
        "hash": digest(&content),
    })))
}
