use crate::domain::{search, CertificateRecord};
use crate::infrastructure::registry::{RegistryClient, RegistryError};
use std::sync::Arc;
use tracing::info;

/// Lists registry certificates, optionally narrowed by a search query.
pub struct CatalogUseCase {
    registry: Arc<dyn RegistryClient>,
}

impl CatalogUseCase {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }

    pub async fn execute(&self, query: Option<&str>) -> Result<Vec<CertificateRecord>, RegistryError> {
        let records = self.registry.list().await?;
        info!("Registry returned {} certificates", records.len());

        match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => {
                let matching: Vec<CertificateRecord> =
                    search(&records, query).into_iter().cloned().collect();
                info!("{} certificates match {:?}", matching.len(), query);
                Ok(matching)
            }
            None => Ok(records),
        }
    }
}
