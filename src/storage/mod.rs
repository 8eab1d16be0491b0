//! Blob storage.
//!
//! The [`backend::BlobBackend`] trait abstracts over where file bytes
//! physically live: an Azure storage account or process memory.
//! [`repository::BlobRepository`] layers naming and metadata rules on top.

pub mod azure;
pub mod backend;
pub mod memory;
pub mod mime;
pub mod repository;

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;
use backend::BlobBackend;

/// Build the blob backend described by `config`.
///
/// Returns `Ok(None)` when no file store is configured; requests that need
/// one then fail with a configuration error.
pub async fn build_backend(config: &StorageConfig) -> anyhow::Result<Option<Arc<dyn BlobBackend>>> {
    let conn = config.connection_string.trim();
    if conn.is_empty() {
        info!("No file store configured");
        return Ok(None);
    }

    if conn.eq_ignore_ascii_case("memory") {
        let backend = memory::MemoryBlobBackend::with_containers(&[config.default_container.as_str()]);
        info!(
            "Memory blob backend initialized with container '{}'",
            config.default_container
        );
        return Ok(Some(Arc::new(backend)));
    }

    let backend = azure::AzureBlobBackend::from_connection_string(conn)?;
    Ok(Some(Arc::new(backend)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_backend_variants() {
        let none = build_backend(&StorageConfig::default()).await.unwrap();
        assert!(none.is_none());

        let config = StorageConfig {
            connection_string: "memory".to_string(),
            ..Default::default()
        };
        let backend = build_backend(&config).await.unwrap().unwrap();
        assert!(backend.list_blobs("files", None).await.unwrap().is_empty());

        let config = StorageConfig {
            connection_string: "AccountName=acme".to_string(),
            ..Default::default()
        };
        assert!(build_backend(&config).await.is_err());
    }
}
