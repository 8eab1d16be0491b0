//! In-memory blob backend.
//!
//! Containers and their blobs live in a `tokio::sync::RwLock<HashMap<...>>`.
//! Blob names within a container are kept in a `BTreeMap` so listings come
//! back in lexical order.  Containers must be created explicitly, matching
//! the remote store where writing to a missing container is an error.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

use super::backend::{BlobBackend, BlobError, BlobUpload, StoredBlob};

/// In-memory blob backend.
pub struct MemoryBlobBackend {
    /// container -> (blob name -> blob)
    containers: tokio::sync::RwLock<HashMap<String, BTreeMap<String, StoredBlob>>>,
    /// Prefix used to build blob URLs.
    base_url: String,
}

impl MemoryBlobBackend {
    pub fn new() -> Self {
        Self {
            containers: tokio::sync::RwLock::new(HashMap::new()),
            base_url: "memory://blobs".to_string(),
        }
    }

    /// A backend whose `containers` already exist.
    pub fn with_containers(containers: &[&str]) -> Self {
        let map = containers
            .iter()
            .map(|c| (c.to_string(), BTreeMap::new()))
            .collect();
        Self {
            containers: tokio::sync::RwLock::new(map),
            ..Self::new()
        }
    }

    /// Create `container` if it does not exist yet.
    pub async fn create_container(&self, container: &str) {
        self.containers
            .write()
            .await
            .entry(container.to_string())
            .or_default();
    }

    /// Number of blobs held in `container` (0 when missing).
    pub async fn blob_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .await
            .get(container)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

impl Default for MemoryBlobBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobBackend for MemoryBlobBackend {
    fn blob_exists(
        &self,
        container: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, BlobError>> + Send + '_>> {
        let container = container.to_string();
        let name = name.to_string();
        Box::pin(async move {
            let containers = self.containers.read().await;
            Ok(containers
                .get(&container)
                .is_some_and(|blobs| blobs.contains_key(&name)))
        })
    }

    fn get_blob(
        &self,
        container: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<StoredBlob>, BlobError>> + Send + '_>> {
        let container = container.to_string();
        let name = name.to_string();
        Box::pin(async move {
            let containers = self.containers.read().await;
            Ok(containers
                .get(&container)
                .and_then(|blobs| blobs.get(&name))
                .cloned())
        })
    }

    fn list_blobs(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BlobError>> + Send + '_>> {
        let container = container.to_string();
        let prefix = prefix.unwrap_or_default().to_string();
        Box::pin(async move {
            let containers = self.containers.read().await;
            let Some(blobs) = containers.get(&container) else {
                return Ok(Vec::new());
            };
            Ok(blobs
                .keys()
                .filter(|name| name.starts_with(&prefix))
                .cloned()
                .collect())
        })
    }

    fn put_blob(
        &self,
        container: &str,
        name: &str,
        upload: BlobUpload,
    ) -> Pin<Box<dyn Future<Output = Result<String, BlobError>> + Send + '_>> {
        let container = container.to_string();
        let name = name.to_string();
        Box::pin(async move {
            let mut containers = self.containers.write().await;
            let blobs = containers
                .get_mut(&container)
                .ok_or_else(|| BlobError::NotFound(format!("Container '{}'", container)))?;

            let metadata = upload
                .metadata
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect();
            blobs.insert(
                name.clone(),
                StoredBlob {
                    data: upload.data,
                    content_type: Some(upload.content_type),
                    metadata,
                },
            );

            Ok(format!("{}/{}/{}", self.base_url, container, name))
        })
    }
}
