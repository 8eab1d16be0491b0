//! Abstract blob backend trait.
//!
//! Every blob store must implement [`BlobBackend`].  The trait exposes the
//! primitive remote calls only; naming, validation and metadata conventions
//! live in [`super::repository::BlobRepository`].  Each method maps to a
//! single round trip against the store.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Failures reported by blob operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// A container or blob name (or the payload) was missing.
    #[error("{0}")]
    InvalidArgument(String),

    /// The named container does not exist.
    #[error("{0} was not found")]
    NotFound(String),

    /// The store could not be reached or answered with an unexpected status.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// A blob as returned by [`BlobBackend::get_blob`].
#[derive(Debug, Clone, Default)]
pub struct StoredBlob {
    /// Raw bytes of the blob.
    pub data: Bytes,
    /// Content type recorded with the blob, if any.
    pub content_type: Option<String>,
    /// User metadata, keys lowercased.
    pub metadata: HashMap<String, String>,
}

/// A blob to be written by [`BlobBackend::put_blob`].
#[derive(Debug, Clone)]
pub struct BlobUpload {
    pub data: Bytes,
    pub content_type: String,
    pub metadata: Vec<(String, String)>,
}

/// Async blob storage contract.
pub trait BlobBackend: Send + Sync + 'static {
    /// Check whether `name` exists in `container`.  A missing container
    /// answers `false`.
    fn blob_exists(
        &self,
        container: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, BlobError>> + Send + '_>>;

    /// Read a blob with its content type and metadata.  `None` when the
    /// container or the blob is missing.
    fn get_blob(
        &self,
        container: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<StoredBlob>, BlobError>> + Send + '_>>;

    /// List blob names in lexical order, optionally restricted to `prefix`.
    /// A missing container lists as empty.
    fn list_blobs(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BlobError>> + Send + '_>>;

    /// Write (or overwrite) a blob, returning its URL.  Fails with
    /// [`BlobError::NotFound`] when the container does not exist.
    fn put_blob(
        &self,
        container: &str,
        name: &str,
        upload: BlobUpload,
    ) -> Pin<Box<dyn Future<Output = Result<String, BlobError>> + Send + '_>>;
}
