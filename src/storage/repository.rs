//! Blob repository: container/blob naming and metadata conventions on top
//! of a [`BlobBackend`].
//!
//! - Container and blob names are trimmed and compared case-sensitively.
//! - Uploaded blobs carry the caller's original filename in the `filename`
//!   metadata key (percent-encoded so any UTF-8 name survives the header).
//! - When no blob name is given, one is generated as an 11 character
//!   alphanumeric code plus the original file's extension.

use bytes::Bytes;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::backend::{BlobBackend, BlobError, BlobUpload};
use crate::random::{random_code, CharGroups};

/// Metadata key holding the original filename.
pub const FILENAME_METADATA_KEY: &str = "filename";

/// Length of generated blob names, excluding the extension.
pub const GENERATED_NAME_LEN: usize = 11;

/// Resolves a file extension (with leading dot, possibly empty) to a MIME
/// type.
pub type MimeResolver = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Raw file contents read back from the store.
///
/// `valid()` is false whenever the data is empty, which includes every
/// "not found" outcome.  Check it before using the other fields.
#[derive(Debug, Clone, Default)]
pub struct RawFile {
    pub data: Bytes,
    pub content_type: String,
    pub filename: String,
}

impl RawFile {
    pub fn valid(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Blob operations with the repository's naming rules applied.
pub struct BlobRepository {
    backend: Arc<dyn BlobBackend>,
    mime: MimeResolver,
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// The extension of `filename` including its leading dot, or `""`.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename.trim())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

impl BlobRepository {
    /// A repository whose MIME resolver always answers `text/plain`.
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self {
            backend,
            mime: Arc::new(|_| "text/plain".to_string()),
        }
    }

    /// Replace the MIME resolver.
    pub fn with_mime_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.mime = Arc::new(resolver);
        self
    }

    /// Whether `name` exists in `container`.  Both must be non-blank.
    pub async fn exists(&self, container: &str, name: &str) -> Result<bool, BlobError> {
        let (Some(container), Some(name)) = (non_blank(container), non_blank(name)) else {
            return Err(BlobError::InvalidArgument(
                "Container and blob name are required".to_string(),
            ));
        };
        self.backend.blob_exists(container, name).await
    }

    /// Read a blob as UTF-8 text.  Empty when the container or blob is
    /// missing or either name is blank.
    pub async fn read_text(&self, container: &str, name: &str) -> Result<String, BlobError> {
        let (Some(container), Some(name)) = (non_blank(container), non_blank(name)) else {
            return Ok(String::new());
        };
        Ok(self
            .backend
            .get_blob(container, name)
            .await?
            .map(|blob| String::from_utf8_lossy(&blob.data).into_owned())
            .unwrap_or_default())
    }

    /// Read a blob with its content type and original filename.
    ///
    /// The filename comes from the `filename` metadata key and falls back to
    /// the blob's own name.  A missing blob yields an invalid [`RawFile`].
    pub async fn read_raw(&self, container: &str, name: &str) -> Result<RawFile, BlobError> {
        let (Some(container), Some(name)) = (non_blank(container), non_blank(name)) else {
            return Ok(RawFile::default());
        };

        let Some(blob) = self.backend.get_blob(container, name).await? else {
            debug!("Blob {}/{} not found", container, name);
            return Ok(RawFile::default());
        };

        let filename = blob
            .metadata
            .get(FILENAME_METADATA_KEY)
            .map(|v| percent_decode_str(v).decode_utf8_lossy().into_owned())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| name.to_string());

        Ok(RawFile {
            data: blob.data,
            content_type: blob
                .content_type
                .unwrap_or_else(|| (self.mime)(extension_of(&filename).as_str())),
            filename,
        })
    }

    /// List blob names in `container`, optionally filtered by `prefix`.
    pub async fn list(&self, container: &str, prefix: Option<&str>) -> Result<Vec<String>, BlobError> {
        let Some(container) = non_blank(container) else {
            return Ok(Vec::new());
        };
        let prefix = prefix.and_then(non_blank);
        self.backend.list_blobs(container, prefix).await
    }

    /// Write `data` to `container` and return the blob URL.
    ///
    /// Fails with [`BlobError::InvalidArgument`] for empty data or a blank
    /// container, and [`BlobError::NotFound`] when the container is missing.
    pub async fn write(
        &self,
        data: Bytes,
        container: &str,
        original_filename: &str,
        explicit_name: Option<&str>,
    ) -> Result<String, BlobError> {
        if data.is_empty() {
            return Err(BlobError::InvalidArgument(
                "File content is empty".to_string(),
            ));
        }
        let Some(container) = non_blank(container) else {
            return Err(BlobError::InvalidArgument(
                "Container name is required".to_string(),
            ));
        };

        let original_filename = original_filename.trim();
        let ext = extension_of(original_filename);
        let content_type = (self.mime)(ext.as_str());

        let blob_name = match explicit_name.and_then(non_blank) {
            Some(name) => name.to_string(),
            None => format!(
                "{}{}",
                random_code(GENERATED_NAME_LEN, CharGroups::ALPHANUMERIC),
                ext
            ),
        };

        let stored_filename = if original_filename.is_empty() {
            blob_name.as_str()
        } else {
            original_filename
        };

        let upload = BlobUpload {
            data,
            content_type,
            metadata: vec![(
                FILENAME_METADATA_KEY.to_string(),
                utf8_percent_encode(stored_filename, NON_ALPHANUMERIC).to_string(),
            )],
        };

        self.backend.put_blob(container, &blob_name, upload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBlobBackend;
    use crate::storage::mime::mime_for_extension;

    async fn repo() -> (Arc<MemoryBlobBackend>, BlobRepository) {
        let backend = Arc::new(MemoryBlobBackend::new());
        backend.create_container("files").await;
        let repo = BlobRepository::new(backend.clone());
        (backend, repo)
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.JPG"), ".JPG");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(" notes.txt "), ".txt");
    }

    #[tokio::test]
    async fn test_write_generates_name_and_metadata() {
        let (backend, repo) = repo().await;
        let url = repo
            .write(Bytes::from_static(b"hello"), "files", "Résumé final.pdf", None)
            .await
            .unwrap();

        let name = url.rsplit('/').next().unwrap().to_string();
        assert_eq!(name.len(), GENERATED_NAME_LEN + ".pdf".len());
        assert!(name.ends_with(".pdf"));
        assert!(name[..GENERATED_NAME_LEN]
            .chars()
            .all(|c| c.is_ascii_alphanumeric()));

        let stored = backend.get_blob("files", &name).await.unwrap().unwrap();
        // Default resolver.
        assert_eq!(stored.content_type.as_deref(), Some("text/plain"));
        assert!(stored.metadata[FILENAME_METADATA_KEY].is_ascii());

        let raw = repo.read_raw("files", &name).await.unwrap();
        assert!(raw.valid());
        assert_eq!(raw.filename, "Résumé final.pdf");
        assert_eq!(&raw.data[..], b"hello");
    }

    #[tokio::test]
    async fn test_write_with_explicit_name_and_resolver() {
        let (backend, repo) = repo().await;
        let repo = repo.with_mime_resolver(|ext| mime_for_extension(ext).to_string());

        let url = repo
            .write(Bytes::from_static(b"\x89PNG"), " files ", "logo.png", Some(" logo-v2.png "))
            .await
            .unwrap();
        assert!(url.ends_with("/files/logo-v2.png"));

        let stored = backend.get_blob("files", "logo-v2.png").await.unwrap().unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_write_rejects_empty_data_and_blank_container() {
        let (_, repo) = repo().await;
        let err = repo
            .write(Bytes::new(), "files", "x.txt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::InvalidArgument(_)));

        let err = repo
            .write(Bytes::from_static(b"x"), "  ", "x.txt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_write_missing_container() {
        let (_, repo) = repo().await;
        let err = repo
            .write(Bytes::from_static(b"x"), "nope", "x.txt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_exists_requires_names() {
        let (_, repo) = repo().await;
        repo.write(Bytes::from_static(b"x"), "files", "a.txt", Some("a.txt"))
            .await
            .unwrap();

        assert!(repo.exists("files", "a.txt").await.unwrap());
        assert!(!repo.exists("files", "A.TXT").await.unwrap());
        assert!(!repo.exists("Files", "a.txt").await.unwrap());
        assert!(matches!(
            repo.exists("", "a.txt").await.unwrap_err(),
            BlobError::InvalidArgument(_)
        ));
        assert!(matches!(
            repo.exists("files", " ").await.unwrap_err(),
            BlobError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn test_read_text_and_missing() {
        let (_, repo) = repo().await;
        repo.write(Bytes::from_static(b"line one"), "files", "a.txt", Some("a.txt"))
            .await
            .unwrap();

        assert_eq!(repo.read_text("files", "a.txt").await.unwrap(), "line one");
        assert_eq!(repo.read_text("files", "b.txt").await.unwrap(), "");
        assert_eq!(repo.read_text("nope", "a.txt").await.unwrap(), "");
        assert_eq!(repo.read_text("", "a.txt").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_read_raw_missing_is_invalid() {
        let (_, repo) = repo().await;
        assert!(!repo.read_raw("files", "ghost.bin").await.unwrap().valid());
        assert!(!repo.read_raw("nope", "ghost.bin").await.unwrap().valid());
        assert!(!repo.read_raw("files", "").await.unwrap().valid());
    }

    #[tokio::test]
    async fn test_read_raw_falls_back_to_blob_name() {
        let (backend, repo) = repo().await;
        backend
            .put_blob(
                "files",
                "raw.bin",
                BlobUpload {
                    data: Bytes::from_static(b"abc"),
                    content_type: "application/octet-stream".to_string(),
                    metadata: Vec::new(),
                },
            )
            .await
            .unwrap();

        let raw = repo.read_raw("files", "raw.bin").await.unwrap();
        assert_eq!(raw.filename, "raw.bin");
        assert_eq!(raw.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_list() {
        let (_, repo) = repo().await;
        for name in ["b.txt", "a.txt", "logs/1.log"] {
            repo.write(Bytes::from_static(b"x"), "files", name, Some(name))
                .await
                .unwrap();
        }
        assert_eq!(
            repo.list("files", None).await.unwrap(),
            vec!["a.txt", "b.txt", "logs/1.log"]
        );
        assert_eq!(
            repo.list("files", Some(" logs/ ")).await.unwrap(),
            vec!["logs/1.log"]
        );
        assert_eq!(
            repo.list("files", Some("")).await.unwrap().len(),
            3
        );
        assert!(repo.list("nope", None).await.unwrap().is_empty());
        assert!(repo.list(" ", None).await.unwrap().is_empty());
    }
}
