//! Azure Blob Storage backend.
//!
//! Talks to the Blob REST API directly with `reqwest`.  Authentication is
//! either Shared Key (every request signed with the account key) or a SAS
//! token appended to the URL, as parsed from the connection string by
//! [`crate::azure::StorageAccount`].
//!
//! Operation mapping:
//!   `blob_exists()` -> Get Blob Properties (HEAD)
//!   `get_blob()`    -> Get Blob
//!   `list_blobs()`  -> List Blobs (paged with `NextMarker`)
//!   `put_blob()`    -> Put Blob (BlockBlob, with Content-MD5 and metadata)

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use md5::{Digest, Md5};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::backend::{BlobBackend, BlobError, BlobUpload, StoredBlob};
use crate::azure::{
    endpoint_path, rfc1123_date, CanonicalRequest, StorageAccount, AZURE_BLOB_ENCODE_SET,
    BLOB_API_VERSION,
};

/// Prefix of user metadata headers.
const META_PREFIX: &str = "x-ms-meta-";

/// Blob backend that forwards operations to an Azure storage account.
pub struct AzureBlobBackend {
    /// HTTP client for Azure Blob REST API calls.
    client: reqwest::Client,
    /// Parsed account: endpoints and credential.
    account: StorageAccount,
    /// URL path of the blob endpoint (non-empty for emulator-style endpoints).
    base_path: String,
}

/// `<EnumerationResults>` body of a List Blobs response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: BlobList,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobItem {
    name: String,
}

impl AzureBlobBackend {
    /// Create a backend from a storage connection string.
    pub fn from_connection_string(conn_str: &str) -> anyhow::Result<Self> {
        let account = StorageAccount::parse(conn_str)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        info!(
            "Azure blob backend initialized: account={} endpoint={}",
            account.account, account.blob_endpoint
        );

        Ok(Self {
            client,
            base_path: endpoint_path(&account.blob_endpoint),
            account,
        })
    }

    /// Compute the base64 MD5 digest used for the `Content-MD5` header.
    fn content_md5(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        BASE64_STANDARD.encode(hasher.finalize())
    }

    /// Build the full URL for a blob.
    fn blob_url(&self, container: &str, name: &str) -> String {
        let encoded_blob =
            percent_encoding::utf8_percent_encode(name, &AZURE_BLOB_ENCODE_SET).to_string();
        format!("{}/{}/{}", self.account.blob_endpoint, container, encoded_blob)
    }

    /// Canonical (un-encoded) resource path for a blob.
    fn blob_resource(&self, container: &str, name: &str) -> String {
        format!("{}/{}/{}", self.base_path, container, name)
    }

    /// Attach date, version and (for Shared Key) authorization headers.
    fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
        method: &str,
        resource_path: &str,
        query: &[(String, String)],
        body: Option<(&Bytes, &str, &str)>,
        extra_ms_headers: &[(String, String)],
    ) -> Result<reqwest::RequestBuilder, BlobError> {
        let date = rfc1123_date();
        let mut ms_headers = vec![
            ("x-ms-date".to_string(), date),
            ("x-ms-version".to_string(), BLOB_API_VERSION.to_string()),
        ];
        ms_headers.extend(extra_ms_headers.iter().cloned());

        let mut builder = builder;
        for (k, v) in &ms_headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        if self.account.signs_requests() {
            let (content_length, content_md5, content_type) = match body {
                Some((data, md5, ct)) => (data.len(), md5, ct),
                None => (0, "", ""),
            };
            let auth_header = self.account.shared_key(&CanonicalRequest {
                method,
                content_length,
                content_md5,
                content_type,
                ms_headers: &ms_headers,
                resource_path,
                query,
            })?;
            builder = builder.header("Authorization", auth_header);
        }

        Ok(builder)
    }

    /// Map an Azure HTTP error to a transport error with context.
    fn map_azure_error(context: &str, status: StatusCode, body: &str) -> BlobError {
        BlobError::Transport(anyhow::anyhow!(
            "Azure {}: HTTP {} - {}",
            context,
            status,
            body
        ))
    }

    fn send_error(context: &str, e: reqwest::Error) -> BlobError {
        BlobError::Transport(anyhow::anyhow!("Azure {} request failed: {}", context, e))
    }

    /// Parse one page of a List Blobs response.
    fn parse_list_page(body: &str) -> anyhow::Result<(Vec<String>, Option<String>)> {
        // The service prefixes its XML with a byte order mark.
        let body = body.trim_start_matches('\u{feff}');
        let results: EnumerationResults = quick_xml::de::from_str(body)
            .map_err(|e| anyhow::anyhow!("Invalid List Blobs response: {}", e))?;
        let names = results.blobs.items.into_iter().map(|b| b.name).collect();
        let marker = results.next_marker.filter(|m| !m.is_empty());
        Ok((names, marker))
    }

    async fn azure_exists(&self, container: &str, name: &str) -> Result<bool, BlobError> {
        let url = self.blob_url(container, name);
        let req = self.authorize(
            self.client.head(self.account.maybe_append_sas(&url)),
            "HEAD",
            &self.blob_resource(container, name),
            &[],
            None,
            &[],
        )?;

        let resp = req
            .send()
            .await
            .map_err(|e| Self::send_error("exists", e))?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Self::map_azure_error("exists", s, "")),
        }
    }

    async fn azure_download(
        &self,
        container: &str,
        name: &str,
    ) -> Result<Option<StoredBlob>, BlobError> {
        let url = self.blob_url(container, name);
        let req = self.authorize(
            self.client.get(self.account.maybe_append_sas(&url)),
            "GET",
            &self.blob_resource(container, name),
            &[],
            None,
            &[],
        )?;

        let resp = req
            .send()
            .await
            .map_err(|e| Self::send_error("download", e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_azure_error("download", status, &body));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let metadata: HashMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                let key = k.as_str().strip_prefix(META_PREFIX)?;
                Some((key.to_lowercase(), v.to_str().ok()?.to_string()))
            })
            .collect();

        let data = resp
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("Azure download body read failed: {}", e))?;

        Ok(Some(StoredBlob {
            data,
            content_type,
            metadata,
        }))
    }

    /// List blobs in a container with an optional prefix, following
    /// `NextMarker` until the listing is complete.
    async fn azure_list_blobs(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, BlobError> {
        let mut all_names: Vec<String> = Vec::new();
        let mut marker: Option<String> = None;
        let resource_path = format!("{}/{}", self.base_path, container);

        loop {
            let mut url = format!(
                "{}/{}?restype=container&comp=list",
                self.account.blob_endpoint, container
            );
            let mut query_params = vec![
                ("comp".to_string(), "list".to_string()),
                ("restype".to_string(), "container".to_string()),
            ];
            if let Some(p) = prefix {
                url.push_str(&format!(
                    "&prefix={}",
                    percent_encoding::utf8_percent_encode(p, &AZURE_BLOB_ENCODE_SET)
                ));
                query_params.push(("prefix".to_string(), p.to_string()));
            }
            if let Some(ref m) = marker {
                url.push_str(&format!(
                    "&marker={}",
                    percent_encoding::utf8_percent_encode(m, &AZURE_BLOB_ENCODE_SET)
                ));
                query_params.push(("marker".to_string(), m.clone()));
            }

            let req = self.authorize(
                self.client.get(self.account.maybe_append_sas(&url)),
                "GET",
                &resource_path,
                &query_params,
                None,
                &[],
            )?;

            let resp = req
                .send()
                .await
                .map_err(|e| Self::send_error("list_blobs", e))?;

            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                debug!("Azure list_blobs: container {} not found", container);
                return Ok(Vec::new());
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Self::map_azure_error("list_blobs", status, &body));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| anyhow::anyhow!("Azure list_blobs body read failed: {}", e))?;
            let (names, next_marker) = Self::parse_list_page(&body)?;
            all_names.extend(names);

            match next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(all_names)
    }

    async fn azure_upload(
        &self,
        container: &str,
        name: &str,
        upload: BlobUpload,
    ) -> Result<String, BlobError> {
        let url = self.blob_url(container, name);
        let md5 = Self::content_md5(&upload.data);

        let mut extra_headers = vec![("x-ms-blob-type".to_string(), "BlockBlob".to_string())];
        for (k, v) in &upload.metadata {
            extra_headers.push((format!("{}{}", META_PREFIX, k.to_lowercase()), v.clone()));
        }

        let req = self.authorize(
            self.client
                .put(self.account.maybe_append_sas(&url))
                .header("Content-Type", upload.content_type.as_str())
                .header("Content-MD5", md5.as_str()),
            "PUT",
            &self.blob_resource(container, name),
            &[],
            Some((&upload.data, md5.as_str(), upload.content_type.as_str())),
            &extra_headers,
        )?;

        let resp = req
            .body(upload.data.clone())
            .send()
            .await
            .map_err(|e| Self::send_error("upload", e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(format!("Container '{}'", container)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_azure_error("upload", status, &body));
        }

        Ok(url)
    }
}

impl BlobBackend for AzureBlobBackend {
    fn blob_exists(
        &self,
        container: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, BlobError>> + Send + '_>> {
        let container = container.to_string();
        let name = name.to_string();
        Box::pin(async move {
            debug!("Azure exists: container={} blob={}", container, name);
            self.azure_exists(&container, &name).await
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
            debug!("Azure get: container={} blob={}", container, name);
            self.azure_download(&container, &name).await
        })
    }

    fn list_blobs(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BlobError>> + Send + '_>> {
        let container = container.to_string();
        let prefix = prefix.map(str::to_string);
        Box::pin(async move {
            debug!("Azure list: container={} prefix={:?}", container, prefix);
            self.azure_list_blobs(&container, prefix.as_deref()).await
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
            debug!(
                "Azure put: container={} blob={} size={}",
                container,
                name,
                upload.data.len()
            );
            self.azure_upload(&container, &name, upload).await
        })
    }
}

// -- Tests -------------------------------------------------------------------
