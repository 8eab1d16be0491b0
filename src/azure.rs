//! Azure Storage account settings and request signing.
//!
//! Shared by the blob backend and the table log sink.  A storage connection
//! string is parsed into a [`StorageAccount`] holding the service endpoints
//! and one of two credentials:
//!
//! - `AccountKey=...` -> Shared Key / Shared Key Lite request signing
//! - `SharedAccessSignature=...` -> SAS token appended to every URL
//!
//! `UseDevelopmentStorage=true` maps to the local storage emulator with its
//! well-known account and key.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Blob service REST API version.
pub const BLOB_API_VERSION: &str = "2023-11-03";

/// Table service REST API version.
pub const TABLE_API_VERSION: &str = "2019-02-02";

const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Percent-encoding set for blob names: encode everything except
/// unreserved characters and '/'.
pub const AZURE_BLOB_ENCODE_SET: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// How requests to the account are authorized.
#[derive(Clone)]
pub enum AzureAuth {
    /// Shared Key authentication using the decoded account key.
    SharedKey { key_bytes: Vec<u8> },
    /// SAS token authentication (appended as query parameter).
    SasToken { token: String },
}

impl std::fmt::Debug for AzureAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AzureAuth::SharedKey { .. } => f.write_str("SharedKey(..)"),
            AzureAuth::SasToken { .. } => f.write_str("SasToken(..)"),
        }
    }
}

/// A parsed storage connection string.
#[derive(Debug, Clone)]
pub struct StorageAccount {
    pub account: String,
    /// Blob service endpoint without trailing slash.
    pub blob_endpoint: String,
    /// Table service endpoint without trailing slash.
    pub table_endpoint: String,
    pub auth: AzureAuth,
}

/// Inputs to the Shared Key string-to-sign.
#[derive(Debug, Default)]
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    pub content_length: usize,
    pub content_md5: &'a str,
    pub content_type: &'a str,
    /// Every `x-ms-*` header sent, including `x-ms-date` and `x-ms-version`.
    pub ms_headers: &'a [(String, String)],
    /// Un-encoded URL path of the resource, starting with '/'.
    pub resource_path: &'a str,
    pub query: &'a [(String, String)],
}

impl StorageAccount {
    /// Parse a `Key=Value;Key=Value` storage connection string.
    pub fn parse(conn_str: &str) -> anyhow::Result<Self> {
        let mut parts: HashMap<String, String> = HashMap::new();
        for segment in conn_str.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            // Values (account keys, SAS tokens) may themselves contain '='.
            let (k, v) = segment.split_once('=').ok_or_else(|| {
                anyhow::anyhow!("Malformed storage connection string segment '{}'", segment)
            })?;
            parts.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }

        if parts
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Self::development();
        }

        let account = parts
            .get("accountname")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Storage connection string has no AccountName"))?;
        let protocol = parts
            .get("defaultendpointsprotocol")
            .cloned()
            .unwrap_or_else(|| "https".to_string());
        let suffix = parts
            .get("endpointsuffix")
            .cloned()
            .unwrap_or_else(|| "core.windows.net".to_string());

        let blob_endpoint = parts
            .get("blobendpoint")
            .cloned()
            .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, account, suffix));
        let table_endpoint = parts
            .get("tableendpoint")
            .cloned()
            .unwrap_or_else(|| format!("{}://{}.table.{}", protocol, account, suffix));

        let auth = if let Some(key) = parts.get("accountkey") {
            let key_bytes = BASE64_STANDARD
                .decode(key)
                .map_err(|e| anyhow::anyhow!("Invalid AccountKey in connection string: {}", e))?;
            AzureAuth::SharedKey { key_bytes }
        } else if let Some(sas) = parts.get("sharedaccesssignature") {
            AzureAuth::SasToken {
                token: sas.trim_start_matches('?').to_string(),
            }
        } else {
            return Err(anyhow::anyhow!(
                "Storage connection string has neither AccountKey nor SharedAccessSignature"
            ));
        };

        Ok(Self {
            account,
            blob_endpoint: blob_endpoint.trim_end_matches('/').to_string(),
            table_endpoint: table_endpoint.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn development() -> anyhow::Result<Self> {
        let key_bytes = BASE64_STANDARD.decode(DEV_ACCOUNT_KEY)?;
        Ok(Self {
            account: DEV_ACCOUNT.to_string(),
            blob_endpoint: format!("http://127.0.0.1:10000/{}", DEV_ACCOUNT),
            table_endpoint: format!("http://127.0.0.1:10002/{}", DEV_ACCOUNT),
            auth: AzureAuth::SharedKey { key_bytes },
        })
    }

    /// True when requests must carry an `Authorization` header.
    pub fn signs_requests(&self) -> bool {
        matches!(self.auth, AzureAuth::SharedKey { .. })
    }

    /// Append SAS token to a URL if using SAS auth.
    pub fn maybe_append_sas(&self, url: &str) -> String {
        match &self.auth {
            AzureAuth::SasToken { token } => {
                if url.contains('?') {
                    format!("{}&{}", url, token)
                } else {
                    format!("{}?{}", url, token)
                }
            }
            AzureAuth::SharedKey { .. } => url.to_string(),
        }
    }

    /// Build the Shared Key string-to-sign.
    ///
    /// ```text
    /// VERB\nContent-Encoding\nContent-Language\nContent-Length\nContent-MD5\n
    /// Content-Type\nDate\nIf-Modified-Since\nIf-Match\nIf-None-Match\n
    /// If-Unmodified-Since\nRange\nCanonicalizedHeaders\nCanonicalizedResource
    /// ```
    pub fn string_to_sign(&self, req: &CanonicalRequest<'_>) -> String {
        // Content-Length is empty for zero-length bodies.
        let content_length = match req.content_length {
            0 => String::new(),
            len => len.to_string(),
        };

        let mut ms_headers: Vec<(String, String)> = req
            .ms_headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .filter(|(k, _)| k.starts_with("x-ms-"))
            .collect();
        ms_headers.sort_by(|a, b| a.0.cmp(&b.0));
        let canonicalized_headers = ms_headers
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        let mut canonicalized_resource = format!("/{}{}", self.account, req.resource_path);
        let mut query = req.query.to_vec();
        query.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in &query {
            canonicalized_resource.push_str(&format!("\n{}:{}", k.to_lowercase(), v));
        }

        format!(
            "{}\n\n\n{}\n{}\n{}\n\n\n\n\n\n\n{}\n{}",
            req.method,
            content_length,
            req.content_md5,
            req.content_type,
            canonicalized_headers,
            canonicalized_resource
        )
    }

    /// `Authorization` header value for a Shared Key signed request.
    pub fn shared_key(&self, req: &CanonicalRequest<'_>) -> anyhow::Result<String> {
        let signature = self.hmac(&self.string_to_sign(req))?;
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    /// `Authorization` header value for a Shared Key Lite signed Table
    /// service request: `{date}\n/{account}{path}`.
    pub fn shared_key_lite(&self, date: &str, resource_path: &str) -> anyhow::Result<String> {
        let string_to_sign = format!("{}\n/{}{}", date, self.account, resource_path);
        let signature = self.hmac(&string_to_sign)?;
        Ok(format!("SharedKeyLite {}:{}", self.account, signature))
    }

    fn hmac(&self, string_to_sign: &str) -> anyhow::Result<String> {
        let key_bytes = match &self.auth {
            AzureAuth::SharedKey { key_bytes } => key_bytes,
            AzureAuth::SasToken { .. } => {
                return Err(anyhow::anyhow!("Cannot sign with SAS token auth"));
            }
        };

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(key_bytes)
            .map_err(|e| anyhow::anyhow!("HMAC key error: {}", e))?;
        mac.update(string_to_sign.as_bytes());
        Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// URL path component of an endpoint, without trailing slash (`""` for a
/// bare host).
pub fn endpoint_path(endpoint: &str) -> String {
    match reqwest::Url::parse(endpoint) {
        Ok(url) => url.path().trim_end_matches('/').to_string(),
        Err(_) => String::new(),
    }
}

/// Get the current UTC date in RFC 1123 format for `x-ms-date`.
pub fn rfc1123_date() -> String {
    httpdate::fmt_http_date(std::time::SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "a2V5LWJ5dGVzLWZvci10ZXN0aW5n"; // "key-bytes-for-testing"

    #[test]
    fn test_parse_account_key() {
        let conn = format!(
            "DefaultEndpointsProtocol=https;AccountName=acme;AccountKey={};EndpointSuffix=core.windows.net",
            KEY
        );
        let account = StorageAccount::parse(&conn).unwrap();
        assert_eq!(account.account, "acme");
        assert_eq!(account.blob_endpoint, "https://acme.blob.core.windows.net");
        assert_eq!(account.table_endpoint, "https://acme.table.core.windows.net");
        assert!(account.signs_requests());
    }

    #[test]
    fn test_parse_explicit_endpoints() {
        let conn = format!(
            "AccountName=acme;AccountKey={};BlobEndpoint=http://127.0.0.1:9999/acme/;TableEndpoint=http://127.0.0.1:9998/acme",
            KEY
        );
        let account = StorageAccount::parse(&conn).unwrap();
        assert_eq!(account.blob_endpoint, "http://127.0.0.1:9999/acme");
        assert_eq!(account.table_endpoint, "http://127.0.0.1:9998/acme");
        assert_eq!(endpoint_path(&account.blob_endpoint), "/acme");
    }

    #[test]
    fn test_parse_sas() {
        let conn = "AccountName=acme;SharedAccessSignature=?sv=2022-11-02&sig=abc%3D";
        let account = StorageAccount::parse(conn).unwrap();
        assert!(!account.signs_requests());
        assert_eq!(
            account.maybe_append_sas("https://x/c/b"),
            "https://x/c/b?sv=2022-11-02&sig=abc%3D"
        );
        assert_eq!(
            account.maybe_append_sas("https://x/c?comp=list"),
            "https://x/c?comp=list&sv=2022-11-02&sig=abc%3D"
        );
        assert!(account.shared_key_lite("date", "/Logs").is_err());
    }

    #[test]
    fn test_parse_development_storage() {
        let account = StorageAccount::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(account.account, DEV_ACCOUNT);
        assert_eq!(account.blob_endpoint, "http://127.0.0.1:10000/devstoreaccount1");
        assert!(account.signs_requests());
    }

    #[test]
    fn test_parse_errors() {
        assert!(StorageAccount::parse("AccountKey=abc").is_err());
        assert!(StorageAccount::parse("AccountName=acme").is_err());
        assert!(StorageAccount::parse("AccountName=acme;AccountKey=***").is_err());
        assert!(StorageAccount::parse("garbage").is_err());
    }

    #[test]
    fn test_string_to_sign_layout() {
        let account =
            StorageAccount::parse(&format!("AccountName=acme;AccountKey={}", KEY)).unwrap();
        let headers = vec![
            ("x-ms-version".to_string(), BLOB_API_VERSION.to_string()),
            ("x-ms-date".to_string(), "Mon, 01 Jan 2024 00:00:00 GMT".to_string()),
            ("x-ms-blob-type".to_string(), "BlockBlob".to_string()),
        ];
        let query = vec![
            ("restype".to_string(), "container".to_string()),
            ("comp".to_string(), "list".to_string()),
        ];
        let sts = account.string_to_sign(&CanonicalRequest {
            method: "PUT",
            content_length: 5,
            content_md5: "XUFAKrxLKna5cZ2REBfFkg==",
            content_type: "text/plain",
            ms_headers: &headers,
            resource_path: "/files/abc.txt",
            query: &query,
        });
        assert_eq!(
            sts,
            "PUT\n\n\n5\nXUFAKrxLKna5cZ2REBfFkg==\ntext/plain\n\n\n\n\n\n\n\
             x-ms-blob-type:BlockBlob\n\
             x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
             x-ms-version:2023-11-03\n\
             /acme/files/abc.txt\ncomp:list\nrestype:container"
        );
    }

    #[test]
    fn test_shared_key_is_deterministic() {
        let account =
            StorageAccount::parse(&format!("AccountName=acme;AccountKey={}", KEY)).unwrap();
        let req = CanonicalRequest {
            method: "GET",
            resource_path: "/files/a",
            ..Default::default()
        };
        let a = account.shared_key(&req).unwrap();
        let b = account.shared_key(&req).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("SharedKey acme:"));

        let lite = account.shared_key_lite("Mon, 01 Jan 2024 00:00:00 GMT", "/Logs").unwrap();
        assert!(lite.starts_with("SharedKeyLite acme:"));
    }

    #[test]
    fn test_endpoint_path() {
        assert_eq!(endpoint_path("https://acme.blob.core.windows.net"), "");
        assert_eq!(endpoint_path("https://acme.blob.core.windows.net/"), "");
        assert_eq!(endpoint_path("not a url"), "");
    }

    #[test]
    fn test_rfc1123_date_format() {
        let date = rfc1123_date();
        assert!(date.ends_with(" GMT"));
        assert_eq!(date.len(), 29);
    }
}
