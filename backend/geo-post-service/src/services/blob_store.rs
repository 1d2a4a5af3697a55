//! Object storage for post attachments
//!
//! Objects are stored under the post id and made public-read in the same
//! request, so a URL is only handed out for objects anyone can fetch.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use std::fs;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::GcsConfig;

/// Characters that must be percent-encoded in the path component
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const ACL_HEADER: &str = "x-goog-acl";
const PUBLIC_READ: &str = "public-read";

/// Lifetime of the signed URLs this client mints for its own requests.
const SIGNED_URL_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("object storage credentials invalid: {0}")]
    Credentials(String),
    #[error("object storage request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("object storage returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("object storage backend failure: {0}")]
    Backend(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `name`, make it public-read and return its public URL.
    async fn put(&self, name: &str, data: Bytes, content_type: &str)
        -> Result<String, BlobStoreError>;
}

/// GCS client that uploads through V4 signed URLs using a service account key
pub struct GcsBlobStore {
    client_email: String,
    private_key: RsaPrivateKey,
    bucket: String,
    scheme: String,
    host: String,
    http_client: Client,
}

#[derive(serde::Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
}

impl GcsBlobStore {
    /// `host` is a bare host name, or `http://host:port` for a local emulator.
    pub fn new(service_account_json: &str, bucket: &str, host: &str) -> Result<Self, BlobStoreError> {
        let sa: ServiceAccount = serde_json::from_str(service_account_json)
            .map_err(|e| BlobStoreError::Credentials(format!("invalid service account JSON: {e}")))?;

        let private_key = RsaPrivateKey::from_pkcs8_pem(&sa.private_key).map_err(|e| {
            BlobStoreError::Credentials(format!("failed to parse service account private key: {e}"))
        })?;

        let http_client = Client::builder().build()?;
        let (scheme, host) = host.split_once("://").unwrap_or(("https", host));
        let host = host.trim_end_matches('/');

        info!(bucket = %bucket, host = %host, "GCS blob store initialized");

        Ok(Self {
            client_email: sa.client_email,
            private_key,
            bucket: bucket.to_string(),
            scheme: scheme.to_string(),
            host: host.to_string(),
            http_client,
        })
    }

    pub fn from_config(cfg: &GcsConfig) -> Result<Self, BlobStoreError> {
        // Inline JSON wins over a path
        let raw_json = if let Some(ref inline) = cfg.service_account_json {
            inline.clone()
        } else if let Some(ref path) = cfg.service_account_json_path {
            fs::read_to_string(path).map_err(|e| {
                BlobStoreError::Credentials(format!(
                    "failed to read service account JSON at {path}: {e}"
                ))
            })?
        } else {
            return Err(BlobStoreError::Credentials(
                "no service account JSON provided".into(),
            ));
        };

        Self::new(&raw_json, &cfg.bucket, &cfg.host)
    }

    /// Fail fast at start-up when the bucket is missing or not readable.
    pub async fn check_bucket(&self) -> Result<(), BlobStoreError> {
        let resource = format!("/{}", self.bucket);
        let url = self.sign_url(
            "GET",
            &resource,
            &[],
            &[("max-keys", "0".to_string())],
            Utc::now(),
        )?;

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BlobStoreError::Status { status, body });
        }

        debug!(bucket = %self.bucket, "GCS bucket reachable");
        Ok(())
    }

    /// Public URL of an object stored with a public-read ACL
    pub fn public_url(&self, name: &str) -> String {
        format!(
            "https://storage.googleapis.com/{}/{}",
            self.bucket,
            utf8_percent_encode(name, PATH_SET)
        )
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_resource(&self, name: &str) -> String {
        let encoded = utf8_percent_encode(name.trim_start_matches('/'), PATH_SET);
        format!("/{}/{}", self.bucket, encoded)
    }

    /// Build a V4 signed URL. `headers` must be lowercase and are added to
    /// the signed headers next to `host`; the request must send them verbatim.
    fn sign_url(
        &self,
        method: &str,
        canonical_uri: &str,
        headers: &[(&str, &str)],
        extra_query: &[(&str, String)],
        now: DateTime<Utc>,
    ) -> Result<String, BlobStoreError> {
        let datestamp = now.format("%Y%m%d").to_string();
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();

        let credential_scope = format!("{datestamp}/auto/storage/goog4_request");
        let credential = format!("{}/{}", self.client_email, credential_scope);

        let mut signed: Vec<(&str, &str)> = vec![("host", self.host.as_str())];
        signed.extend_from_slice(headers);
        signed.sort_by(|a, b| a.0.cmp(b.0));

        let canonical_headers: String = signed
            .iter()
            .map(|(name, value)| format!("{name}:{}\n", value.trim()))
            .collect();
        let signed_headers = signed
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");

        let mut query_items: Vec<(&str, String)> = vec![
            ("X-Goog-Algorithm", "GOOG4-RSA-SHA256".to_string()),
            ("X-Goog-Credential", credential),
            ("X-Goog-Date", timestamp.clone()),
            ("X-Goog-Expires", SIGNED_URL_TTL.as_secs().to_string()),
            ("X-Goog-SignedHeaders", signed_headers.clone()),
        ];
        query_items.extend(extra_query.iter().cloned());
        query_items.sort_by(|a, b| a.0.cmp(b.0));

        let canonical_query = query_items
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\nUNSIGNED-PAYLOAD"
        );
        let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));

        let string_to_sign =
            format!("GOOG4-RSA-SHA256\n{timestamp}\n{credential_scope}\n{canonical_hash}");

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key
            .try_sign(string_to_sign.as_bytes())
            .map_err(|e| BlobStoreError::Credentials(format!("failed to sign request: {e}")))?;
        let signature_hex = hex::encode(signature.to_bytes());

        Ok(format!(
            "{scheme}://{host}{canonical_uri}?{canonical_query}&X-Goog-Signature={signature_hex}",
            scheme = self.scheme,
            host = self.host
        ))
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(
        &self,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, BlobStoreError> {
        let size = data.len();
        let url = self.sign_url(
            "PUT",
            &self.object_resource(name),
            &[(ACL_HEADER, PUBLIC_READ)],
            &[],
            Utc::now(),
        )?;

        debug!(object = %name, size, "uploading to GCS");

        let response = self
            .http_client
            .put(&url)
            .header(ACL_HEADER, PUBLIC_READ)
            .header(CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BlobStoreError::Status { status, body });
        }

        let public_url = self.public_url(name);
        info!(object = %name, size, url = %public_url, "attachment stored in GCS");
        Ok(public_url)
    }
}
