//! Object storage for uploaded documents.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info_span};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Object key under `prefix`, unique per upload.
    #[must_use]
    pub fn object_key(&self, prefix: &str) -> String {
        let clean: String = self
            .filename
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let clean = if clean.is_empty() {
            "upload".to_string()
        } else {
            clean
        };
        format!("{}/{}-{clean}", prefix.trim_matches('/'), Uuid::new_v4())
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the object and return its public URL.
    async fn upload(&self, key: &str, upload: &Upload) -> Result<String>;
}

/// Uploads with a plain HTTP `PUT` to `<base_url>/<key>` (S3-style presigned
/// buckets, MinIO, or any object gateway that accepts PUT).
pub struct HttpBlobStore {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpBlobStore {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url, token: Option<SecretString>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("failed to build blob store client")?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{key}")).context("invalid object url")
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, key: &str, upload: &Upload) -> Result<String> {
        let url = self.object_url(key)?;
        let mut request = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, upload.content_type.as_str())
            .body(upload.bytes.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let span = info_span!("blob.upload", http.url = %url, size = upload.bytes.len());
        let response = request
            .send()
            .instrument(span)
            .await
            .context("blob upload request failed")?
            .error_for_status()
            .context("blob upload rejected")?;
        debug!(status = %response.status(), "blob uploaded");

        Ok(url.to_string())
    }
}

impl std::fmt::Debug for HttpBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBlobStore")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

/// Keeps objects in memory; URLs use the `memory://` scheme.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Upload>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, upload: &Upload) -> Result<String> {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), upload.clone());
        Ok(format!("memory://{key}"))
    }
}
