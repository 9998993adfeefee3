//! `MediaStorage` backends: the local filesystem and Google Cloud Storage.

use crate::services::MediaStorage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const IMAGES_DIR: &str = "images";
const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1/b";
const GCS_PUBLIC_BASE: &str = "https://storage.googleapis.com";

/// Prefixes `suggested_name` with a fresh UUID so repeated names never collide.
fn unique_name(suggested_name: &str) -> String {
    let name = Path::new(suggested_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("media.bin");
    format!("{}_{}", Uuid::new_v4(), name)
}

fn content_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Writes blobs under `<media_dir>/images` and hands out URLs below `<public_base_url>/media`.
pub struct LocalStorage {
    images_dir: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(media_dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            images_dir: media_dir.into().join(IMAGES_DIR),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaStorage for LocalStorage {
    async fn store(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.images_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.images_dir.display()))?;
        let name = unique_name(suggested_name);
        let path = self.images_dir.join(&name);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!(
            "{}/media/{}/{}",
            self.public_base_url, IMAGES_DIR, name
        ))
    }
}

/// Uploads blobs to a publicly readable GCS bucket.
pub struct GcsStorage {
    client: Client,
    bucket: String,
    access_token: SecretString,
}

impl GcsStorage {
    pub fn new(bucket: String, access_token: SecretString) -> Self {
        Self {
            client: Client::new(),
            bucket,
            access_token,
        }
    }
}

#[async_trait]
impl MediaStorage for GcsStorage {
    async fn store(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String> {
        let object = format!("{}/{}", IMAGES_DIR, unique_name(suggested_name));
        let url = format!(
            "{}/{}/o?uploadType=media&name={}",
            GCS_UPLOAD_BASE, self.bucket, object
        );
        self.client
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, content_type_for(&object))
            .body(bytes)
            .send()
            .await
            .context("GCS upload request failed")?
            .error_for_status()
            .context("GCS upload rejected")?;
        Ok(format!("{}/{}/{}", GCS_PUBLIC_BASE, self.bucket, object))
    }
}
