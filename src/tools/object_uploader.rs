use std::path::Path;

use reqwest::Client;
use tracing::{info, warn};

use crate::config::ObjectStorageConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::llm::media::detect_mime_type;
use crate::storage::file_name_of;

/// Pushes local portraits to a bucket and hands back their public URL.
#[derive(Debug, Clone)]
pub struct ObjectUploader {
    http: Client,
    config: ObjectStorageConfig,
}

impl ObjectUploader {
    pub fn new(http: Client, config: ObjectStorageConfig) -> Self {
        ObjectUploader { http, config }
    }

    pub fn object_key(&self, local_path: &Path) -> String {
        let prefix = self.config.key_prefix.trim_matches('/');
        let file_name = file_name_of(local_path);
        if prefix.is_empty() {
            file_name
        } else {
            format!("{prefix}/{file_name}")
        }
    }

    /// Templated from bucket and key; the store's own response is not consulted.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.{}/{}",
            self.config.bucket,
            self.config.public_host.trim_matches('/'),
            key
        )
    }

    pub async fn upload_file(&self, local_path: &Path) -> ForgeResult<String> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|err| ForgeError::file_system(local_path, err))?;
        let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| "image/png".to_string());
        let key = self.object_key(local_path);
        let url = format!("{}/{}/{}", self.config.endpoint, self.config.bucket, key);

        let mut request = self
            .http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes);
        if !self.config.token.trim().is_empty() {
            request = request.bearer_auth(&self.config.token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ForgeError::from_request("object storage upload", &err))?;
        if !response.status().is_success() {
            warn!("Object storage upload failed with status {}", response.status());
            return Err(ForgeError::Network(format!(
                "object storage upload failed with status {}",
                response.status()
            )));
        }

        let public_url = self.public_url(&key);
        info!("Uploaded portrait to object storage: {}", public_url);
        Ok(public_url)
    }
}
