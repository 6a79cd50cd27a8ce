use reqwest::Client;
use tracing::warn;

use crate::error::{ForgeError, ForgeResult};

const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

pub(crate) fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

/// Fetches an image by URL. One attempt; the client's timeout bounds it.
pub async fn download_media(client: &Client, url: &str) -> ForgeResult<Vec<u8>> {
    let parsed = url::Url::parse(url)
        .map_err(|err| ForgeError::DataFormat(format!("invalid image URL '{url}': {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ForgeError::DataFormat(format!(
            "unsupported image URL scheme '{}'",
            parsed.scheme()
        )));
    }

    let response = client.get(parsed).send().await.map_err(|err| {
        warn!(
            "Failed to fetch media {url}: {err} (timeout={}, connect={})",
            err.is_timeout(),
            err.is_connect()
        );
        ForgeError::from_request("image download", &err)
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(
            "Media download failed for {url} with status {}: {}",
            status,
            truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
        );
        return Err(ForgeError::Network(format!(
            "image download failed with status {status}"
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| ForgeError::from_request("image download", &err))?;
    Ok(bytes.to_vec())
}
