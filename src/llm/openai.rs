use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{ForgeError, ForgeResult};
use crate::llm::media::{detect_mime_type, download_media, extension_for_mime, truncate_for_log};
use crate::llm::prompt::ChatTurn;
use crate::llm::{CompletionClient, PortraitClient};
use crate::storage::{unique_file_name, write_file};
use crate::utils::timing::log_llm_timing;

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let message_count = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| messages.len())
        .unwrap_or(0);
    format!("model={}, messages={}", model, message_count)
}

async fn post_json(
    client: &Client,
    url: &str,
    api_key: &str,
    payload: &Value,
    context: &str,
) -> ForgeResult<Value> {
    let mut request = client.post(url).json(payload);
    if !api_key.trim().is_empty() {
        request = request.bearer_auth(api_key);
    }

    let response = request.send().await.map_err(|err| {
        warn!(
            "{} request failed to send: {} (timeout={}, connect={})",
            context,
            err,
            err.is_timeout(),
            err.is_connect()
        );
        ForgeError::from_request(context, &err)
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (message, body_summary) = summarize_error_body(&body);
        warn!("{} API error: status={}, body={}", context, status, body_summary);
        let detail = message.unwrap_or(body_summary);
        return Err(ForgeError::Network(format!(
            "{context} failed with status {status}: {detail}"
        )));
    }

    response.json::<Value>().await.map_err(|err| {
        if err.is_timeout() {
            ForgeError::from_request(context, &err)
        } else {
            ForgeError::DataFormat(format!("{context} returned an unreadable body: {err}"))
        }
    })
}

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiCompletionClient {
    pub fn new(
        http: Client,
        base_url: &str,
        api_key: &str,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        OpenAiCompletionClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    fn build_payload(&self, turns: &[ChatTurn]) -> Value {
        json!({
            "model": self.model,
            "messages": turns,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

pub(crate) fn extract_completion_content(response: &Value) -> ForgeResult<String> {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    if content.is_empty() {
        let finish_reason = response
            .pointer("/choices/0/finish_reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        return Err(ForgeError::DataFormat(format!(
            "completion response had no content (finish_reason={finish_reason})"
        )));
    }
    Ok(content)
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, turns: &[ChatTurn]) -> ForgeResult<String> {
        let payload = self.build_payload(turns);
        debug!(target: "llm.openai", payload = %summarize_payload(&payload));
        let url = format!("{}/chat/completions", self.base_url);

        log_llm_timing("openai", &self.model, "complete_character", None, || async {
            let response = post_json(&self.http, &url, &self.api_key, &payload, "completion").await?;
            extract_completion_content(&response)
        })
        .await
    }
}

/// Image-generation client; saves each portrait under `images_dir`.
#[derive(Debug, Clone)]
pub struct OpenAiPortraitClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    size: String,
    images_dir: PathBuf,
}

pub(crate) enum GeneratedImage {
    Url(String),
    Inline(Vec<u8>),
}

pub(crate) fn extract_generated_image(response: &Value) -> ForgeResult<GeneratedImage> {
    let first = response
        .pointer("/data/0")
        .ok_or_else(|| ForgeError::DataFormat("image response contained no images".to_string()))?;
    if let Some(url) = first.get("url").and_then(|v| v.as_str()) {
        if !url.trim().is_empty() {
            return Ok(GeneratedImage::Url(url.trim().to_string()));
        }
    }
    if let Some(encoded) = first.get("b64_json").and_then(|v| v.as_str()) {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| ForgeError::DataFormat(format!("invalid base64 image: {err}")))?;
        return Ok(GeneratedImage::Inline(bytes));
    }
    Err(ForgeError::DataFormat(
        "image response had neither url nor b64_json".to_string(),
    ))
}

impl OpenAiPortraitClient {
    pub fn new(
        http: Client,
        base_url: &str,
        api_key: &str,
        model: &str,
        size: &str,
        images_dir: PathBuf,
    ) -> Self {
        OpenAiPortraitClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            size: size.to_string(),
            images_dir,
        }
    }

    async fn request_image(&self, prompt: &str) -> ForgeResult<Vec<u8>> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
            "size": self.size,
        });
        let url = format!("{}/images/generations", self.base_url);
        let metadata = json!({ "size": self.size });

        log_llm_timing("openai", &self.model, "generate_portrait", Some(metadata), || async {
            let response =
                post_json(&self.http, &url, &self.api_key, &payload, "image generation").await?;
            match extract_generated_image(&response)? {
                GeneratedImage::Url(image_url) => download_media(&self.http, &image_url).await,
                GeneratedImage::Inline(bytes) => Ok(bytes),
            }
        })
        .await
    }
}

#[async_trait]
impl PortraitClient for OpenAiPortraitClient {
    async fn generate_portrait(
        &self,
        prompt: &str,
        character_name: &str,
    ) -> ForgeResult<PathBuf> {
        let bytes = self.request_image(prompt).await?;
        let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| "image/png".to_string());
        if !mime_type.starts_with("image/") {
            return Err(ForgeError::DataFormat(format!(
                "image service returned {mime_type} instead of an image"
            )));
        }

        let file_name = unique_file_name(character_name, "_portrait", extension_for_mime(&mime_type));
        let path = self.images_dir.join(file_name);
        write_file(&path, &bytes).await?;
        info!("Saved portrait for {} to {}", character_name, path.display());
        Ok(path)
    }
}
