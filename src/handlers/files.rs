use std::io::ErrorKind;
use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::llm::media::detect_mime_type;
use crate::state::AppState;
use crate::storage::resolve_served_file;

fn content_type_for(file_name: &str, bytes: &[u8]) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf".to_string(),
        "html" => "text/html; charset=utf-8".to_string(),
        "json" => "application/json".to_string(),
        _ => detect_mime_type(bytes).unwrap_or_else(|| "application/octet-stream".to_string()),
    }
}

async fn serve_file(dir: &FsPath, file_name: &str, attachment: bool) -> Response {
    let Some(path) = resolve_served_file(dir, file_name) else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        }
        Err(err) => {
            warn!("Failed to read {}: {}", path.display(), err);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Could not read file").into_response();
        }
    };

    let content_type = content_type_for(file_name, &bytes);
    let mut response = ([(CONTENT_TYPE, content_type)], bytes).into_response();
    if attachment {
        let disposition = format!("attachment; filename=\"{file_name}\"");
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            response.headers_mut().insert(CONTENT_DISPOSITION, value);
        }
    }
    response
}

pub async fn download(State(state): State<AppState>, Path(file_name): Path<String>) -> Response {
    serve_file(&state.deps.storage.sheets_dir, &file_name, true).await
}

pub async fn image(State(state): State<AppState>, Path(file_name): Path<String>) -> Response {
    serve_file(&state.deps.storage.images_dir, &file_name, false).await
}
