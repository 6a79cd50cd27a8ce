use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::config::PortraitEmbed;
use crate::handlers::pages::{archive_page, archived_sheet_page};
use crate::render::{portrait_sources, render_html, PortraitAsset};
use crate::state::AppState;

const ARCHIVE_PAGE_LIMIT: i64 = 50;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
    archive: &'static str,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let archive = match &state.deps.database {
        None => "disabled",
        Some(database) => match database.health_check().await {
            Ok(()) => "ok",
            Err(err) => {
                error!("Archive health check failed: {err}");
                "error"
            }
        },
    };
    let (code, status) = if archive == "error" {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            sessions: state.session_count(),
            archive,
        }),
    )
}

pub async fn characters(State(state): State<AppState>) -> Response {
    let Some(database) = &state.deps.database else {
        return Html(archive_page(None)).into_response();
    };
    match database.recent_characters(ARCHIVE_PAGE_LIMIT).await {
        Ok(rows) => Html(archive_page(Some(&rows))).into_response(),
        Err(err) => {
            error!("Failed to list archived characters: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not read the character archive",
            )
                .into_response()
        }
    }
}

/// Re-renders an archived sheet; portraits are referenced by their served path.
pub async fn character_sheet(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let Some(database) = &state.deps.database else {
        return (StatusCode::NOT_FOUND, "The character archive is disabled").into_response();
    };
    let record = match database.get_character(id).await {
        Ok(Some(record)) => record,
        Ok(None) => return (StatusCode::NOT_FOUND, "No such character").into_response(),
        Err(err) => {
            error!("Failed to load archived character {id}: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not read the character archive",
            )
                .into_response();
        }
    };

    let portraits: Vec<PortraitAsset> = record
        .portrait_filenames
        .iter()
        .map(|path| PortraitAsset::local(PathBuf::from(path)))
        .collect();
    match portrait_sources(&portraits, PortraitEmbed::Path).await {
        Ok(sources) => {
            let sheet = render_html(&record, &sources);
            Html(archived_sheet_page(&record, &sheet)).into_response()
        }
        Err(err) => {
            error!("Failed to resolve portraits for character {id}: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Could not render the sheet").into_response()
        }
    }
}
