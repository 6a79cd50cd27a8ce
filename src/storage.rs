use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::character::CharacterRecord;
use crate::error::{ForgeError, ForgeResult};

/// Output directories: portraits, rendered sheets, JSON exports.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub images_dir: PathBuf,
    pub sheets_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl StorageLayout {
    pub fn under(root: &Path) -> Self {
        StorageLayout {
            images_dir: root.join("images"),
            sheets_dir: root.join("character_sheets"),
            data_dir: root.join("data"),
        }
    }

    pub async fn ensure_directories(&self) -> ForgeResult<()> {
        for dir in [&self.images_dir, &self.sheets_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|err| ForgeError::file_system(dir, err))?;
        }
        Ok(())
    }

    pub async fn export_record(&self, record: &CharacterRecord) -> ForgeResult<PathBuf> {
        let file_name = unique_file_name(record.display_name(), "", "json");
        let path = self.data_dir.join(file_name);
        let body = serde_json::to_vec_pretty(record)
            .map_err(|err| ForgeError::DataFormat(format!("failed to encode record: {err}")))?;
        write_file(&path, &body).await?;
        Ok(path)
    }
}

pub fn sanitize_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            sanitized.push('_');
        } else if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            sanitized.push(ch);
        }
    }
    let sanitized: String = sanitized.chars().take(64).collect();
    if sanitized.trim_matches('_').is_empty() {
        "character".to_string()
    } else {
        sanitized
    }
}

pub fn uniqueness_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// `<sanitized-name><infix>_<token>.<ext>`
pub fn unique_file_name(name: &str, infix: &str, extension: &str) -> String {
    format!(
        "{}{}_{}.{}",
        sanitize_name(name),
        infix,
        uniqueness_token(),
        extension.trim_start_matches('.')
    )
}

pub async fn write_file(path: &Path, bytes: &[u8]) -> ForgeResult<()> {
    fs::write(path, bytes)
        .await
        .map_err(|err| ForgeError::file_system(path, err))?;
    debug!("Wrote {} byte(s) to {}", bytes.len(), path.display());
    Ok(())
}

/// Resolves a bare file name inside `dir`, rejecting anything that could escape it.
pub fn resolve_served_file(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let valid = !file_name.is_empty()
        && !file_name.starts_with('.')
        && file_name
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if !valid {
        return None;
    }
    Some(dir.join(file_name))
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}
