use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CharacterRow {
    pub id: i64,
    pub name: String,
    pub race: String,
    pub class: String,
    pub record_json: String,
    pub document_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CharacterInsert {
    pub name: String,
    pub race: String,
    pub class: String,
    pub record_json: String,
    pub document_path: Option<String>,
    pub created_at: DateTime<Utc>,
}
