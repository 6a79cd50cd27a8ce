use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::character::CharacterRecord;
use crate::db::models::{CharacterInsert, CharacterRow};

/// Archive of finished character sheets.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS characters (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                name TEXT NOT NULL,\
                race TEXT NOT NULL DEFAULT '',\
                class TEXT NOT NULL DEFAULT '',\
                record_json TEXT NOT NULL,\
                document_path TEXT,\
                created_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_characters_created_at ON characters(created_at);")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_characters_name ON characters(name);")
            .execute(&pool)
            .await?;

        info!("Character archive ready at {}", database_url);
        Ok(Database { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert_character(&self, insert: &CharacterInsert) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO characters (name, race, class, record_json, document_path, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&insert.name)
        .bind(&insert.race)
        .bind(&insert.class)
        .bind(&insert.record_json)
        .bind(&insert.document_path)
        .bind(insert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn archive_record(&self, record: &CharacterRecord) -> Result<i64> {
        let insert = CharacterInsert {
            name: record.display_name().to_string(),
            race: record.race.clone(),
            class: record.class.clone(),
            record_json: serde_json::to_string(record)?,
            document_path: record.pdf_path.clone(),
            created_at: Utc::now(),
        };
        self.insert_character(&insert).await
    }

    pub async fn recent_characters(&self, limit: i64) -> Result<Vec<CharacterRow>> {
        let rows = sqlx::query_as::<_, CharacterRow>(
            "SELECT id, name, race, class, record_json, document_path, created_at \
             FROM characters ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_character(&self, id: i64) -> Result<Option<CharacterRecord>> {
        let row = sqlx::query_as::<_, CharacterRow>(
            "SELECT id, name, race, class, record_json, document_path, created_at \
             FROM characters WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.record_json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn archived_records_come_back_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("archive.db").display());
        let db = Database::init(&url).await.unwrap();
        let mut first = CharacterRecord {
            name: "Aelar".to_string(),
            class: "Ranger".to_string(),
            ..Default::default()
        };
        first.pdf_path = Some("character_sheets/Aelar_x.pdf".to_string());
        let second = CharacterRecord {
            name: "Brom".to_string(),
            ..Default::default()
        };

        let first_id = db.archive_record(&first).await.unwrap();
        let second_id = db.archive_record(&second).await.unwrap();
        assert!(second_id > first_id);

        let rows = db.recent_characters(10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Brom");
        assert_eq!(rows[1].class, "Ranger");
        assert_eq!(
            rows[1].document_path.as_deref(),
            Some("character_sheets/Aelar_x.pdf")
        );

        let restored = db.get_character(first_id).await.unwrap().unwrap();
        assert_eq!(restored, first);
        assert!(db.get_character(999).await.unwrap().is_none());
        db.health_check().await.unwrap();
    }
}
