use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use crate::db::models::NoteRow;
use crate::error::Result;
use crate::types::ResearchNote;

/// Research notes keyed by anomaly id. Notes are created or replaced, never deleted.
#[derive(Clone)]
pub struct NoteStore {
    pool: sqlx::SqlitePool,
}

impl NoteStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, anomaly_id: &str, note: &str) -> Result<ResearchNote> {
        self.save_at(anomaly_id, note, Utc::now()).await
    }

    /// Upsert; an existing note is overwritten and its timestamp refreshed.
    pub async fn save_at(
        &self,
        anomaly_id: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<ResearchNote> {
        let updated_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        sqlx::query(
            r#"
            INSERT INTO research_notes (anomaly_id, note, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(anomaly_id) DO UPDATE SET
                note = excluded.note,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(anomaly_id)
        .bind(note)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;

        info!(anomaly_id, chars = note.chars().count(), "[NOTES] saved");
        ResearchNote::try_from(NoteRow {
            anomaly_id: anomaly_id.to_string(),
            note: note.to_string(),
            updated_at,
        })
    }

    pub async fn get(&self, anomaly_id: &str) -> Result<Option<ResearchNote>> {
        let row = sqlx::query_as::<_, NoteRow>(
            "SELECT anomaly_id, note, updated_at FROM research_notes WHERE anomaly_id = ?",
        )
        .bind(anomaly_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ResearchNote::try_from).transpose()
    }

    /// Every note, most recently updated first.
    pub async fn all(&self) -> Result<Vec<ResearchNote>> {
        let rows = sqlx::query_as::<_, NoteRow>(
            "SELECT anomaly_id, note, updated_at FROM research_notes ORDER BY updated_at DESC, anomaly_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ResearchNote::try_from).collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use sqlx::sqlite::SqlitePoolOptions;

    /// Migrated in-memory database. One connection so every query sees the same memory db.
    pub async fn memory_pool() -> sqlx::SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }
}
