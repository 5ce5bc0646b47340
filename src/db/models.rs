//! Database row types matching `migrations/0001_research_notes.sql`.

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::types::ResearchNote;

#[derive(Debug, sqlx::FromRow)]
pub struct NoteRow {
    pub anomaly_id: String,
    pub note: String,
    /// RFC 3339, UTC.
    pub updated_at: String,
}

impl TryFrom<NoteRow> for ResearchNote {
    type Error = AppError;

    fn try_from(row: NoteRow) -> Result<Self> {
        let updated_at = DateTime::parse_from_rfc3339(&row.updated_at)
            .map_err(|e| AppError::Database(sqlx::Error::Decode(Box::new(e))))?
            .with_timezone(&Utc);
        Ok(ResearchNote {
            anomaly_id: row.anomaly_id,
            note: row.note,
            updated_at,
        })
    }
}
