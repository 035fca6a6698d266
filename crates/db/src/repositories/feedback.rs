use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use disputary_core::domain::dispute::{DisputeFeedback, DisputeId};

use super::{parse_timestamp, DisputeFeedbackRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDisputeFeedbackRepository {
    pool: DbPool,
}

impl SqlDisputeFeedbackRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DisputeFeedbackRepository for SqlDisputeFeedbackRepository {
    async fn upsert_within(
        &self,
        conn: &mut SqliteConnection,
        feedback: &DisputeFeedback,
    ) -> Result<(), RepositoryError> {
        let evidence_files_json = serde_json::to_string(&feedback.evidence_files)
            .map_err(|error| RepositoryError::Decode(format!("encode evidence files: {error}")))?;

        sqlx::query(
            "INSERT INTO dispute_feedback (
                dispute_id,
                reason,
                comments,
                evidence_files_json,
                updated_at
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(dispute_id) DO UPDATE SET
                reason = excluded.reason,
                comments = excluded.comments,
                evidence_files_json = excluded.evidence_files_json,
                updated_at = excluded.updated_at",
        )
        .bind(&feedback.dispute_id.0)
        .bind(&feedback.reason)
        .bind(feedback.comments.as_deref())
        .bind(evidence_files_json)
        .bind(feedback.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn find_by_dispute(
        &self,
        dispute_id: &DisputeId,
    ) -> Result<Option<DisputeFeedback>, RepositoryError> {
        let row = sqlx::query(
            "SELECT dispute_id, reason, comments, evidence_files_json, updated_at
             FROM dispute_feedback
             WHERE dispute_id = ?",
        )
        .bind(&dispute_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(feedback_from_row).transpose()
    }
}

fn feedback_from_row(row: SqliteRow) -> Result<DisputeFeedback, RepositoryError> {
    let files_raw = row.try_get::<String, _>("evidence_files_json")?;
    let evidence_files: Vec<String> = serde_json::from_str(&files_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid evidence_files_json: {error}"))
    })?;

    Ok(DisputeFeedback {
        dispute_id: DisputeId(row.try_get("dispute_id")?),
        reason: row.try_get("reason")?,
        comments: row.try_get("comments")?,
        evidence_files,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
