use disputary_core::domain::log::DisputeLog;

use super::{DisputeLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDisputeLogRepository {
    pool: DbPool,
}

impl SqlDisputeLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DisputeLogRepository for SqlDisputeLogRepository {
    async fn record(&self, log: &DisputeLog) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO dispute_logs (
                id,
                merchant_id,
                gateway,
                gateway_dispute_ref,
                payload_id,
                outcome,
                message,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.id.0)
        .bind(log.merchant_id.as_ref().map(|id| id.0.as_str()))
        .bind(log.gateway.as_deref())
        .bind(log.gateway_dispute_ref.as_deref())
        .bind(log.payload_id.as_ref().map(|id| id.0.as_str()))
        .bind(log.outcome.as_str())
        .bind(&log.message)
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
