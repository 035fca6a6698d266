use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row};

use disputary_core::domain::payload::{Payload, PayloadId};

use super::{parse_timestamp, PayloadRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPayloadRepository {
    pool: DbPool,
}

impl SqlPayloadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PayloadRepository for SqlPayloadRepository {
    async fn insert(&self, payload: &Payload) -> Result<(), RepositoryError> {
        let headers_json = serde_json::to_string(&payload.headers)
            .map_err(|error| RepositoryError::Decode(format!("encode headers: {error}")))?;

        sqlx::query(
            "INSERT INTO payloads (
                id,
                business_ref,
                headers_json,
                sender_ip,
                body,
                received_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&payload.id.0)
        .bind(&payload.business_ref)
        .bind(headers_json)
        .bind(payload.sender_ip.as_deref())
        .bind(&payload.body)
        .bind(payload.received_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PayloadId) -> Result<Option<Payload>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                business_ref,
                headers_json,
                sender_ip,
                body,
                received_at
             FROM payloads
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(payload_from_row).transpose()
    }
}

fn payload_from_row(row: SqliteRow) -> Result<Payload, RepositoryError> {
    let headers_raw = row.try_get::<String, _>("headers_json")?;
    let headers: BTreeMap<String, String> = serde_json::from_str(&headers_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid headers_json: {error}")))?;

    Ok(Payload {
        id: PayloadId(row.try_get("id")?),
        business_ref: row.try_get("business_ref")?,
        headers,
        sender_ip: row.try_get("sender_ip")?,
        body: row.try_get("body")?,
        received_at: parse_timestamp("received_at", row.try_get("received_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};

    use disputary_core::domain::payload::{Payload, PayloadId};

    use super::SqlPayloadRepository;
    use crate::migrations;
    use crate::repositories::PayloadRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn payload_round_trips_with_headers_map() {
        let pool = setup_pool().await;

        let repo = SqlPayloadRepository::new(pool.clone());

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("x-gateway".to_string(), "acmepay".to_string());

        let payload = Payload {
            id: PayloadId("PAY-RT-1".to_string()),
            business_ref: "REG-001".to_string(),
            headers,
            sender_ip: Some("203.0.113.9".to_string()),
            body: r#"{"gateway":"acmepay"}"#.to_string(),
            received_at: parse_ts("2026-03-01T12:00:00Z"),
        };

        repo.insert(&payload).await.expect("insert payload");

        let found = repo.find_by_id(&payload.id).await.expect("find payload");
        assert_eq!(found, Some(payload));

        let missing = repo.find_by_id(&PayloadId("PAY-NONE".to_string())).await.expect("find");
        assert!(missing.is_none());

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
