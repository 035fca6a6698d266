use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use disputary_core::domain::merchant::{Business, BusinessId, Merchant, MerchantId};

use super::{parse_timestamp, parse_u32, MerchantDirectory, RepositoryError};
use crate::DbPool;

pub struct SqlMerchantDirectory {
    pool: DbPool,
}

impl SqlMerchantDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MerchantDirectory for SqlMerchantDirectory {
    async fn find_by_registration_ref(
        &self,
        registration_ref: &str,
    ) -> Result<Option<Business>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, merchant_id, registration_ref, name, created_at
             FROM businesses
             WHERE registration_ref = ?",
        )
        .bind(registration_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(business_from_row).transpose()
    }

    async fn find_merchant(
        &self,
        id: &MerchantId,
    ) -> Result<Option<Merchant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, contact_email, dispute_count, created_at, updated_at
             FROM merchants
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(merchant_from_row).transpose()
    }

    async fn increment_dispute_count_within(
        &self,
        conn: &mut SqliteConnection,
        id: &MerchantId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE merchants SET dispute_count = dispute_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn business_from_row(row: SqliteRow) -> Result<Business, RepositoryError> {
    Ok(Business {
        id: BusinessId(row.try_get("id")?),
        merchant_id: MerchantId(row.try_get("merchant_id")?),
        registration_ref: row.try_get("registration_ref")?,
        name: row.try_get("name")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn merchant_from_row(row: SqliteRow) -> Result<Merchant, RepositoryError> {
    Ok(Merchant {
        id: MerchantId(row.try_get("id")?),
        name: row.try_get("name")?,
        contact_email: row.try_get("contact_email")?,
        dispute_count: parse_u32("dispute_count", row.try_get("dispute_count")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use disputary_core::domain::merchant::MerchantId;

    use super::SqlMerchantDirectory;
    use crate::migrations;
    use crate::repositories::MerchantDirectory;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn resolves_business_by_registration_ref() {
        let pool = setup_pool().await;
        seed_directory(&pool).await;

        let directory = SqlMerchantDirectory::new(pool.clone());

        let business = directory
            .find_by_registration_ref("REG-M1")
            .await
            .expect("lookup")
            .expect("business row");
        assert_eq!(business.merchant_id, MerchantId("MER-M1".to_string()));
        assert_eq!(business.name, "Trattoria Uno Online");

        let missing = directory.find_by_registration_ref("REG-NONE").await.expect("lookup");
        assert!(missing.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn dispute_counter_increments_in_place() {
        let pool = setup_pool().await;
        seed_directory(&pool).await;

        let directory = SqlMerchantDirectory::new(pool.clone());
        let merchant_id = MerchantId("MER-M1".to_string());

        let mut conn = pool.acquire().await.expect("acquire");
        let at = parse_ts("2026-03-02T10:00:00Z");
        directory
            .increment_dispute_count_within(&mut conn, &merchant_id, at)
            .await
            .expect("first increment");
        directory
            .increment_dispute_count_within(&mut conn, &merchant_id, at)
            .await
            .expect("second increment");
        drop(conn);

        let merchant = directory.find_merchant(&merchant_id).await.expect("find").expect("row");
        assert_eq!(merchant.dispute_count, 2);
        assert_eq!(merchant.updated_at, at);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn seed_directory(pool: &DbPool) {
        let timestamp = "2026-03-01T12:00:00Z";

        sqlx::query(
            "INSERT INTO merchants (id, name, contact_email, dispute_count, created_at, updated_at)
             VALUES ('MER-M1', 'Trattoria Uno', 'ops@trattoria.example', 0, ?, ?)",
        )
        .bind(timestamp)
        .bind(timestamp)
        .execute(pool)
        .await
        .expect("insert merchant");

        sqlx::query(
            "INSERT INTO businesses (id, merchant_id, registration_ref, name, created_at)
             VALUES ('BIZ-M1', 'MER-M1', 'REG-M1', 'Trattoria Uno Online', ?)",
        )
        .bind(timestamp)
        .execute(pool)
        .await
        .expect("insert business");
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
