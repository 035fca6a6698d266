use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use sqlx::Executor;

/// Canonical demo seeds and verification contract for the two merchant setups.
const SEED_MERCHANTS: &[MerchantSeedContract] = &[
    MerchantSeedContract {
        merchant_id: "MER-DEMO-001",
        merchant_name: "Aurora Outfitters",
        business_id: "BIZ-DEMO-001",
        registration_ref: "REG-AURORA-001",
        active_analyst_ids: &["STF-DEMO-A1", "STF-DEMO-A2", "STF-DEMO-A3"],
        total_staff_count: 5,
        description: "Three-analyst roster plus a manager and a deactivated analyst",
    },
    MerchantSeedContract {
        merchant_id: "MER-DEMO-002",
        merchant_name: "Baltic Books",
        business_id: "BIZ-DEMO-002",
        registration_ref: "REG-BALTIC-001",
        active_analyst_ids: &[],
        total_staff_count: 0,
        description: "No staff at all, exercises unassigned ingestion",
    },
];

const SEED_MERCHANT_IDS: &[&str] = &["MER-DEMO-001", "MER-DEMO-002"];

const SEED_BUSINESS_IDS: &[&str] = &["BIZ-DEMO-001", "BIZ-DEMO-002"];

const SEED_STAFF_IDS: &[&str] =
    &["STF-DEMO-GONE", "STF-DEMO-A1", "STF-DEMO-A2", "STF-DEMO-A3", "STF-DEMO-MGR"];

/// Demo dataset backing the CLI `seed` command and the seed contract test.
///
/// Aurora Outfitters arrives with a three-analyst round-robin roster;
/// Baltic Books has no staff so webhooks for it land unassigned.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo seed data.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset into the database. Reloading is a no-op for
    /// rows that already exist.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let merchants_seeded = SEED_MERCHANTS
            .iter()
            .map(|merchant| MerchantSeedInfo {
                merchant_id: merchant.merchant_id,
                registration_ref: merchant.registration_ref,
                description: merchant.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { merchants_seeded })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for merchant in SEED_MERCHANTS {
            let merchant_exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM merchants WHERE id = ?1 AND name = ?2)",
            )
            .bind(merchant.merchant_id)
            .bind(merchant.merchant_name)
            .fetch_one(pool)
            .await?;
            checks.push((merchant.merchant_id, merchant_exists == 1));

            let business_resolves: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM businesses
                    WHERE id = ?1 AND merchant_id = ?2 AND registration_ref = ?3
                 )",
            )
            .bind(merchant.business_id)
            .bind(merchant.merchant_id)
            .bind(merchant.registration_ref)
            .fetch_one(pool)
            .await?;
            checks.push((merchant.business_id, business_resolves == 1));

            let roster: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM staff
                 WHERE merchant_id = ?1 AND is_active = 1 AND role = 'analyst'
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(merchant.merchant_id)
            .fetch_all(pool)
            .await?;
            let roster_matches = roster.len() == merchant.active_analyst_ids.len()
                && roster.iter().zip(merchant.active_analyst_ids).all(|(a, b)| a == b);
            checks.push((merchant.roster_label(), roster_matches));

            let staff_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM staff WHERE merchant_id = ?1")
                    .bind(merchant.merchant_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((merchant.staff_count_label(), staff_count == merchant.total_staff_count));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Clean up seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_merchants = sql_array_from_ids(SEED_MERCHANT_IDS);
        let quoted_businesses = sql_array_from_ids(SEED_BUSINESS_IDS);
        let quoted_staff = sql_array_from_ids(SEED_STAFF_IDS);

        sqlx::query(&format!(
            "DELETE FROM staff_assignment_state WHERE merchant_id IN {quoted_merchants}"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM staff WHERE id IN {quoted_staff}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM businesses WHERE id IN {quoted_businesses}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM merchants WHERE id IN {quoted_merchants}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct MerchantSeedContract {
    merchant_id: &'static str,
    merchant_name: &'static str,
    business_id: &'static str,
    registration_ref: &'static str,
    active_analyst_ids: &'static [&'static str],
    total_staff_count: i64,
    description: &'static str,
}

impl MerchantSeedContract {
    fn roster_label(&self) -> &'static str {
        match self.merchant_id {
            "MER-DEMO-001" => "aurora-analyst-roster",
            _ => "baltic-analyst-roster",
        }
    }

    fn staff_count_label(&self) -> &'static str {
        match self.merchant_id {
            "MER-DEMO-001" => "aurora-staff-count",
            _ => "baltic-staff-count",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub merchants_seeded: Vec<MerchantSeedInfo>,
}

#[derive(Debug)]
pub struct MerchantSeedInfo {
    pub merchant_id: &'static str,
    pub registration_ref: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
