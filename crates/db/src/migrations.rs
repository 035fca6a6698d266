use sqlx::migrate::{Migrate, MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MigrationStatus {
    pub applied: usize,
    pub total: usize,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.applied == self.total
    }
}

/// Read-only report of applied versus known migrations. Creates the
/// bookkeeping table if the database has never been migrated.
pub async fn status(pool: &DbPool) -> Result<MigrationStatus, MigrateError> {
    let mut conn = pool.acquire().await?;
    conn.ensure_migrations_table().await?;
    let applied = conn.list_applied_migrations().await?.len();
    let total =
        MIGRATOR.iter().filter(|migration| !migration.migration_type.is_down_migration()).count();
    Ok(MigrationStatus { applied, total })
}
