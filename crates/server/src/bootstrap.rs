use std::sync::Arc;

use disputary_core::config::{AppConfig, ConfigError, LoadOptions};
use disputary_db::{connect_with_settings, migrations, DbPool};
use disputary_engine::{IngestionPipeline, JsonNormalizer, SystemClock, TracingAuditSink};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub pipeline: Arc<IngestionPipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let pipeline = Arc::new(IngestionPipeline::new(
        db_pool.clone(),
        Arc::new(JsonNormalizer),
        Arc::new(SystemClock),
        Arc::new(TracingAuditSink),
    ));

    Ok(Application { config, db_pool, pipeline })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use disputary_core::config::{ConfigOverrides, LoadOptions};
    use disputary_core::domain::dispute::DisputeStage;
    use disputary_core::domain::payload::InboundEnvelope;

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_on_an_undersized_webhook_secret() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                webhook_secret: Some("too-short".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("webhook.secret"));
    }

    #[tokio::test]
    async fn integration_smoke_covers_startup_and_the_ingestion_path() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN \
             ('merchants', 'businesses', 'staff', 'payloads', 'disputes', \
              'dispute_history', 'staff_assignment_state', 'notifications', \
              'dispute_logs', 'dispute_feedback')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected dispute-path tables to be available after bootstrap");
        assert_eq!(table_count, 10, "bootstrap should expose the full dispute-path schema");

        sqlx::query(
            "INSERT INTO merchants (id, name, contact_email, dispute_count, created_at, updated_at) \
             VALUES ('MER-BOOT', 'Boot Outfitters', 'ops@boot.example', 0, \
                     '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&app.db_pool)
        .await
        .expect("seed merchant");
        sqlx::query(
            "INSERT INTO businesses (id, merchant_id, registration_ref, name, created_at) \
             VALUES ('BIZ-BOOT', 'MER-BOOT', 'REG-BOOT', 'Boot Storefront', \
                     '2026-01-01T00:00:00Z')",
        )
        .execute(&app.db_pool)
        .await
        .expect("seed business");

        let body = serde_json::json!({
            "gateway": "stripe",
            "gateway_dispute_ref": "gw-boot-100",
            "payment_ref": "pay-boot-100",
            "amount": "42.00",
            "currency": "USD",
            "status": "NEEDS_RESPONSE",
            "event": "dispute.created",
        })
        .to_string();
        let envelope = InboundEnvelope {
            business_ref: "REG-BOOT".to_string(),
            headers: BTreeMap::new(),
            sender_ip: None,
            body,
        };

        let dispute = app
            .pipeline
            .ingest(envelope, "boot-smoke")
            .await
            .expect("the wired pipeline should ingest a valid webhook");
        assert_eq!(dispute.stage, DisputeStage::Pending);
        assert_eq!(dispute.merchant_id.0, "MER-BOOT");

        let (dispute_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM disputes")
            .fetch_one(&app.db_pool)
            .await
            .expect("dispute count");
        assert_eq!(dispute_count, 1);

        app.db_pool.close().await;
    }

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }
}
