use std::sync::Arc;

use uuid::Uuid;

use disputary_core::config::{AppConfig, LoadOptions};
use disputary_core::domain::payload::{InboundEnvelope, Payload, PayloadId};
use disputary_db::connect_with_settings;
use disputary_db::repositories::{PayloadRepository, SqlPayloadRepository};
use disputary_engine::{IngestionPipeline, JsonNormalizer, SystemClock, TracingAuditSink};

use crate::commands::CommandResult;

/// Re-runs ingestion from an archived payload row. The replay goes through
/// the same pipeline as a live webhook, so an already-ingested dispute is
/// updated idempotently rather than duplicated, and the attempt is archived
/// and audited like any other delivery.
pub fn run(payload_id: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "replay",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "replay",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let payloads = SqlPayloadRepository::new(pool.clone());
        let stored = payloads
            .find_by_id(&PayloadId(payload_id.to_string()))
            .await
            .map_err(|error| ("payload_lookup", error.to_string(), 4u8))?;

        let Some(payload) = stored else {
            pool.close().await;
            return Err((
                "payload_not_found",
                format!("no archived payload found under `{payload_id}`"),
                5u8,
            ));
        };

        let pipeline = IngestionPipeline::new(
            pool.clone(),
            Arc::new(JsonNormalizer),
            Arc::new(SystemClock),
            Arc::new(TracingAuditSink),
        );

        let correlation_id = format!("replay-{}", Uuid::new_v4().simple());
        let outcome = pipeline.ingest(envelope_from(&payload), &correlation_id).await;
        pool.close().await;

        match outcome {
            Ok(dispute) => Ok(format!(
                "replayed payload {} as {}: dispute {} ({}) now in stage {}",
                payload.id, correlation_id, dispute.id.0, dispute.code, dispute.stage.as_str()
            )),
            Err(error) => Err((error.kind().as_str(), error.to_string(), 6u8)),
        }
    });

    match result {
        Ok(message) => CommandResult::success("replay", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("replay", error_class, message, exit_code)
        }
    }
}

fn envelope_from(payload: &Payload) -> InboundEnvelope {
    InboundEnvelope {
        business_ref: payload.business_ref.clone(),
        headers: payload.headers.clone(),
        sender_ip: payload.sender_ip.clone(),
        body: payload.body.clone(),
    }
}
