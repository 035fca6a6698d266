//! Gateway webhook intake.
//!
//! Every webhook is answered with a generic `202 { received, correlation_id }`
//! no matter how processing went, so a sender probing the endpoint learns
//! nothing about which merchants exist or how events were resolved. The only
//! exceptions are a failed secret check (401) and a business reference that
//! is not even shaped like one (400); both are detectable by the sender
//! before any tenant data is touched.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use disputary_core::domain::payload::InboundEnvelope;
use disputary_engine::{IngestError, IngestionPipeline};

/// Header carrying the shared webhook secret, when one is configured.
pub const WEBHOOK_SECRET_HEADER: &str = "x-disputary-webhook-secret";

#[derive(Clone)]
pub struct WebhookState {
    pub pipeline: Arc<IngestionPipeline>,
    pub secret: Option<SecretString>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookRejection {
    pub error: String,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/api/v1/webhooks/{business_ref}", post(receive_webhook))
        .with_state(state)
}

pub async fn receive_webhook(
    State(state): State<WebhookState>,
    Path(business_ref): Path<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<WebhookAck>), (StatusCode, Json<WebhookRejection>)> {
    let correlation_id = format!("wh-{}", Uuid::new_v4().simple());

    if let Some(expected) = &state.secret {
        let presented = headers.get(WEBHOOK_SECRET_HEADER).and_then(|value| value.to_str().ok());
        if presented != Some(expected.expose_secret()) {
            warn!(
                event_name = "webhook.secret_rejected",
                correlation_id = %correlation_id,
                "webhook secret missing or mismatched"
            );
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(WebhookRejection { error: "invalid webhook secret".to_string() }),
            ));
        }
    }

    let envelope = InboundEnvelope {
        business_ref,
        headers: archivable_headers(&headers),
        sender_ip: Some(remote.ip().to_string()),
        body,
    };

    match state.pipeline.ingest(envelope, &correlation_id).await {
        Ok(dispute) => {
            info!(
                event_name = "webhook.acknowledged",
                correlation_id = %correlation_id,
                dispute_id = %dispute.id.0,
                "webhook acknowledged"
            );
            Ok((StatusCode::ACCEPTED, Json(WebhookAck { received: true, correlation_id })))
        }
        Err(IngestError::MalformedBusinessRef(reference)) => Err((
            StatusCode::BAD_REQUEST,
            Json(WebhookRejection {
                error: format!("malformed business reference `{reference}`"),
            }),
        )),
        Err(error) => {
            // The pipeline already logged and audited the failure; the sender
            // still gets the generic acknowledgement.
            info!(
                event_name = "webhook.acknowledged",
                correlation_id = %correlation_id,
                outcome = error.kind().as_str(),
                "webhook acknowledged"
            );
            Ok((StatusCode::ACCEPTED, Json(WebhookAck { received: true, correlation_id })))
        }
    }
}

/// Headers archived alongside the raw body. The shared secret never lands
/// in the payload archive.
fn archivable_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str() != WEBHOOK_SECRET_HEADER)
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|text| (name.as_str().to_string(), text.to_string()))
        })
        .collect()
}
