//! Log-backed audit sink for production wiring.

use disputary_core::audit::{AuditEvent, AuditSink};
use tracing::info;

/// Emits every audit event as a structured log line. Durable outcome rows
/// live in `dispute_logs`; this stream exists so operators can follow the
/// same trail without a database session.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.recorded",
            correlation_id = %event.correlation_id,
            event_type = %event.event_type,
            category = ?event.category,
            dispute_id = event
                .dispute_id
                .as_ref()
                .map(|id| id.0.as_str())
                .unwrap_or("unknown"),
            merchant_id = event
                .merchant_id
                .as_ref()
                .map(|id| id.0.as_str())
                .unwrap_or("unknown"),
            actor = %event.actor,
            outcome = event.outcome.as_str(),
            "audit event recorded"
        );
    }
}
