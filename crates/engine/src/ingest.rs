use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{error, info, warn};

use disputary_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use disputary_core::domain::dispute::{Dispute, DisputeHistory, DisputeId, DisputeStage, HistoryId};
use disputary_core::domain::log::{DisputeLog, DisputeLogId, LogOutcome};
use disputary_core::domain::merchant::{Business, MerchantId};
use disputary_core::domain::notification::{Notification, NotificationId};
use disputary_core::domain::payload::{InboundEnvelope, Payload, PayloadId};
use disputary_core::domain::staff::StaffId;
use disputary_core::errors::ErrorKind;
use disputary_core::notify::{compose, AssignmentOutcome, DisputeEventKind, NotificationContext};
use disputary_core::{next_assignee, CanonicalEvent};
use disputary_db::repositories::{
    AssignmentCursorStore, DisputeHistoryRepository, DisputeLogRepository, DisputeRepository,
    MerchantDirectory, NotificationRepository, PayloadRepository, SqlAssignmentCursorStore,
    SqlDisputeHistoryRepository, SqlDisputeLogRepository, SqlDisputeRepository,
    SqlMerchantDirectory, SqlNotificationRepository, SqlPayloadRepository,
    SqlStaffRosterRepository, StaffRosterRepository,
};
use disputary_db::DbPool;

use crate::clock::Clock;
use crate::errors::IngestError;
use crate::normalizer::GatewayNormalizer;

/// One webhook delivery, end to end: archive the envelope, normalize it,
/// create or update the dispute, assign an analyst under the merchant's
/// cursor lock, fan out notifications, and record the outcome.
///
/// Every write except the payload archive and the outcome log happens in a
/// single transaction per unit; nothing partial is ever visible outside it.
pub struct IngestionPipeline {
    pool: DbPool,
    directory: Arc<dyn MerchantDirectory>,
    roster: Arc<dyn StaffRosterRepository>,
    disputes: Arc<dyn DisputeRepository>,
    history: Arc<dyn DisputeHistoryRepository>,
    payloads: Arc<dyn PayloadRepository>,
    cursor: Arc<dyn AssignmentCursorStore>,
    notifications: Arc<dyn NotificationRepository>,
    logs: Arc<dyn DisputeLogRepository>,
    normalizer: Arc<dyn GatewayNormalizer>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

/// Context accumulated while a unit runs, kept outside the transaction so
/// the outcome record can name whatever was known at the point of failure.
#[derive(Default)]
struct IngestTrace {
    merchant_id: Option<MerchantId>,
    gateway: Option<String>,
    gateway_dispute_ref: Option<String>,
    payload_id: Option<PayloadId>,
}

impl IngestionPipeline {
    pub fn new(
        pool: DbPool,
        normalizer: Arc<dyn GatewayNormalizer>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            directory: Arc::new(SqlMerchantDirectory::new(pool.clone())),
            roster: Arc::new(SqlStaffRosterRepository::new()),
            disputes: Arc::new(SqlDisputeRepository::new(pool.clone())),
            history: Arc::new(SqlDisputeHistoryRepository::new(pool.clone())),
            payloads: Arc::new(SqlPayloadRepository::new(pool.clone())),
            cursor: Arc::new(SqlAssignmentCursorStore::new(pool.clone())),
            notifications: Arc::new(SqlNotificationRepository::new(pool.clone())),
            logs: Arc::new(SqlDisputeLogRepository::new(pool.clone())),
            pool,
            normalizer,
            clock,
            audit,
        }
    }

    #[cfg(test)]
    fn with_dispute_repository(mut self, disputes: Arc<dyn DisputeRepository>) -> Self {
        self.disputes = disputes;
        self
    }

    /// Processes one webhook delivery. Always records exactly one outcome
    /// row and one audit event, success or failure.
    pub async fn ingest(
        &self,
        envelope: InboundEnvelope,
        correlation_id: &str,
    ) -> Result<Dispute, IngestError> {
        info!(
            event_name = "ingest.received",
            correlation_id = %correlation_id,
            business_ref = %envelope.business_ref,
            "webhook envelope accepted for processing"
        );

        let mut trace = IngestTrace::default();
        let result = self.process(&envelope, correlation_id, &mut trace).await;
        self.record_outcome(correlation_id, &trace, &result).await;
        result.map(|(dispute, _)| dispute)
    }

    async fn process(
        &self,
        envelope: &InboundEnvelope,
        correlation_id: &str,
        trace: &mut IngestTrace,
    ) -> Result<(Dispute, DisputeEventKind), IngestError> {
        // Nothing is persisted for business-ref failures: an envelope that
        // cannot be tied to a tenant has nowhere trustworthy to live.
        let business_ref = envelope.business_ref.trim();
        if !valid_business_ref(business_ref) {
            return Err(IngestError::MalformedBusinessRef(envelope.business_ref.clone()));
        }
        let business = self
            .directory
            .find_by_registration_ref(business_ref)
            .await?
            .ok_or_else(|| IngestError::UnknownBusiness(business_ref.to_string()))?;
        trace.merchant_id = Some(business.merchant_id.clone());

        // The raw envelope is archived on its own connection so it survives
        // a rollback of everything after it.
        let payload = Payload {
            id: PayloadId::generate(),
            business_ref: business_ref.to_string(),
            headers: envelope.headers.clone(),
            sender_ip: envelope.sender_ip.clone(),
            body: envelope.body.clone(),
            received_at: self.clock.now(),
        };
        self.payloads.insert(&payload).await?;
        trace.payload_id = Some(payload.id.clone());

        let gateway = self
            .normalizer
            .detect(&envelope.headers, &envelope.body)
            .ok_or(IngestError::UnrecognizedGateway)?;
        trace.gateway = Some(gateway.clone());

        let draft = self
            .normalizer
            .parse(&gateway, &envelope.body)
            .ok_or_else(|| IngestError::UnparsablePayload(gateway.clone()))?;
        let event = draft.validate(gateway)?;
        trace.gateway_dispute_ref = Some(event.gateway_dispute_ref.clone());

        match self.apply(&business, &event, &payload.id, correlation_id).await {
            Err(IngestError::CreateRace(reference)) => {
                warn!(
                    event_name = "ingest.idempotency.create_race",
                    correlation_id = %correlation_id,
                    merchant_id = %business.merchant_id,
                    gateway_dispute_ref = %reference,
                    "insert lost a concurrent create race, retrying once as update"
                );
                self.apply(&business, &event, &payload.id, correlation_id).await
            }
            outcome => outcome,
        }
    }

    /// Steps 5 through 7 of a unit: one transaction around idempotency
    /// resolution, the dispute write, history, assignment, and the
    /// notification batch.
    async fn apply(
        &self,
        business: &Business,
        event: &CanonicalEvent,
        payload_id: &PayloadId,
        correlation_id: &str,
    ) -> Result<(Dispute, DisputeEventKind), IngestError> {
        let now = self.clock.now();
        // IMMEDIATE takes the database write lock up front; the idempotency
        // read below must not run against a snapshot that a concurrent
        // commit can invalidate between the read and the first write.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let existing = self
            .disputes
            .find_by_idempotency_key_within(
                &mut *tx,
                &business.merchant_id,
                &event.gateway_dispute_ref,
            )
            .await?;

        let (mut dispute, event_kind) = match existing {
            Some(found) => {
                let updated = merge_event(found, event, now);
                self.disputes.update_within(&mut *tx, &updated).await?;
                (updated, DisputeEventKind::Updated)
            }
            None => {
                let dispute = dispute_from_event(business, event, now);
                if let Err(insert_error) = self.disputes.insert_within(&mut *tx, &dispute).await {
                    if insert_error.is_unique_violation() {
                        tx.rollback().await?;
                        return Err(IngestError::CreateRace(event.gateway_dispute_ref.clone()));
                    }
                    return Err(insert_error.into());
                }
                self.directory
                    .increment_dispute_count_within(&mut *tx, &business.merchant_id, now)
                    .await?;
                (dispute, DisputeEventKind::New)
            }
        };

        let entry = DisputeHistory {
            id: HistoryId::generate(),
            dispute_id: dispute.id.clone(),
            payload_id: payload_id.clone(),
            updated_status: event.status.clone(),
            updated_event: event.event.clone(),
            status_updated_at: event.status_updated_at.unwrap_or(now),
            created_at: now,
        };
        self.history.append_within(&mut *tx, &entry).await?;

        let assignment = self
            .assign_if_unassigned(&mut tx, business, &mut dispute, now, correlation_id)
            .await?;

        let context = NotificationContext {
            event_kind,
            dispute_code: dispute.code.clone(),
            merchant_id: business.merchant_id.clone(),
            assignment,
            gateway: dispute.gateway.clone(),
            amount: dispute.amount,
            currency: dispute.currency.clone(),
            status: dispute.status.clone(),
        };
        let notifications: Vec<Notification> = compose(&context)
            .into_iter()
            .map(|draft| Notification {
                id: NotificationId::generate(),
                dispute_id: dispute.id.clone(),
                recipient_kind: draft.recipient_kind,
                recipient_id: draft.recipient_id,
                kind: draft.kind,
                title: draft.title,
                message: draft.message,
                is_read: false,
                created_at: now,
            })
            .collect();
        self.notifications.insert_batch_within(&mut *tx, &notifications).await?;

        tx.commit().await?;

        info!(
            event_name = "ingest.applied",
            correlation_id = %correlation_id,
            dispute_id = %dispute.id,
            merchant_id = %business.merchant_id,
            event_kind = event_kind.as_str(),
            notifications = notifications.len(),
            "ingestion transaction committed"
        );

        Ok((dispute, event_kind))
    }

    /// Round-robin assignment, run only while the dispute has no analyst.
    /// A dispute that already has one is never reassigned by ingestion.
    async fn assign_if_unassigned(
        &self,
        conn: &mut SqliteConnection,
        business: &Business,
        dispute: &mut Dispute,
        now: DateTime<Utc>,
        correlation_id: &str,
    ) -> Result<AssignmentOutcome, IngestError> {
        if let Some(analyst_id) = dispute.analyst_id.clone() {
            return Ok(AssignmentOutcome::AlreadyAssigned(analyst_id));
        }

        let roster: Vec<StaffId> = self
            .roster
            .active_analysts_within(conn, &business.merchant_id)
            .await?
            .into_iter()
            .map(|staff| staff.id)
            .collect();
        if roster.is_empty() {
            return Ok(AssignmentOutcome::Unassigned);
        }

        // The claim write-locks the merchant's cursor row for the rest of
        // the enclosing transaction; concurrent units for the same merchant
        // serialize here and observe each other's committed cursor.
        let state =
            self.cursor.lock_and_read_within(conn, &business.merchant_id, now).await?;
        let Some(assignment) = next_assignee(&roster, state.last_staff_assigned.as_ref()) else {
            return Ok(AssignmentOutcome::Unassigned);
        };

        if assignment.cursor_was_stale {
            let stale = state.last_staff_assigned.as_ref().map(|id| id.0.as_str()).unwrap_or("");
            warn!(
                event_name = "assignment.cursor.stale",
                correlation_id = %correlation_id,
                merchant_id = %business.merchant_id,
                stale_cursor = stale,
                "cursor analyst is no longer on the roster, restarting from the head"
            );
        }

        self.disputes.assign_analyst_within(conn, &dispute.id, &assignment.staff_id, now).await?;
        self.cursor.write_within(conn, &business.merchant_id, &assignment.staff_id, now).await?;
        dispute.analyst_id = Some(assignment.staff_id.clone());
        dispute.updated_at = now;

        Ok(AssignmentOutcome::NewlyAssigned(assignment.staff_id))
    }

    /// Step 8: one DisputeLog row and one audit event per unit, written
    /// after the transaction has resolved. A log failure is traced, never
    /// propagated; it must not mask the primary result.
    async fn record_outcome(
        &self,
        correlation_id: &str,
        trace: &IngestTrace,
        result: &Result<(Dispute, DisputeEventKind), IngestError>,
    ) {
        let now = self.clock.now();
        let (outcome, message) = match result {
            Ok((dispute, event_kind)) => (
                LogOutcome::Success,
                format!(
                    "{} dispute {} via {} webhook",
                    event_kind.as_str(),
                    dispute.code,
                    dispute.gateway
                ),
            ),
            Err(error) => (LogOutcome::Failure, error.to_string()),
        };

        let log = DisputeLog {
            id: DisputeLogId::generate(),
            merchant_id: trace.merchant_id.clone(),
            gateway: trace.gateway.clone(),
            gateway_dispute_ref: trace.gateway_dispute_ref.clone(),
            payload_id: trace.payload_id.clone(),
            outcome,
            message: message.clone(),
            created_at: now,
        };
        if let Err(log_error) = self.logs.record(&log).await {
            error!(
                event_name = "ingest.audit.write_failed",
                correlation_id = %correlation_id,
                error = %log_error,
                "failed to record the ingestion outcome"
            );
        }

        let (event_type, audit_outcome) = match result {
            Ok(_) => ("ingest.completed", AuditOutcome::Success),
            Err(error) => match error.kind() {
                ErrorKind::Validation | ErrorKind::NotFound => {
                    ("ingest.rejected", AuditOutcome::Rejected)
                }
                _ => ("ingest.failed", AuditOutcome::Failed),
            },
        };
        let mut audit_event = AuditEvent::new(
            result.as_ref().ok().map(|(dispute, _)| dispute.id.clone()),
            trace.merchant_id.clone(),
            correlation_id,
            event_type,
            AuditCategory::Ingestion,
            "ingestion-pipeline",
            audit_outcome,
        )
        .with_metadata("message", message);
        if let Some(gateway) = &trace.gateway {
            audit_event = audit_event.with_metadata("gateway", gateway.clone());
        }
        if let Err(error) = result {
            audit_event = audit_event.with_metadata("error_kind", error.kind().as_str());
            warn!(
                event_name = "ingest.failed",
                correlation_id = %correlation_id,
                kind = error.kind().as_str(),
                error = %error,
                "ingestion unit ended in failure"
            );
        }
        self.audit.emit(audit_event);
    }
}

fn valid_business_ref(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 64
        && value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn dispute_from_event(business: &Business, event: &CanonicalEvent, now: DateTime<Utc>) -> Dispute {
    Dispute {
        id: DisputeId::generate(),
        code: Dispute::generate_code(),
        merchant_id: business.merchant_id.clone(),
        business_id: business.id.clone(),
        analyst_id: None,
        manager_id: None,
        gateway: event.gateway.clone(),
        gateway_dispute_ref: event.gateway_dispute_ref.clone(),
        payment_ref: event.payment_ref.clone(),
        amount: event.amount,
        currency: event.currency.clone(),
        reason_code: event.reason_code.clone(),
        reason_text: event.reason_text.clone(),
        status: event.status.clone(),
        event: event.event.clone(),
        status_updated_at: event.status_updated_at.unwrap_or(now),
        due_date: event.due_date,
        stage: DisputeStage::Pending,
        stage_updated_at: now,
        last_stage: None,
        last_stage_at: None,
        is_submitted: false,
        created_at: now,
        updated_at: now,
    }
}

/// Later webhooks only touch the event-mutable fields; workflow stage and
/// assignment belong to staff actions and the assigner respectively.
fn merge_event(mut dispute: Dispute, event: &CanonicalEvent, now: DateTime<Utc>) -> Dispute {
    dispute.payment_ref = event.payment_ref.clone();
    dispute.amount = event.amount;
    dispute.currency = event.currency.clone();
    dispute.reason_code = event.reason_code.clone();
    dispute.reason_text = event.reason_text.clone();
    dispute.status = event.status.clone();
    dispute.event = event.event.clone();
    dispute.status_updated_at = event.status_updated_at.unwrap_or(now);
    dispute.due_date = event.due_date;
    dispute.updated_at = now;
    dispute
}
