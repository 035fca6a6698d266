use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use disputary_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use disputary_core::domain::dispute::{Dispute, DisputeFeedback, DisputeId};
use disputary_core::errors::ErrorKind;
use disputary_core::workflow::{plan_transition, WorkflowAction};
use disputary_db::repositories::{
    DisputeFeedbackRepository, DisputeRepository, SqlDisputeFeedbackRepository,
    SqlDisputeRepository,
};
use disputary_db::DbPool;

use crate::clock::Clock;
use crate::errors::TransitionError;

/// Feedback attached to a rejection. `reason` must not be blank; the rest
/// travels as given.
#[derive(Clone, Debug)]
pub struct FeedbackInput {
    pub reason: String,
    pub comments: Option<String>,
    pub evidence_files: Vec<String>,
}

/// Applies staff actions to the dispute review lifecycle. The stage guard
/// inside the transaction turns a concurrently moved dispute into a
/// conflict instead of a silent double apply.
pub struct WorkflowService {
    pool: DbPool,
    disputes: Arc<dyn DisputeRepository>,
    feedback: Arc<dyn DisputeFeedbackRepository>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl WorkflowService {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            disputes: Arc::new(SqlDisputeRepository::new(pool.clone())),
            feedback: Arc::new(SqlDisputeFeedbackRepository::new(pool.clone())),
            pool,
            clock,
            audit,
        }
    }

    #[cfg(test)]
    fn with_dispute_repository(mut self, disputes: Arc<dyn DisputeRepository>) -> Self {
        self.disputes = disputes;
        self
    }

    /// Applies one action on behalf of `actor` and returns the dispute as
    /// stored afterwards. Every call emits exactly one audit event.
    pub async fn transition(
        &self,
        dispute_id: &DisputeId,
        action: WorkflowAction,
        actor: &str,
        feedback: Option<FeedbackInput>,
    ) -> Result<Dispute, TransitionError> {
        let correlation_id = format!("wf-{}", Uuid::new_v4().simple());
        let result = self.execute(dispute_id, action, feedback, &correlation_id).await;
        self.record_outcome(dispute_id, action, actor, &correlation_id, &result);
        result
    }

    async fn execute(
        &self,
        dispute_id: &DisputeId,
        action: WorkflowAction,
        feedback: Option<FeedbackInput>,
        correlation_id: &str,
    ) -> Result<Dispute, TransitionError> {
        let current = self
            .disputes
            .find_by_id(dispute_id)
            .await?
            .ok_or_else(|| TransitionError::DisputeNotFound(dispute_id.0.clone()))?;

        let plan = plan_transition(current.stage, action)?;

        // A rejection must carry a usable reason; feedback handed to any
        // other action is dropped rather than persisted.
        let feedback = match (plan.requires_feedback, feedback) {
            (true, Some(input)) if !input.reason.trim().is_empty() => Some(input),
            (true, _) => return Err(TransitionError::MissingFeedback),
            (false, _) => None,
        };

        let now = self.clock.now();
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let applied =
            self.disputes.apply_transition_within(&mut *tx, dispute_id, &plan, now).await?;
        if !applied {
            // The stage guard missed: someone else moved the dispute
            // between our read and this write.
            tx.rollback().await?;
            return Err(TransitionError::StaleStage(dispute_id.0.clone()));
        }

        if let Some(input) = feedback {
            let record = DisputeFeedback {
                dispute_id: dispute_id.clone(),
                reason: input.reason,
                comments: input.comments,
                evidence_files: input.evidence_files,
                updated_at: now,
            };
            self.feedback.upsert_within(&mut *tx, &record).await?;
        }

        tx.commit().await?;

        info!(
            event_name = "workflow.transition.applied",
            correlation_id = %correlation_id,
            dispute_id = %dispute_id,
            action = action.as_str(),
            from = plan.from.as_str(),
            to = plan.to.as_str(),
            "stage transition committed"
        );

        self.disputes.find_by_id(dispute_id).await?.ok_or_else(|| {
            TransitionError::Persistence(format!(
                "dispute `{dispute_id}` vanished after transition"
            ))
        })
    }

    fn record_outcome(
        &self,
        dispute_id: &DisputeId,
        action: WorkflowAction,
        actor: &str,
        correlation_id: &str,
        result: &Result<Dispute, TransitionError>,
    ) {
        let (event_type, outcome) = match result {
            Ok(_) => ("workflow.transition.applied", AuditOutcome::Success),
            Err(error) => match error.kind() {
                ErrorKind::Conflict | ErrorKind::Persistence => {
                    ("workflow.transition.failed", AuditOutcome::Failed)
                }
                _ => ("workflow.transition.rejected", AuditOutcome::Rejected),
            },
        };

        if let Err(error) = result {
            warn!(
                event_name = "workflow.transition.rejected",
                correlation_id = %correlation_id,
                dispute_id = %dispute_id,
                action = action.as_str(),
                kind = error.kind().as_str(),
                error = %error,
                "stage transition did not apply"
            );
        }

        let mut event = AuditEvent::new(
            Some(dispute_id.clone()),
            result.as_ref().ok().map(|dispute| dispute.merchant_id.clone()),
            correlation_id,
            event_type,
            AuditCategory::Workflow,
            actor,
            outcome,
        )
        .with_metadata("action", action.as_str());
        match result {
            Ok(dispute) => {
                event = event.with_metadata("stage", dispute.stage.as_str());
            }
            Err(error) => {
                event = event.with_metadata("error_kind", error.kind().as_str());
            }
        }
        self.audit.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;
    use sqlx::SqliteConnection;

    use disputary_core::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
    use disputary_core::domain::dispute::{Dispute, DisputeId, DisputeStage};
    use disputary_core::domain::merchant::{BusinessId, MerchantId};
    use disputary_core::domain::staff::StaffId;
    use disputary_core::workflow::{StageTransitionError, TransitionPlan, WorkflowAction};
    use disputary_db::repositories::{
        DisputeFeedbackRepository, DisputeRepository, RepositoryError,
        SqlDisputeFeedbackRepository, SqlDisputeRepository,
    };
    use disputary_db::{connect_with_settings, migrations, DbPool};

    use crate::clock::SystemClock;
    use crate::errors::TransitionError;
    use crate::workflow::{FeedbackInput, WorkflowService};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        seed_merchant_graph(&pool).await;
        pool
    }

    async fn seed_merchant_graph(pool: &DbPool) {
        sqlx::query(
            "INSERT INTO merchants (id, name, contact_email, dispute_count, created_at, updated_at) \
             VALUES ('MER-W1', 'Trattoria Uno', 'ops@trattoria.example', 1, \
                     '2026-03-01T12:00:00Z', '2026-03-01T12:00:00Z')",
        )
        .execute(pool)
        .await
        .expect("insert merchant");

        sqlx::query(
            "INSERT INTO businesses (id, merchant_id, registration_ref, name, created_at) \
             VALUES ('BIZ-W1', 'MER-W1', 'REG-W1', 'Trattoria Uno Online', '2026-03-01T12:00:00Z')",
        )
        .execute(pool)
        .await
        .expect("insert business");
    }

    fn service(pool: &DbPool) -> (WorkflowService, InMemoryAuditSink) {
        let audit = InMemoryAuditSink::default();
        let service =
            WorkflowService::new(pool.clone(), Arc::new(SystemClock), Arc::new(audit.clone()));
        (service, audit)
    }

    fn sample_dispute(id: &str, stage: DisputeStage) -> Dispute {
        Dispute {
            id: DisputeId(id.to_string()),
            code: format!("CB-{id}"),
            merchant_id: MerchantId("MER-W1".to_string()),
            business_id: BusinessId("BIZ-W1".to_string()),
            analyst_id: Some(StaffId("STF-W1".to_string())),
            manager_id: None,
            gateway: "acmepay".to_string(),
            gateway_dispute_ref: format!("GW-{id}"),
            payment_ref: "PAYMENT-W1".to_string(),
            amount: dec!(45.00),
            currency: "USD".to_string(),
            reason_code: Some("4837".to_string()),
            reason_text: None,
            status: "open".to_string(),
            event: "dispute.created".to_string(),
            status_updated_at: parse_ts("2026-03-01T12:00:00Z"),
            due_date: None,
            stage,
            stage_updated_at: parse_ts("2026-03-01T12:00:00Z"),
            last_stage: None,
            last_stage_at: None,
            is_submitted: false,
            created_at: parse_ts("2026-03-01T12:00:00Z"),
            updated_at: parse_ts("2026-03-01T12:00:00Z"),
        }
    }

    async fn insert_dispute(pool: &DbPool, dispute: &Dispute) {
        // Disputes reference their analyst; the STF-W1 parent row must
        // exist before the insert.
        sqlx::query(
            "INSERT INTO staff (id, merchant_id, name, role, is_active, created_at) \
             SELECT 'STF-W1', 'MER-W1', 'Avery', 'analyst', 1, '2026-03-01T12:00:00Z' \
             WHERE NOT EXISTS (SELECT 1 FROM staff WHERE id = 'STF-W1')",
        )
        .execute(pool)
        .await
        .expect("seed analyst");

        let repo = SqlDisputeRepository::new(pool.clone());
        let mut conn = pool.acquire().await.expect("acquire");
        repo.insert_within(&mut conn, dispute).await.expect("insert dispute");
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    #[tokio::test]
    async fn reject_with_feedback_then_resubmit_records_prior_stage() {
        let pool = setup_pool().await;
        insert_dispute(&pool, &sample_dispute("DSP-W1", DisputeStage::Submitted)).await;
        let (service, audit) = service(&pool);
        let id = DisputeId("DSP-W1".to_string());

        let rejected = service
            .transition(
                &id,
                WorkflowAction::Reject,
                "manager-41",
                Some(FeedbackInput {
                    reason: "missing documentation".to_string(),
                    comments: Some("attach the signed receipt".to_string()),
                    evidence_files: vec!["receipt.pdf".to_string()],
                }),
            )
            .await
            .expect("reject");
        assert_eq!(rejected.stage, DisputeStage::Rejected);
        assert_eq!(rejected.last_stage, Some(DisputeStage::Submitted));
        assert!(!rejected.is_submitted);

        let feedback = SqlDisputeFeedbackRepository::new(pool.clone())
            .find_by_dispute(&id)
            .await
            .expect("find feedback")
            .expect("feedback row");
        assert_eq!(feedback.reason, "missing documentation");
        assert_eq!(feedback.evidence_files, vec!["receipt.pdf".to_string()]);

        let resubmitted = service
            .transition(&id, WorkflowAction::Submit, "analyst-7", None)
            .await
            .expect("resubmit");
        assert_eq!(resubmitted.stage, DisputeStage::Resubmitted);
        assert_eq!(resubmitted.last_stage, Some(DisputeStage::Rejected));

        let events = audit.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].actor, "manager-41");
        assert_eq!(events[0].category, AuditCategory::Workflow);
        assert!(events[0].correlation_id.starts_with("wf-"));
        assert!(events.iter().all(|event| event.outcome == AuditOutcome::Success));

        pool.close().await;
    }

    #[tokio::test]
    async fn acceptance_sets_the_submitted_flag_and_is_terminal() {
        let pool = setup_pool().await;
        insert_dispute(&pool, &sample_dispute("DSP-W2", DisputeStage::Submitted)).await;
        let (service, audit) = service(&pool);
        let id = DisputeId("DSP-W2".to_string());

        let accepted = service
            .transition(&id, WorkflowAction::Accept, "manager-41", None)
            .await
            .expect("accept");
        assert_eq!(accepted.stage, DisputeStage::Accepted);
        assert!(accepted.is_submitted);

        let error = service
            .transition(&id, WorkflowAction::Submit, "analyst-7", None)
            .await
            .expect_err("accepted is terminal");
        assert_eq!(
            error,
            TransitionError::Stage(StageTransitionError::AlreadyAccepted),
        );

        let events = audit.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, AuditOutcome::Success);
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);

        pool.close().await;
    }

    #[tokio::test]
    async fn reject_without_feedback_is_a_validation_error() {
        let pool = setup_pool().await;
        insert_dispute(&pool, &sample_dispute("DSP-W3", DisputeStage::Submitted)).await;
        let (service, _) = service(&pool);
        let id = DisputeId("DSP-W3".to_string());

        let missing = service
            .transition(&id, WorkflowAction::Reject, "manager-41", None)
            .await
            .expect_err("no feedback");
        assert_eq!(missing, TransitionError::MissingFeedback);

        let blank = service
            .transition(
                &id,
                WorkflowAction::Reject,
                "manager-41",
                Some(FeedbackInput {
                    reason: "   ".to_string(),
                    comments: None,
                    evidence_files: Vec::new(),
                }),
            )
            .await
            .expect_err("blank reason");
        assert_eq!(blank, TransitionError::MissingFeedback);

        // Nothing moved and nothing was written.
        let stored = SqlDisputeRepository::new(pool.clone())
            .find_by_id(&id)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.stage, DisputeStage::Submitted);
        let feedback =
            SqlDisputeFeedbackRepository::new(pool.clone()).find_by_dispute(&id).await.expect("find");
        assert!(feedback.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn resubmit_while_submitted_stamps_without_recording_last_stage() {
        let pool = setup_pool().await;
        insert_dispute(&pool, &sample_dispute("DSP-W4", DisputeStage::Pending)).await;
        let (service, _) = service(&pool);
        let id = DisputeId("DSP-W4".to_string());

        let submitted = service
            .transition(&id, WorkflowAction::Submit, "analyst-7", None)
            .await
            .expect("submit");
        assert_eq!(submitted.stage, DisputeStage::Submitted);
        assert_eq!(submitted.last_stage, Some(DisputeStage::Pending));

        let stamped = service
            .transition(&id, WorkflowAction::Submit, "analyst-7", None)
            .await
            .expect("stamp-only resubmit");
        assert_eq!(stamped.stage, DisputeStage::Submitted);
        assert_eq!(stamped.last_stage, submitted.last_stage);
        assert_eq!(stamped.last_stage_at, submitted.last_stage_at);
        assert!(stamped.stage_updated_at > submitted.stage_updated_at);

        pool.close().await;
    }

    #[tokio::test]
    async fn transition_on_missing_dispute_is_not_found() {
        let pool = setup_pool().await;
        let (service, audit) = service(&pool);

        let error = service
            .transition(
                &DisputeId("DSP-NOPE".to_string()),
                WorkflowAction::Submit,
                "analyst-7",
                None,
            )
            .await
            .expect_err("unknown dispute");
        assert_eq!(error, TransitionError::DisputeNotFound("DSP-NOPE".to_string()));

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);

        pool.close().await;
    }

    /// Delegates to the real repository but reports the stage as it looked
    /// before a concurrent actor moved the dispute.
    struct StaleReadRepository {
        inner: SqlDisputeRepository,
    }

    #[async_trait]
    impl DisputeRepository for StaleReadRepository {
        async fn find_by_id(&self, id: &DisputeId) -> Result<Option<Dispute>, RepositoryError> {
            let mut found = self.inner.find_by_id(id).await?;
            if let Some(dispute) = found.as_mut() {
                dispute.stage = DisputeStage::Submitted;
            }
            Ok(found)
        }

        async fn count_for_merchant(
            &self,
            merchant_id: &MerchantId,
        ) -> Result<i64, RepositoryError> {
            self.inner.count_for_merchant(merchant_id).await
        }

        async fn find_by_idempotency_key_within(
            &self,
            conn: &mut SqliteConnection,
            merchant_id: &MerchantId,
            gateway_dispute_ref: &str,
        ) -> Result<Option<Dispute>, RepositoryError> {
            self.inner.find_by_idempotency_key_within(conn, merchant_id, gateway_dispute_ref).await
        }

        async fn insert_within(
            &self,
            conn: &mut SqliteConnection,
            dispute: &Dispute,
        ) -> Result<(), RepositoryError> {
            self.inner.insert_within(conn, dispute).await
        }

        async fn update_within(
            &self,
            conn: &mut SqliteConnection,
            dispute: &Dispute,
        ) -> Result<(), RepositoryError> {
            self.inner.update_within(conn, dispute).await
        }

        async fn assign_analyst_within(
            &self,
            conn: &mut SqliteConnection,
            id: &DisputeId,
            analyst_id: &StaffId,
            at: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            self.inner.assign_analyst_within(conn, id, analyst_id, at).await
        }

        async fn apply_transition_within(
            &self,
            conn: &mut SqliteConnection,
            id: &DisputeId,
            plan: &TransitionPlan,
            at: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            self.inner.apply_transition_within(conn, id, plan, at).await
        }
    }

    #[tokio::test]
    async fn concurrent_stage_move_is_reported_as_a_conflict() {
        let pool = setup_pool().await;
        // The row is already ACCEPTED; the service reads it as SUBMITTED.
        insert_dispute(&pool, &sample_dispute("DSP-W6", DisputeStage::Accepted)).await;

        let audit = InMemoryAuditSink::default();
        let service =
            WorkflowService::new(pool.clone(), Arc::new(SystemClock), Arc::new(audit.clone()))
                .with_dispute_repository(Arc::new(StaleReadRepository {
                    inner: SqlDisputeRepository::new(pool.clone()),
                }));
        let id = DisputeId("DSP-W6".to_string());

        let error = service
            .transition(&id, WorkflowAction::Accept, "manager-41", None)
            .await
            .expect_err("guard must miss");
        assert_eq!(error, TransitionError::StaleStage("DSP-W6".to_string()));

        let stored = SqlDisputeRepository::new(pool.clone())
            .find_by_id(&id)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.stage, DisputeStage::Accepted);

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AuditOutcome::Failed);

        pool.close().await;
    }
}
