use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::merchant::MerchantId;
use crate::domain::notification::{NotificationDraft, NotificationKind, RecipientKind};
use crate::domain::staff::StaffId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeEventKind {
    New,
    Updated,
}

impl DisputeEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentOutcome {
    NewlyAssigned(StaffId),
    AlreadyAssigned(StaffId),
    Unassigned,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NotificationContext {
    pub event_kind: DisputeEventKind,
    pub dispute_code: String,
    pub merchant_id: MerchantId,
    pub assignment: AssignmentOutcome,
    pub gateway: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
}

/// Builds the notification set for one ingestion outcome. Pure: the
/// orchestrator assigns ids and persists the drafts in its transaction.
///
/// Analyst draft first, merchant draft second, matching the decision
/// table: a newly assigned analyst is told about the assignment, an
/// analyst already holding the dispute is told about the update, and the
/// merchant always hears either "received" or "status changed".
pub fn compose(ctx: &NotificationContext) -> Vec<NotificationDraft> {
    let mut drafts = Vec::with_capacity(2);

    match &ctx.assignment {
        AssignmentOutcome::NewlyAssigned(staff_id) => {
            drafts.push(NotificationDraft {
                recipient_kind: RecipientKind::Staff,
                recipient_id: staff_id.0.clone(),
                kind: NotificationKind::DisputeAssigned,
                title: "New dispute assigned".to_string(),
                message: format!(
                    "Dispute {} from {} for {} {} has been assigned to you.",
                    ctx.dispute_code, ctx.gateway, ctx.amount, ctx.currency
                ),
            });
        }
        AssignmentOutcome::AlreadyAssigned(staff_id) => {
            drafts.push(NotificationDraft {
                recipient_kind: RecipientKind::Staff,
                recipient_id: staff_id.0.clone(),
                kind: NotificationKind::DisputeStatusChanged,
                title: "Dispute status changed".to_string(),
                message: format!(
                    "Dispute {} from {} moved to status {}.",
                    ctx.dispute_code, ctx.gateway, ctx.status
                ),
            });
        }
        AssignmentOutcome::Unassigned => {}
    }

    drafts.push(merchant_draft(ctx));
    drafts
}

fn merchant_draft(ctx: &NotificationContext) -> NotificationDraft {
    let assigned = !matches!(ctx.assignment, AssignmentOutcome::Unassigned);

    let (kind, title, message) = match (ctx.event_kind, assigned) {
        (DisputeEventKind::New, true) => (
            NotificationKind::DisputeReceived,
            "Dispute received",
            format!(
                "Dispute {} from {} for {} {} was received and assigned to an analyst.",
                ctx.dispute_code, ctx.gateway, ctx.amount, ctx.currency
            ),
        ),
        (_, false) => (
            NotificationKind::DisputeReceived,
            "Dispute received",
            format!(
                "Dispute {} from {} for {} {} was received and is awaiting assignment.",
                ctx.dispute_code, ctx.gateway, ctx.amount, ctx.currency
            ),
        ),
        (DisputeEventKind::Updated, true) => (
            NotificationKind::DisputeStatusChanged,
            "Dispute status changed",
            format!(
                "Dispute {} from {} moved to status {}.",
                ctx.dispute_code, ctx.gateway, ctx.status
            ),
        ),
    };

    NotificationDraft {
        recipient_kind: RecipientKind::Merchant,
        recipient_id: ctx.merchant_id.0.clone(),
        kind,
        title: title.to_string(),
        message,
    }
}
