use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::dispute::DisputeStage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    Accept,
    Reject,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submit" | "resubmit" => Some(Self::Submit),
            "accept" => Some(Self::Accept),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StageTransitionError {
    #[error("dispute is already accepted and cannot transition further")]
    AlreadyAccepted,
    #[error("dispute in stage {stage:?} has not been submitted yet, cannot {action:?}")]
    NotYetSubmitted { stage: DisputeStage, action: WorkflowAction },
}

/// Everything a legal transition requires the caller to persist. Stamp-only
/// transitions (resubmit while already SUBMITTED/RESUBMITTED) refresh the
/// stage timestamp and leave `last_stage` untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: DisputeStage,
    pub to: DisputeStage,
    pub action: WorkflowAction,
    pub records_last_stage: bool,
    pub requires_feedback: bool,
    pub marks_submitted: bool,
}

impl TransitionPlan {
    pub fn is_stamp_only(&self) -> bool {
        !self.records_last_stage
    }
}

/// Validates one staff action against the current stage. Pure; the caller
/// applies the returned plan transactionally.
pub fn plan_transition(
    current: DisputeStage,
    action: WorkflowAction,
) -> Result<TransitionPlan, StageTransitionError> {
    use DisputeStage::{Accepted, Pending, Rejected, Resubmitted, Submitted};
    use WorkflowAction::{Accept, Reject, Submit};

    let (to, records_last_stage) = match (current, action) {
        (Pending, Submit) => (Submitted, true),
        (Submitted, Submit) => (Submitted, false),
        (Submitted, Accept) => (Accepted, true),
        (Submitted, Reject) => (Rejected, true),
        (Rejected, Submit) => (Resubmitted, true),
        (Resubmitted, Submit) => (Resubmitted, false),
        (Resubmitted, Accept) => (Accepted, true),
        (Resubmitted, Reject) => (Rejected, true),
        (Accepted, _) => return Err(StageTransitionError::AlreadyAccepted),
        (Pending | Rejected, Accept | Reject) => {
            return Err(StageTransitionError::NotYetSubmitted { stage: current, action });
        }
    };

    Ok(TransitionPlan {
        from: current,
        to,
        action,
        records_last_stage,
        requires_feedback: matches!(action, Reject),
        marks_submitted: matches!(to, Accepted),
    })
}
