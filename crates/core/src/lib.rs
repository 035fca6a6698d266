pub mod assignment;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod workflow;

pub use assignment::{next_assignee, Assignment};
pub use domain::dispute::{
    Dispute, DisputeFeedback, DisputeHistory, DisputeId, DisputeStage, HistoryId,
};
pub use domain::event::{CanonicalEvent, CanonicalEventDraft, EventValidationError};
pub use domain::log::{DisputeLog, DisputeLogId, LogOutcome};
pub use domain::merchant::{Business, BusinessId, Merchant, MerchantId};
pub use domain::notification::{
    Notification, NotificationDraft, NotificationId, NotificationKind, RecipientKind,
};
pub use domain::payload::{InboundEnvelope, Payload, PayloadId};
pub use domain::staff::{Staff, StaffAssignmentState, StaffId, StaffRole};
pub use errors::{DomainError, ErrorKind};
pub use notify::{compose, AssignmentOutcome, DisputeEventKind, NotificationContext};
pub use workflow::{plan_transition, StageTransitionError, TransitionPlan, WorkflowAction};
