use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::event::EventValidationError;
use crate::workflow::StageTransitionError;

/// Failure taxonomy shared by ingestion, workflow transitions, and the
/// audit trail. Every terminal outcome is classified as exactly one kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    IllegalTransition,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::IllegalTransition => "illegal_transition",
            Self::Persistence => "persistence",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    EventValidation(#[from] EventValidationError),
    #[error(transparent)]
    StageTransition(#[from] StageTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EventValidation(_) | Self::InvariantViolation(_) => ErrorKind::Validation,
            Self::StageTransition(_) => ErrorKind::IllegalTransition,
        }
    }
}
