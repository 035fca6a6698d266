use thiserror::Error;

use disputary_core::errors::ErrorKind;
use disputary_core::workflow::StageTransitionError;
use disputary_core::EventValidationError;
use disputary_db::repositories::RepositoryError;

/// Terminal outcome of one ingestion unit. None of these are retried
/// internally; redelivery is owned by the upstream queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("business registration reference is malformed: `{0}`")]
    MalformedBusinessRef(String),
    #[error("no business registered under `{0}`")]
    UnknownBusiness(String),
    #[error("no gateway recognized the delivery")]
    UnrecognizedGateway,
    #[error("gateway `{0}` payload could not be parsed into a canonical event")]
    UnparsablePayload(String),
    #[error(transparent)]
    InvalidEvent(#[from] EventValidationError),
    #[error("concurrent create for gateway reference `{0}`")]
    CreateRace(String),
    #[error("storage failure during ingestion: {0}")]
    Persistence(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedBusinessRef(_)
            | Self::UnrecognizedGateway
            | Self::UnparsablePayload(_)
            | Self::InvalidEvent(_) => ErrorKind::Validation,
            Self::UnknownBusiness(_) => ErrorKind::NotFound,
            Self::CreateRace(_) => ErrorKind::Conflict,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl From<RepositoryError> for IngestError {
    fn from(error: RepositoryError) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(error: sqlx::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Failure of one staff workflow action. Unlike ingestion failures these
/// are surfaced synchronously to the caller with an actionable message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("dispute `{0}` not found")]
    DisputeNotFound(String),
    #[error(transparent)]
    Stage(#[from] StageTransitionError),
    #[error("rejection requires feedback with a non-empty reason")]
    MissingFeedback,
    #[error("dispute `{0}` was transitioned concurrently, action not applied")]
    StaleStage(String),
    #[error("storage failure during transition: {0}")]
    Persistence(String),
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DisputeNotFound(_) => ErrorKind::NotFound,
            Self::Stage(_) => ErrorKind::IllegalTransition,
            Self::MissingFeedback => ErrorKind::Validation,
            Self::StaleStage(_) => ErrorKind::Conflict,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl From<RepositoryError> for TransitionError {
    fn from(error: RepositoryError) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<sqlx::Error> for TransitionError {
    fn from(error: sqlx::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}
