use crate::invoicing::details::ScheduleError;
use crate::ports::{GatewayError, NotificationError};
use crate::proposals::domain::ProcessingStatus;
use crate::store::StoreError;

/// Error taxonomy shared by every workflow operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("user is not authorised to perform this action")]
    NotAuthorized,
    #[error("cannot move a proposal from '{from}' to '{to}'")]
    InvalidTransition {
        from: ProcessingStatus,
        to: ProcessingStatus,
    },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0} has already been generated for this proposal")]
    AlreadyGenerated(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("the record was changed by someone else; refresh and try again")]
    StaleState,
    #[error("this combination of proposal type and application type is not supported")]
    UnsupportedCombination,
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<StoreError> for WorkflowError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Stale => WorkflowError::StaleState,
            StoreError::NotFound => WorkflowError::NotFound("record"),
            other => WorkflowError::Store(other),
        }
    }
}
