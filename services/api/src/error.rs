use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use leases_core::config::ConfigError;
use leases_core::error::WorkflowError;
use leases_core::telemetry::TelemetryError;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Workflow(WorkflowError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Workflow(err) => write!(f, "workflow error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Workflow(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Workflow(workflow) => workflow_response(workflow),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Workflow errors map onto client-facing statuses; upstream outages are
/// reported as a delay rather than leaking transport detail.
fn workflow_response(error: &WorkflowError) -> (StatusCode, String) {
    let status = match error {
        WorkflowError::NotAuthorized => StatusCode::FORBIDDEN,
        WorkflowError::Validation(_)
        | WorkflowError::Schedule(_)
        | WorkflowError::UnsupportedCombination => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::InvalidTransition { .. }
        | WorkflowError::AlreadyExists(_)
        | WorkflowError::AlreadyGenerated(_)
        | WorkflowError::StaleState => StatusCode::CONFLICT,
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::Notification(_) | WorkflowError::Gateway(_) => {
            return (
                StatusCode::BAD_GATEWAY,
                "processing delayed; the request will be retried".to_string(),
            )
        }
        WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string())
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}
