use crate::mock::RegistryError;
use crate::repositories::RepositoryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Agent not found: {0}")]
    AgentNotFound(i64),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Internal server error")]
    InternalError,
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::AlreadyExists(msg) => AppError::Conflict(msg),
            RepositoryError::NotFound => AppError::InternalError,
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AgentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Registry(e) => registry_status(e),
            AppError::Database(_) | AppError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Maps registry failures onto the control API's status codes
///
/// | RegistryError   | Status | Reason                                |
/// |-----------------|--------|---------------------------------------|
/// | NotFound        | 404    | Unknown agent id                      |
/// | AlreadyRunning  | 409    | Conflicts with the current state      |
/// | NotRunning      | 404    | Nothing to stop                       |
/// | LoadFailed      | 503    | Repository unavailable, retryable     |
/// | BindFailed      | 500    | Port misconfigured or taken           |
/// | ShutdownTimeout | 500    | Instance had to be force-closed       |
fn registry_status(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::NotFound(_) | RegistryError::NotRunning(_) => StatusCode::NOT_FOUND,
        RegistryError::AlreadyRunning(_) => StatusCode::CONFLICT,
        RegistryError::LoadFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RegistryError::BindFailed { .. } | RegistryError::ShutdownTimeout { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Registry(RegistryError::LoadFailed { .. }) => {
                tracing::warn!("{}", self);
                "Agent repository unavailable, try again".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
