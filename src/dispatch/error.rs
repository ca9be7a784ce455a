use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::PayloadError;

/// Failures that end a dispatch cycle before any delivery is attempted.
///
/// Per-endpoint delivery failures are not represented here; they are
/// recorded in the outcomes of a `DispatchResult`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("InternalServerError: Can't connect to rule registry")]
    RegistryUnavailable,

    #[error("BadRequest: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("NotFound: no enabled rules found")]
    NoEnabledRules,
}

impl DispatchError {
    /// Machine-readable code for responses and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::RegistryUnavailable => "REGISTRY_UNAVAILABLE",
            DispatchError::InvalidPayload(_) => "INVALID_PAYLOAD",
            DispatchError::NoEnabledRules => "NO_ENABLED_RULES",
        }
    }

    /// HTTP status for a dispatch that ended before delivery.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            DispatchError::NoEnabledRules => StatusCode::NOT_FOUND,
            DispatchError::RegistryUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
