use thiserror::Error;

use orchard_core::EmailError;

use crate::api::ApiError;

/// Errors from session lifecycle operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Supplied email address failed validation before any network call.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// A login or logout is already running; the new attempt was rejected.
    #[error("an authentication operation is already in flight")]
    OperationInFlight,

    /// The operation requires an authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The stored credential was rejected; the session has been destroyed.
    #[error("session expired")]
    SessionExpired,

    /// Backend call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}
