use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::session::AuthError;
use crate::storage::StorageError;
use crate::sync::MutationError;

/// Unified error for the storefront facade.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Convenience alias for facade results.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
