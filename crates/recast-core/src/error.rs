// Error types module
use recast_commons::errors::{CastError, DeclarationError, ResolutionError};
use thiserror::Error;

/// Main error type for Recast operations.
#[derive(Debug, Error)]
pub enum RecastError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error("model `{model}` has no method `{method}`")]
    UnknownMethod { model: String, method: String },
}

/// Result type alias using RecastError.
pub type Result<T> = std::result::Result<T, RecastError>;
