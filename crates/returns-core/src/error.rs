use thiserror::Error;

use crate::domain::{ReturnId, TransitionError, ValidationError};
use crate::ports::StoreError;

/// Error returned by `ReturnService` operations.
#[derive(Debug, Error)]
pub enum ReturnsError {
    #[error("return not found: {0}")]
    NotFound(ReturnId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(StoreError),
}

/// Order-check failures raised inside a store transaction surface as
/// `Validation`, the same as checks run before it.
impl From<StoreError> for ReturnsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(err) => ReturnsError::Validation(err),
            other => ReturnsError::Store(other),
        }
    }
}
