use thiserror::Error;

use crate::store::StoreError;

/// Error taxonomy for relationship operations.
///
/// "Already in the requested state" is deliberately absent: repeated
/// follow/unfollow/block attempts are successful idempotent no-ops and are
/// reported through the outcome types instead.
#[derive(Debug, Error)]
pub enum RelationError {
    #[error("cannot perform this action on your own account")]
    SelfOperationNotAllowed,

    #[error("{0} not found")]
    EntityNotFound(&'static str),

    #[error("access denied: {0}")]
    AccessDenied(&'static str),

    /// Edge-store failure. Fatal to the call; no partial state is left
    /// behind because every store mutation is a single atomic write.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type RelationResult<T> = Result<T, RelationError>;
