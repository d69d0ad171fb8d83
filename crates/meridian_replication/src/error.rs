//! Crate-level error type for callers that drive several components.

use crate::codec::CodecError;
use crate::edit::DispatchError;
use crate::persist::PersistError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}
