use thiserror::Error;

use crate::storage::StoreUnavailable;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("invalid usage event: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreUnavailable),
}
