use thiserror::Error;

use strata_core::Cancelled;
use strata_storage::StorageError;

/// Errors surfaced by index queries and lifecycle operations.
///
/// Storage failures during queries are not surfaced here: they schedule a
/// rebuild and the query yields an empty result instead.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("index is not ready while the host is in dumb mode")]
    NotReady,

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Errors during service construction and index registration.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to open storage for index {index}: {source}")]
    OpenFailed {
        index: String,
        source: StorageError,
    },
}
