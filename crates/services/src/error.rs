//! Shared error types for the services crate.

use thiserror::Error;

use nisen_core::model::ModuleId;
use nisen_core::stats::StatsError;
use storage::repository::StorageError;

/// Errors emitted by `ProgressEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("unknown module: {0}")]
    UnknownModule(ModuleId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<StatsError> for EngineError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::UnknownModule(id) => EngineError::UnknownModule(id),
        }
    }
}
