//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::SessionError;
use practice_core::model::SafetyCheck;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `PracticeSession` and `PracticeService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PracticeError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("challenge id cannot be empty")]
    EmptyChallengeId,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PracticeError {
    /// Failed gate checks when the start was refused by the safety gate.
    #[must_use]
    pub fn failed_checks(&self) -> Option<&[SafetyCheck]> {
        match self {
            Self::Session(SessionError::SafetyPreconditionFailure { failed }) => Some(failed),
            _ => None,
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
