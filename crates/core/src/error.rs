use thiserror::Error;

use crate::model::{SafetyCheck, SessionId};

/// Errors returned synchronously by the session controller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("safety checks failed: {}", join_checks(.failed))]
    SafetyPreconditionFailure { failed: Vec<SafetyCheck> },

    #[error("session {session_id} is already active")]
    SessionAlreadyActive { session_id: SessionId },

    #[error("session {session_id} has ended but has not been closed")]
    PreviousSessionOpen { session_id: SessionId },

    #[error("safety protocols cannot change while a session is active")]
    ProtocolsLocked,
}

impl SessionError {
    /// Names of the failed checks, empty for every other variant.
    #[must_use]
    pub fn failed_check_names(&self) -> Vec<&'static str> {
        match self {
            SessionError::SafetyPreconditionFailure { failed } => {
                failed.iter().map(|check| check.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join_checks(checks: &[SafetyCheck]) -> String {
    checks
        .iter()
        .map(|check| check.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
