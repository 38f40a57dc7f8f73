use practice_core::EmergencyResponse;
use practice_core::model::{
    ChallengeResult, Milestone, SafetyIncident, Session, SessionOutcome, UserProgressLedger,
};

/// Everything that happened when a session reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub session: Session,
    /// Resolved script when the session was escalated.
    pub emergency: Option<EmergencyResponse>,
    pub incident: Option<SafetyIncident>,
    pub new_milestones: Vec<Milestone>,
    /// Ledger as it stood after folding this session in.
    pub ledger: UserProgressLedger,
    /// `false` if the ledger or the incident failed to reach storage.
    pub persisted: bool,
}

impl SessionReport {
    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.session.outcome()
    }

    #[must_use]
    pub fn is_emergency(&self) -> bool {
        self.emergency.is_some()
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.session.current_duration_secs()
    }
}

/// Result of scoring and recording one challenge response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeOutcome {
    pub result: ChallengeResult,
    pub new_milestones: Vec<Milestone>,
    pub persisted: bool,
}
