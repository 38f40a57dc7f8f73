use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::{SessionId, Technique, UserId};
use crate::model::incident::IncidentType;
use crate::model::safety::SafetyProtocolSet;

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle label of a practice session.
///
/// `Warning` is a sub-state of `Active`: ticking continues unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Active,
    Warning,
    Completed,
    EmergencyTerminated,
}

impl SessionStatus {
    /// Active or Warning: the timer is (or should be) running.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Warning)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::EmergencyTerminated
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Active => "active",
            SessionStatus::Warning => "warning",
            SessionStatus::Completed => "completed",
            SessionStatus::EmergencyTerminated => "emergency_terminated",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    EmergencyTerminated {
        #[serde(rename = "incidentType")]
        incident_type: IncidentType,
    },
}

impl SessionOutcome {
    #[must_use]
    pub fn status(self) -> SessionStatus {
        match self {
            SessionOutcome::Completed => SessionStatus::Completed,
            SessionOutcome::EmergencyTerminated { .. } => SessionStatus::EmergencyTerminated,
        }
    }

    #[must_use]
    pub fn incident_type(self) -> Option<IncidentType> {
        match self {
            SessionOutcome::Completed => None,
            SessionOutcome::EmergencyTerminated { incident_type } => Some(incident_type),
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One timed, gated practice attempt.
///
/// Only the session controller mutates a session; once terminal it is frozen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    technique: Technique,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    current_duration_secs: u32,
    max_duration_secs: u32,
    status: SessionStatus,
    safety_snapshot: SafetyProtocolSet,
    outcome: Option<SessionOutcome>,
}

impl Session {
    pub(crate) fn begin(
        user_id: UserId,
        technique: Technique,
        started_at: DateTime<Utc>,
        max_duration_secs: u32,
        safety_snapshot: SafetyProtocolSet,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            user_id,
            technique,
            started_at,
            ended_at: None,
            current_duration_secs: 0,
            max_duration_secs,
            status: SessionStatus::Active,
            safety_snapshot,
            outcome: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn technique(&self) -> &Technique {
        &self.technique
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn current_duration_secs(&self) -> u32 {
        self.current_duration_secs
    }

    #[must_use]
    pub fn max_duration_secs(&self) -> u32 {
        self.max_duration_secs
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.max_duration_secs.saturating_sub(self.current_duration_secs)
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn safety_snapshot(&self) -> &SafetyProtocolSet {
        &self.safety_snapshot
    }

    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whole minutes credited to the ledger for this session.
    #[must_use]
    pub fn credited_minutes(&self) -> u32 {
        self.current_duration_secs / 60
    }

    /// Adds one second, never passing the ceiling. Returns the new duration.
    pub(crate) fn advance(&mut self) -> u32 {
        if self.current_duration_secs < self.max_duration_secs {
            self.current_duration_secs += 1;
        }
        self.current_duration_secs
    }

    pub(crate) fn mark_warning(&mut self) {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Warning;
        }
    }

    pub(crate) fn finish(&mut self, outcome: SessionOutcome, ended_at: DateTime<Utc>) {
        debug_assert!(!self.is_terminal(), "session finished twice");
        self.status = outcome.status();
        self.outcome = Some(outcome);
        self.ended_at = Some(ended_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn build_session(max: u32) -> Session {
        Session::begin(
            UserId::new(1),
            Technique::new("rope"),
            fixed_now(),
            max,
            SafetyProtocolSet::all_enabled(),
        )
    }

    #[test]
    fn advance_saturates_at_ceiling() {
        let mut session = build_session(2);
        assert_eq!(session.advance(), 1);
        assert_eq!(session.advance(), 2);
        assert_eq!(session.advance(), 2);
        assert_eq!(session.remaining_secs(), 0);
    }

    #[test]
    fn credited_minutes_floor() {
        let mut session = build_session(200);
        for _ in 0..125 {
            session.advance();
        }
        assert_eq!(session.credited_minutes(), 2);
    }

    #[test]
    fn finish_records_outcome() {
        let mut session = build_session(10);
        session.finish(
            SessionOutcome::EmergencyTerminated {
                incident_type: IncidentType::AdverseEncounter,
            },
            fixed_now(),
        );
        assert_eq!(session.status(), SessionStatus::EmergencyTerminated);
        assert_eq!(
            session.outcome().and_then(SessionOutcome::incident_type),
            Some(IncidentType::AdverseEncounter)
        );
        assert!(session.is_terminal());
    }
}
