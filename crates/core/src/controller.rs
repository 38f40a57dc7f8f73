use chrono::{DateTime, Utc};

use crate::emergency::{self, EmergencyResponse};
use crate::error::SessionError;
use crate::model::{
    IncidentType, SafetyConditions, SafetyIncident, SafetyProtocol, SafetyProtocolSet, Session,
    SessionOutcome, SessionSettings, SessionStatus, Severity, Technique, UserId,
};
use crate::safety_gate;

//
// ─── REQUESTS & OUTCOMES ───────────────────────────────────────────────────────
//

/// Everything needed to ask for a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub technique: Technique,
    pub protocols: SafetyProtocolSet,
    pub conditions: SafetyConditions,
}

impl StartRequest {
    #[must_use]
    pub fn new(
        technique: Technique,
        protocols: SafetyProtocolSet,
        conditions: SafetyConditions,
    ) -> Self {
        Self {
            technique,
            protocols,
            conditions,
        }
    }
}

/// A terminal transition, carrying the frozen session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub session: Session,
    /// Present when the session was escalated rather than stopped.
    pub emergency: Option<EmergencyResponse>,
    /// Incident to append to the safety log, if any.
    pub incident: Option<SafetyIncident>,
}

impl Termination {
    #[must_use]
    pub fn is_emergency(&self) -> bool {
        self.emergency.is_some()
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No running session; nothing changed.
    Ignored,
    Advanced { elapsed: u32, remaining: u32 },
    /// First tick at or past the warning threshold.
    WarningReached { elapsed: u32, remaining: u32 },
    /// The ceiling was reached and the session was forcibly ended. `warned` is
    /// set when the same tick also crossed the warning threshold for the first
    /// time, which happens for very short sessions.
    Terminated { termination: Termination, warned: bool },
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Session state machine for one user context.
///
/// Idle → Active (→ Warning) → Completed | EmergencyTerminated → (close) → Idle.
/// Holds at most one session; a terminal session stays until `close` so the
/// caller can fold it into the ledger first.
#[derive(Debug, Clone)]
pub struct SessionController {
    user_id: UserId,
    settings: SessionSettings,
    protocols: SafetyProtocolSet,
    session: Option<Session>,
}

impl SessionController {
    #[must_use]
    pub fn new(user_id: UserId, settings: SessionSettings) -> Self {
        Self {
            user_id,
            settings,
            protocols: SafetyProtocolSet::none(),
            session: None,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Live protocol flags (not the snapshot held by a running session).
    #[must_use]
    pub fn protocols(&self) -> &SafetyProtocolSet {
        &self.protocols
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map_or(SessionStatus::Idle, Session::status)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Toggles one protocol.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ProtocolsLocked` while a session is running.
    pub fn set_protocol(
        &mut self,
        protocol: SafetyProtocol,
        enabled: bool,
    ) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::ProtocolsLocked);
        }
        self.protocols.set(protocol, enabled);
        Ok(())
    }

    /// Starts a new session if the safety gate allows it.
    ///
    /// The request's protocol set becomes the live set whether or not the gate
    /// passes, so a caller can fix one flag and retry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionAlreadyActive` if a session is running,
    /// `SessionError::PreviousSessionOpen` if a finished session has not been
    /// closed, and `SessionError::SafetyPreconditionFailure` listing every
    /// failed check when the gate denies.
    pub fn start(
        &mut self,
        request: StartRequest,
        now: DateTime<Utc>,
    ) -> Result<&Session, SessionError> {
        if let Some(existing) = &self.session {
            let session_id = existing.id();
            return Err(if existing.status().is_running() {
                SessionError::SessionAlreadyActive { session_id }
            } else {
                SessionError::PreviousSessionOpen { session_id }
            });
        }

        self.protocols = request.protocols;
        let decision = safety_gate::evaluate(&self.protocols, request.conditions);
        if !decision.allowed() {
            return Err(SessionError::SafetyPreconditionFailure {
                failed: decision.into_failed_checks(),
            });
        }

        let session = Session::begin(
            self.user_id,
            request.technique,
            now,
            self.settings.max_duration_secs(),
            self.protocols,
        );
        Ok(self.session.insert(session))
    }

    /// Advances the running session by one second.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Ignored;
        };
        if !session.status().is_running() {
            return TickOutcome::Ignored;
        }

        let elapsed = session.advance();
        let warned =
            session.status() == SessionStatus::Active && self.settings.is_past_warning(elapsed);
        if warned {
            session.mark_warning();
        }
        if elapsed >= session.max_duration_secs() {
            return TickOutcome::Terminated {
                termination: duration_exceeded(session, now),
                warned,
            };
        }

        let remaining = session.remaining_secs();
        if warned {
            return TickOutcome::WarningReached { elapsed, remaining };
        }
        TickOutcome::Advanced { elapsed, remaining }
    }

    /// Ends the running session at the user's request.
    ///
    /// Returns `None` when there is nothing to stop. A session already at its
    /// ceiling is escalated as duration-exceeded instead of completing.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<Termination> {
        let session = self.running_session_mut()?;
        if session.current_duration_secs() >= session.max_duration_secs() {
            return Some(duration_exceeded(session, now));
        }

        session.finish(SessionOutcome::Completed, now);
        Some(Termination {
            session: session.clone(),
            emergency: None,
            incident: None,
        })
    }

    /// Escalates the running session. Always logged with high severity.
    ///
    /// Returns `None` when there is nothing to escalate.
    pub fn emergency(
        &mut self,
        incident_type: IncidentType,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<Termination> {
        let session = self.running_session_mut()?;
        Some(escalate(
            session,
            incident_type,
            Severity::High,
            description.into(),
            now,
        ))
    }

    /// Releases a finished session and returns the controller to Idle.
    ///
    /// Returns `None` (and keeps the session) if it is still running.
    pub fn close(&mut self) -> Option<Session> {
        if self.session.as_ref().is_some_and(Session::is_terminal) {
            self.session.take()
        } else {
            None
        }
    }

    fn running_session_mut(&mut self) -> Option<&mut Session> {
        self.session
            .as_mut()
            .filter(|session| session.status().is_running())
    }
}

fn duration_exceeded(session: &mut Session, now: DateTime<Utc>) -> Termination {
    let description = format!(
        "session reached its {}s limit",
        session.max_duration_secs()
    );
    escalate(
        session,
        IncidentType::DurationExceeded,
        Severity::Medium,
        description,
        now,
    )
}

fn escalate(
    session: &mut Session,
    incident_type: IncidentType,
    severity: Severity,
    description: String,
    now: DateTime<Utc>,
) -> Termination {
    let response = emergency::resolve(incident_type);
    session.finish(SessionOutcome::EmergencyTerminated { incident_type }, now);
    let incident = SafetyIncident::new(
        session.user_id(),
        Some(session.id()),
        incident_type,
        description,
        severity,
        now,
    );
    Termination {
        session: session.clone(),
        emergency: Some(response),
        incident: Some(incident),
    }
}
