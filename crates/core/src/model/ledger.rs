use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::model::ids::{ChallengeId, SessionId, Technique};
use crate::model::incident::IncidentType;
use crate::model::session::{Session, SessionOutcome};

//
// ─── ACCURACY ──────────────────────────────────────────────────────────────────
//

/// Challenge accuracy score, clamped to `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Accuracy(u8);

impl Accuracy {
    pub const MAX: u8 = 100;

    /// Minimum accuracy for a challenge attempt to count as completed.
    pub const PASS_MARK: u8 = 50;

    #[must_use]
    pub fn new(value: u32) -> Self {
        let clamped = value.min(u32::from(Self::MAX));
        Self(u8::try_from(clamped).unwrap_or(Self::MAX))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_passing(self) -> bool {
        self.0 >= Self::PASS_MARK
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

//
// ─── CHALLENGE RESULT ──────────────────────────────────────────────────────────
//

/// Latest attempt at one challenge type. Retries overwrite it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResult {
    pub challenge_id: ChallengeId,
    pub completed: bool,
    pub accuracy: Accuracy,
    pub attempts: u32,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

//
// ─── MILESTONES ────────────────────────────────────────────────────────────────
//

/// One-way achievement flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Milestone {
    FirstSession,
    TenSessions,
    FirstHour,
    FirstChallenge,
    ChallengeAdept,
}

impl Milestone {
    pub const ALL: [Milestone; 5] = [
        Milestone::FirstSession,
        Milestone::TenSessions,
        Milestone::FirstHour,
        Milestone::FirstChallenge,
        Milestone::ChallengeAdept,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Milestone::FirstSession => "first_session",
            Milestone::TenSessions => "ten_sessions",
            Milestone::FirstHour => "first_hour",
            Milestone::FirstChallenge => "first_challenge",
            Milestone::ChallengeAdept => "challenge_adept",
        }
    }

    #[must_use]
    pub fn from_str_opt(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == value)
    }

    fn is_reached(self, ledger: &UserProgressLedger) -> bool {
        match self {
            Milestone::FirstSession => ledger.total_sessions >= 1,
            Milestone::TenSessions => ledger.total_sessions >= 10,
            Milestone::FirstHour => ledger.total_minutes >= 60,
            Milestone::FirstChallenge => ledger.completed_challenges() >= 1,
            Milestone::ChallengeAdept => ledger.completed_challenges() >= 3,
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeLevel {
    #[default]
    Novice,
    Apprentice,
    Adept,
    Master,
}

impl PracticeLevel {
    /// Derives the level from lifetime totals.
    #[must_use]
    pub fn from_totals(total_sessions: u32, total_minutes: u32) -> Self {
        if total_sessions >= 50 && total_minutes >= 1_500 {
            PracticeLevel::Master
        } else if total_sessions >= 20 && total_minutes >= 300 {
            PracticeLevel::Adept
        } else if total_sessions >= 5 {
            PracticeLevel::Apprentice
        } else {
            PracticeLevel::Novice
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PracticeLevel::Novice => "novice",
            PracticeLevel::Apprentice => "apprentice",
            PracticeLevel::Adept => "adept",
            PracticeLevel::Master => "master",
        }
    }
}

//
// ─── SESSION RECORD ────────────────────────────────────────────────────────────
//

/// Closed session folded into the ledger history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub technique: Technique,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: u32,
    pub outcome: SessionOutcome,
}

impl SessionRecord {
    #[must_use]
    pub fn incident_type(&self) -> Option<IncidentType> {
        self.outcome.incident_type()
    }
}

//
// ─── LEDGER ────────────────────────────────────────────────────────────────────
//

/// Per-user lifetime aggregate of sessions, challenges, and milestones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgressLedger {
    total_sessions: u32,
    total_minutes: u32,
    #[serde(default)]
    level: PracticeLevel,
    #[serde(default)]
    challenges: BTreeMap<ChallengeId, ChallengeResult>,
    #[serde(default)]
    sessions: Vec<SessionRecord>,
    #[serde(default)]
    milestones: BTreeMap<String, bool>,
}

impl UserProgressLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn total_sessions(&self) -> u32 {
        self.total_sessions
    }

    #[must_use]
    pub fn total_minutes(&self) -> u32 {
        self.total_minutes
    }

    #[must_use]
    pub fn level(&self) -> PracticeLevel {
        self.level
    }

    #[must_use]
    pub fn challenges(&self) -> &BTreeMap<ChallengeId, ChallengeResult> {
        &self.challenges
    }

    #[must_use]
    pub fn challenge(&self, id: &ChallengeId) -> Option<&ChallengeResult> {
        self.challenges.get(id)
    }

    #[must_use]
    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    /// Raw milestone flags as persisted, including names this build does not know.
    #[must_use]
    pub fn milestones(&self) -> &BTreeMap<String, bool> {
        &self.milestones
    }

    #[must_use]
    pub fn has_milestone(&self, milestone: Milestone) -> bool {
        self.milestones
            .get(milestone.as_str())
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn completed_challenges(&self) -> usize {
        self.challenges.values().filter(|r| r.completed).count()
    }

    #[must_use]
    pub fn has_recorded(&self, session_id: SessionId) -> bool {
        self.sessions.iter().any(|r| r.session_id == session_id)
    }

    /// Folds a terminal session into the totals.
    ///
    /// Returns `false` (and changes nothing) if the session is still running or
    /// was already recorded.
    pub fn record_session_end(&mut self, session: &Session) -> bool {
        let Some(outcome) = session.outcome() else {
            return false;
        };
        if self.has_recorded(session.id()) {
            return false;
        }

        self.total_sessions = self.total_sessions.saturating_add(1);
        self.total_minutes = self.total_minutes.saturating_add(session.credited_minutes());
        self.sessions.push(SessionRecord {
            session_id: session.id(),
            technique: session.technique().clone(),
            started_at: session.started_at(),
            ended_at: session.ended_at(),
            duration_secs: session.current_duration_secs(),
            outcome,
        });
        self.level = PracticeLevel::from_totals(self.total_sessions, self.total_minutes);
        true
    }

    /// Stores a scored attempt, overwriting any previous result for the challenge.
    pub fn record_challenge(
        &mut self,
        challenge_id: ChallengeId,
        accuracy: Accuracy,
        notes: impl Into<String>,
        at: DateTime<Utc>,
    ) -> ChallengeResult {
        let attempts = self
            .challenges
            .get(&challenge_id)
            .map_or(0, |prev| prev.attempts)
            .saturating_add(1);
        let result = ChallengeResult {
            challenge_id: challenge_id.clone(),
            completed: accuracy.is_passing(),
            accuracy,
            attempts,
            notes: notes.into(),
            timestamp: at,
        };
        self.challenges.insert(challenge_id, result.clone());
        result
    }

    /// Sets every milestone whose rule now holds and returns the newly set ones.
    ///
    /// Flags only ever move from false to true.
    pub fn check_milestones(&mut self) -> Vec<Milestone> {
        let mut achieved = Vec::new();
        for milestone in Milestone::ALL {
            if self.has_milestone(milestone) || !milestone.is_reached(self) {
                continue;
            }
            self.milestones.insert(milestone.as_str().to_owned(), true);
            achieved.push(milestone);
        }
        achieved
    }
}
