mod ids;
mod incident;
mod ledger;
mod safety;
mod session;
mod settings;

pub use ids::{ChallengeId, IncidentId, ParseIdError, SessionId, Technique, UserId};
pub use incident::{IncidentType, SafetyIncident, Severity};
pub use ledger::{
    Accuracy, ChallengeResult, Milestone, PracticeLevel, SessionRecord, UserProgressLedger,
};
pub use safety::{SafetyCheck, SafetyConditions, SafetyProtocol, SafetyProtocolSet};
pub use session::{Session, SessionOutcome, SessionStatus};
pub use settings::{SessionSettings, SessionSettingsError};
