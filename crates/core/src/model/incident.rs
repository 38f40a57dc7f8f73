use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::{IncidentId, SessionId, UserId};

//
// ─── INCIDENT TYPE ─────────────────────────────────────────────────────────────
//

/// Category of a safety incident.
///
/// The first four are emergency categories with a dedicated response script;
/// `SafetyGateDenied` is only ever recorded, never escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    ReturnDifficulty,
    AdverseEncounter,
    Disorientation,
    DurationExceeded,
    SafetyGateDenied,
}

impl IncidentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentType::ReturnDifficulty => "return_difficulty",
            IncidentType::AdverseEncounter => "adverse_encounter",
            IncidentType::Disorientation => "disorientation",
            IncidentType::DurationExceeded => "duration_exceeded",
            IncidentType::SafetyGateDenied => "safety_gate_denied",
        }
    }

    /// Parses a stored label exactly, without any fallback.
    #[must_use]
    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "return_difficulty" => Some(IncidentType::ReturnDifficulty),
            "adverse_encounter" => Some(IncidentType::AdverseEncounter),
            "disorientation" => Some(IncidentType::Disorientation),
            "duration_exceeded" => Some(IncidentType::DurationExceeded),
            "safety_gate_denied" => Some(IncidentType::SafetyGateDenied),
            _ => None,
        }
    }

    /// Parses a caller-supplied emergency label.
    ///
    /// Unknown labels map to `Disorientation`, the most conservative script.
    /// Labels are matched case-insensitively and accept spaces or dashes in
    /// place of underscores ("Return difficulty" works).
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::from_str_opt(&normalized).unwrap_or(IncidentType::Disorientation)
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── SEVERITY ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    #[must_use]
    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── INCIDENT RECORD ───────────────────────────────────────────────────────────
//

/// Append-only record of something that went wrong (or nearly did).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyIncident {
    id: IncidentId,
    user_id: UserId,
    session_id: Option<SessionId>,
    incident_type: IncidentType,
    description: String,
    severity: Severity,
    timestamp: DateTime<Utc>,
}

impl SafetyIncident {
    #[must_use]
    pub fn new(
        user_id: UserId,
        session_id: Option<SessionId>,
        incident_type: IncidentType,
        description: impl Into<String>,
        severity: Severity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: IncidentId::generate(),
            user_id,
            session_id,
            incident_type,
            description: description.into(),
            severity,
            timestamp,
        }
    }

    /// Rehydrate an incident from persisted storage.
    #[must_use]
    pub fn from_persisted(
        id: IncidentId,
        user_id: UserId,
        session_id: Option<SessionId>,
        incident_type: IncidentType,
        description: String,
        severity: Severity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            session_id,
            incident_type,
            description,
            severity,
            timestamp,
        }
    }

    #[must_use]
    pub fn id(&self) -> IncidentId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    #[must_use]
    pub fn incident_type(&self) -> IncidentType {
        self.incident_type
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_parsing_is_forgiving() {
        assert_eq!(
            IncidentType::from_label("Return difficulty"),
            IncidentType::ReturnDifficulty
        );
        assert_eq!(
            IncidentType::from_label("adverse-encounter"),
            IncidentType::AdverseEncounter
        );
    }

    #[test]
    fn unknown_label_falls_back_to_disorientation() {
        assert_eq!(
            IncidentType::from_label("shadow figure"),
            IncidentType::Disorientation
        );
        assert_eq!(IncidentType::from_label(""), IncidentType::Disorientation);
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }
}
