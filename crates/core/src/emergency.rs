//! Fixed response scripts for safety incidents.

use std::fmt;

use crate::model::IncidentType;

/// Mandatory action the system performs on its own when an incident resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoAction {
    TerminateSession,
    LogIncident,
    PlayReturnSignal,
    ActivateGrounding,
    NotifyEmergencyContact,
}

impl AutoAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AutoAction::TerminateSession => "terminate_session",
            AutoAction::LogIncident => "log_incident",
            AutoAction::PlayReturnSignal => "play_return_signal",
            AutoAction::ActivateGrounding => "activate_grounding",
            AutoAction::NotifyEmergencyContact => "notify_emergency_contact",
        }
    }
}

impl fmt::Display for AutoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered remediation steps plus the actions taken automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyResponse {
    pub incident_type: IncidentType,
    pub steps: &'static [&'static str],
    pub auto_actions: &'static [AutoAction],
}

impl EmergencyResponse {
    #[must_use]
    pub fn requires(&self, action: AutoAction) -> bool {
        self.auto_actions.contains(&action)
    }
}

const RETURN_DIFFICULTY_STEPS: &[&str] = &[
    "Stay calm. You are safe and connected to your body.",
    "Focus your attention on your physical body lying at rest.",
    "Wiggle your fingers and toes, one at a time.",
    "Take slow, deep breaths and feel your chest rise and fall.",
    "Visualize your return anchor and pull yourself toward it.",
    "Open your eyes when you feel the weight of your body again.",
];

const ADVERSE_ENCOUNTER_STEPS: &[&str] = &[
    "Do not engage with the presence.",
    "Strengthen your protective shield with a firm intention.",
    "State clearly that the presence must leave.",
    "Return your attention to your body immediately.",
    "Ground yourself before doing anything else.",
];

const DISORIENTATION_STEPS: &[&str] = &[
    "Stop all movement and stay where you are.",
    "Breathe slowly and count each breath down from ten.",
    "Recall one familiar, safe memory in detail.",
    "Visualize your return anchor and move toward it.",
    "Reconnect with your body, then open your eyes slowly.",
    "Sit up only after you feel fully oriented.",
];

const DURATION_EXCEEDED_STEPS: &[&str] = &[
    "Your session has reached its maximum length.",
    "Gently return your attention to your breath.",
    "Feel the surface beneath you and the weight of your body.",
    "Open your eyes and rest before standing up.",
];

const RETURN_DIFFICULTY_ACTIONS: &[AutoAction] = &[
    AutoAction::TerminateSession,
    AutoAction::LogIncident,
    AutoAction::PlayReturnSignal,
    AutoAction::ActivateGrounding,
];

const ADVERSE_ENCOUNTER_ACTIONS: &[AutoAction] = &[
    AutoAction::TerminateSession,
    AutoAction::LogIncident,
    AutoAction::PlayReturnSignal,
    AutoAction::NotifyEmergencyContact,
];

const DISORIENTATION_ACTIONS: &[AutoAction] = &[
    AutoAction::TerminateSession,
    AutoAction::LogIncident,
    AutoAction::PlayReturnSignal,
    AutoAction::ActivateGrounding,
    AutoAction::NotifyEmergencyContact,
];

const DURATION_EXCEEDED_ACTIONS: &[AutoAction] = &[
    AutoAction::TerminateSession,
    AutoAction::LogIncident,
    AutoAction::PlayReturnSignal,
];

/// Looks up the response script for an incident category.
///
/// Total over `IncidentType`: anything without a dedicated script gets the
/// disorientation script, the most conservative one.
#[must_use]
pub fn resolve(incident_type: IncidentType) -> EmergencyResponse {
    let (steps, auto_actions) = match incident_type {
        IncidentType::ReturnDifficulty => (RETURN_DIFFICULTY_STEPS, RETURN_DIFFICULTY_ACTIONS),
        IncidentType::AdverseEncounter => (ADVERSE_ENCOUNTER_STEPS, ADVERSE_ENCOUNTER_ACTIONS),
        IncidentType::DurationExceeded => (DURATION_EXCEEDED_STEPS, DURATION_EXCEEDED_ACTIONS),
        IncidentType::Disorientation | IncidentType::SafetyGateDenied => {
            (DISORIENTATION_STEPS, DISORIENTATION_ACTIONS)
        }
    };
    EmergencyResponse {
        incident_type,
        steps,
        auto_actions,
    }
}

/// Resolves a free-form label, falling back to the disorientation script.
#[must_use]
pub fn resolve_label(label: &str) -> EmergencyResponse {
    resolve(IncidentType::from_label(label))
}
