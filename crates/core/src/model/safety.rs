use serde::{Deserialize, Serialize};
use std::fmt;

//
// ─── SAFETY PROTOCOLS ──────────────────────────────────────────────────────────
//

/// One named precaution the practitioner activates before a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyProtocol {
    /// Grounding exercise completed before departure.
    Grounding,
    /// Protective visualization raised around the practitioner.
    ProtectiveShield,
    /// A return anchor (word, sound, or object) has been set.
    ReturnAnchor,
    /// Someone has been told about the session and can be reached.
    EmergencyContact,
}

impl SafetyProtocol {
    pub const ALL: [SafetyProtocol; 4] = [
        SafetyProtocol::Grounding,
        SafetyProtocol::ProtectiveShield,
        SafetyProtocol::ReturnAnchor,
        SafetyProtocol::EmergencyContact,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyProtocol::Grounding => "grounding",
            SafetyProtocol::ProtectiveShield => "protective_shield",
            SafetyProtocol::ReturnAnchor => "return_anchor",
            SafetyProtocol::EmergencyContact => "emergency_contact",
        }
    }

    #[must_use]
    pub fn from_str_opt(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

impl fmt::Display for SafetyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed set of safety flags.
///
/// Sessions hold a copy taken at start; toggles on the live set never reach a
/// recorded session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyProtocolSet {
    grounding: bool,
    protective_shield: bool,
    return_anchor: bool,
    emergency_contact: bool,
}

impl SafetyProtocolSet {
    /// All protocols disabled.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// All protocols enabled.
    #[must_use]
    pub fn all_enabled() -> Self {
        Self {
            grounding: true,
            protective_shield: true,
            return_anchor: true,
            emergency_contact: true,
        }
    }

    #[must_use]
    pub fn with(mut self, protocol: SafetyProtocol, enabled: bool) -> Self {
        self.set(protocol, enabled);
        self
    }

    pub fn set(&mut self, protocol: SafetyProtocol, enabled: bool) {
        match protocol {
            SafetyProtocol::Grounding => self.grounding = enabled,
            SafetyProtocol::ProtectiveShield => self.protective_shield = enabled,
            SafetyProtocol::ReturnAnchor => self.return_anchor = enabled,
            SafetyProtocol::EmergencyContact => self.emergency_contact = enabled,
        }
    }

    #[must_use]
    pub fn is_enabled(&self, protocol: SafetyProtocol) -> bool {
        match protocol {
            SafetyProtocol::Grounding => self.grounding,
            SafetyProtocol::ProtectiveShield => self.protective_shield,
            SafetyProtocol::ReturnAnchor => self.return_anchor,
            SafetyProtocol::EmergencyContact => self.emergency_contact,
        }
    }

    /// Iterates protocols in their canonical order together with their state.
    pub fn iter(&self) -> impl Iterator<Item = (SafetyProtocol, bool)> + '_ {
        SafetyProtocol::ALL
            .into_iter()
            .map(move |protocol| (protocol, self.is_enabled(protocol)))
    }

    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.iter().filter(|(_, enabled)| *enabled).count()
    }
}

//
// ─── CONDITIONS ────────────────────────────────────────────────────────────────
//

/// Health and environment attestations supplied with a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyConditions {
    pub health_clearance: bool,
    pub environment_ok: bool,
}

impl SafetyConditions {
    #[must_use]
    pub fn new(health_clearance: bool, environment_ok: bool) -> Self {
        Self {
            health_clearance,
            environment_ok,
        }
    }

    #[must_use]
    pub fn cleared() -> Self {
        Self::new(true, true)
    }
}

/// A single named precondition evaluated by the safety gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyCheck {
    Protocol(SafetyProtocol),
    HealthClearance,
    Environment,
}

impl SafetyCheck {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyCheck::Protocol(protocol) => protocol.as_str(),
            SafetyCheck::HealthClearance => "health_clearance",
            SafetyCheck::Environment => "environment",
        }
    }
}

impl fmt::Display for SafetyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
