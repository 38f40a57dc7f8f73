//! Precondition gate evaluated before any session may start.

use crate::model::{SafetyCheck, SafetyConditions, SafetyProtocolSet, Severity};

/// Result of evaluating the safety gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    failed: Vec<SafetyCheck>,
}

impl GateDecision {
    #[must_use]
    pub fn allowed(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failed checks in canonical order: protocols, then health, then environment.
    #[must_use]
    pub fn failed_checks(&self) -> &[SafetyCheck] {
        &self.failed
    }

    #[must_use]
    pub fn failed_check_names(&self) -> Vec<&'static str> {
        self.failed.iter().map(|check| check.as_str()).collect()
    }

    #[must_use]
    pub fn into_failed_checks(self) -> Vec<SafetyCheck> {
        self.failed
    }

    /// Severity at which this denial should be logged as an incident.
    ///
    /// Only a missing health clearance is incident-worthy; forgotten protocols
    /// are surfaced to the caller and nothing more.
    #[must_use]
    pub fn incident_severity(&self) -> Option<Severity> {
        incident_severity(&self.failed)
    }
}

/// Severity at which a denial with these failed checks is logged, if at all.
#[must_use]
pub fn incident_severity(failed: &[SafetyCheck]) -> Option<Severity> {
    failed
        .contains(&SafetyCheck::HealthClearance)
        .then_some(Severity::Medium)
}

/// Evaluates every precondition. All must pass for the gate to allow a start.
#[must_use]
pub fn evaluate(protocols: &SafetyProtocolSet, conditions: SafetyConditions) -> GateDecision {
    let mut failed: Vec<SafetyCheck> = protocols
        .iter()
        .filter(|(_, enabled)| !enabled)
        .map(|(protocol, _)| SafetyCheck::Protocol(protocol))
        .collect();

    if !conditions.health_clearance {
        failed.push(SafetyCheck::HealthClearance);
    }
    if !conditions.environment_ok {
        failed.push(SafetyCheck::Environment);
    }

    GateDecision { failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SafetyProtocol;

    #[test]
    fn all_clear_allows() {
        let decision = evaluate(&SafetyProtocolSet::all_enabled(), SafetyConditions::cleared());
        assert!(decision.allowed());
        assert!(decision.failed_checks().is_empty());
        assert_eq!(decision.incident_severity(), None);
    }

    #[test]
    fn single_missing_protocol_is_named() {
        let protocols =
            SafetyProtocolSet::all_enabled().with(SafetyProtocol::Grounding, false);
        let decision = evaluate(&protocols, SafetyConditions::cleared());

        assert!(!decision.allowed());
        assert_eq!(decision.failed_check_names(), vec!["grounding"]);
    }

    #[test]
    fn every_failure_is_reported_in_order() {
        let decision = evaluate(&SafetyProtocolSet::none(), SafetyConditions::new(false, false));
        assert_eq!(
            decision.failed_check_names(),
            vec![
                "grounding",
                "protective_shield",
                "return_anchor",
                "emergency_contact",
                "health_clearance",
                "environment",
            ]
        );
    }

    #[test]
    fn missing_health_clearance_is_incident_worthy() {
        let decision = evaluate(
            &SafetyProtocolSet::all_enabled(),
            SafetyConditions::new(false, true),
        );
        assert_eq!(decision.incident_severity(), Some(Severity::Medium));

        let env_only = evaluate(
            &SafetyProtocolSet::all_enabled(),
            SafetyConditions::new(true, false),
        );
        assert_eq!(env_only.incident_severity(), None);
    }
}
