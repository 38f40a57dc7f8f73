use std::sync::Arc;

use practice_core::model::{SafetyIncident, Severity, UserId};
use storage::repository::IncidentRepository;

use crate::error::PracticeError;

/// Writes safety incidents to the log and to `tracing`.
#[derive(Clone)]
pub struct IncidentService {
    incidents: Arc<dyn IncidentRepository>,
}

impl IncidentService {
    #[must_use]
    pub fn new(incidents: Arc<dyn IncidentRepository>) -> Self {
        Self { incidents }
    }

    /// Trace the incident, then append it. Returns whether the append succeeded.
    ///
    /// The trace is emitted even when storage is unavailable.
    pub async fn record(&self, incident: &SafetyIncident) -> bool {
        trace_incident(incident);
        match self.incidents.append_incident(incident).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    incident_id = %incident.id(),
                    user_id = %incident.user_id(),
                    error = %err,
                    "failed to append safety incident"
                );
                false
            }
        }
    }

    /// A user's most recent incidents, newest first.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Storage` if the log cannot be read.
    pub async fn recent(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<SafetyIncident>, PracticeError> {
        Ok(self.incidents.list_incidents(user_id, limit).await?)
    }
}

fn trace_incident(incident: &SafetyIncident) {
    let user_id = incident.user_id();
    let session_id = incident
        .session_id()
        .map_or_else(|| "-".to_owned(), |id| id.to_string());
    let incident_type = incident.incident_type();
    let description = incident.description();
    match incident.severity() {
        Severity::High => tracing::error!(
            %user_id,
            %session_id,
            %incident_type,
            severity = "high",
            description,
            "safety incident"
        ),
        severity => tracing::warn!(
            %user_id,
            %session_id,
            %incident_type,
            %severity,
            description,
            "safety incident"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use practice_core::model::IncidentType;
    use practice_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, StorageError};

    struct OfflineLog;

    #[async_trait]
    impl IncidentRepository for OfflineLog {
        async fn append_incident(&self, _incident: &SafetyIncident) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn list_incidents(
            &self,
            _user_id: UserId,
            _limit: u32,
        ) -> Result<Vec<SafetyIncident>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    fn incident() -> SafetyIncident {
        SafetyIncident::new(
            UserId::new(1),
            None,
            IncidentType::AdverseEncounter,
            "shadow figure",
            Severity::High,
            fixed_now(),
        )
    }

    #[tokio::test]
    async fn record_appends_and_lists() {
        let service = IncidentService::new(Arc::new(InMemoryRepository::new()));
        let incident = incident();
        assert!(service.record(&incident).await);

        let listed = service.recent(UserId::new(1), 10).await.unwrap();
        assert_eq!(listed, vec![incident]);
    }

    #[tokio::test]
    async fn failed_append_is_reported_not_raised() {
        let service = IncidentService::new(Arc::new(OfflineLog));
        assert!(!service.record(&incident()).await);
        assert!(matches!(
            service.recent(UserId::new(1), 10).await,
            Err(PracticeError::Storage(StorageError::Connection(_)))
        ));
    }
}
