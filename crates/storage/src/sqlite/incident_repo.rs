use async_trait::async_trait;
use practice_core::model::{SafetyIncident, UserId};

use super::SqliteRepository;
use super::mapping::{map_incident_row, user_id_to_i64};
use crate::repository::{IncidentRepository, StorageError};

#[async_trait]
impl IncidentRepository for SqliteRepository {
    async fn append_incident(&self, incident: &SafetyIncident) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO safety_incidents (
                    id, seq, user_id, session_id, incident_type,
                    description, severity, occurred_at
                )
                VALUES (
                    ?1,
                    (SELECT COALESCE(MAX(seq), 0) + 1 FROM safety_incidents),
                    ?2, ?3, ?4, ?5, ?6, ?7
                )
                ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(incident.id().to_string())
        .bind(user_id_to_i64(incident.user_id())?)
        .bind(incident.session_id().map(|id| id.to_string()))
        .bind(incident.incident_type().as_str())
        .bind(incident.description())
        .bind(incident.severity().as_str())
        .bind(incident.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn list_incidents(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<SafetyIncident>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, user_id, session_id, incident_type,
                    description, severity, occurred_at
                FROM safety_incidents
                WHERE user_id = ?1
                ORDER BY seq DESC
                LIMIT ?2
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_incident_row).collect()
    }
}
