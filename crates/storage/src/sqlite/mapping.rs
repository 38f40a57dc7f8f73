use practice_core::model::{
    IncidentId, IncidentType, SafetyIncident, SessionId, Severity, UserId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn user_id_to_i64(id: UserId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("user_id overflow".into()))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    u64::try_from(v)
        .map(UserId::new)
        .map_err(|_| StorageError::Serialization("user_id sign overflow".into()))
}

pub(crate) fn parse_incident_type(s: &str) -> Result<IncidentType, StorageError> {
    IncidentType::from_str_opt(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid incident type: {s}")))
}

pub(crate) fn parse_severity(s: &str) -> Result<Severity, StorageError> {
    Severity::from_str_opt(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid severity: {s}")))
}

pub(crate) fn map_incident_row(row: &sqlx::sqlite::SqliteRow) -> Result<SafetyIncident, StorageError> {
    let id: IncidentId = row
        .try_get::<String, _>("id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let user_id = user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?;
    let session_id = row
        .try_get::<Option<String>, _>("session_id")
        .map_err(ser)?
        .map(|raw| raw.parse::<SessionId>().map_err(ser))
        .transpose()?;
    let incident_type =
        parse_incident_type(&row.try_get::<String, _>("incident_type").map_err(ser)?)?;
    let description: String = row.try_get("description").map_err(ser)?;
    let severity = parse_severity(&row.try_get::<String, _>("severity").map_err(ser)?)?;
    let timestamp = row.try_get("occurred_at").map_err(ser)?;

    Ok(SafetyIncident::from_persisted(
        id,
        user_id,
        session_id,
        incident_type,
        description,
        severity,
        timestamp,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_user_id_is_rejected() {
        assert!(user_id_from_i64(-1).is_err());
        assert_eq!(user_id_from_i64(5).unwrap(), UserId::new(5));
    }

    #[test]
    fn oversized_user_id_is_rejected() {
        assert!(user_id_to_i64(UserId::new(u64::MAX)).is_err());
    }

    #[test]
    fn unknown_labels_are_serialization_errors() {
        assert!(matches!(
            parse_incident_type("vortex"),
            Err(StorageError::Serialization(_))
        ));
        assert!(matches!(
            parse_severity("catastrophic"),
            Err(StorageError::Serialization(_))
        ));
    }
}
