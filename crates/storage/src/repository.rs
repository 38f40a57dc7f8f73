use async_trait::async_trait;
use practice_core::model::{SafetyIncident, UserId, UserProgressLedger};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Serialized form of a ledger, as stored under a user key.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the ledger cannot be encoded.
pub fn encode_ledger(ledger: &UserProgressLedger) -> Result<String, StorageError> {
    serde_json::to_string(ledger).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Parses a stored ledger value.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the value is not a valid ledger document.
pub fn decode_ledger(raw: &str) -> Result<UserProgressLedger, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Key-value store of per-user progress ledgers.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the ledger for a user, `None` if the user has never finished a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be read or decoded.
    async fn load_ledger(&self, user_id: UserId) -> Result<Option<UserProgressLedger>, StorageError>;

    /// Persist (insert or replace) the ledger for a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the ledger cannot be stored.
    async fn save_ledger(
        &self,
        user_id: UserId,
        ledger: &UserProgressLedger,
    ) -> Result<(), StorageError>;
}

/// Append-only safety incident log.
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// Append one incident.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if an incident with the same id exists,
    /// or other storage errors.
    async fn append_incident(&self, incident: &SafetyIncident) -> Result<(), StorageError>;

    /// List a user's incidents, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the log cannot be read.
    async fn list_incidents(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<SafetyIncident>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Ledgers are kept in their serialized form so the in-memory store exercises
/// the same encoding as durable backends.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    ledgers: Arc<Mutex<HashMap<UserId, String>>>,
    incidents: Arc<Mutex<Vec<SafetyIncident>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_ledger(&self, user_id: UserId) -> Result<Option<UserProgressLedger>, StorageError> {
        let guard = self
            .ledgers
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&user_id).map(|raw| decode_ledger(raw)).transpose()
    }

    async fn save_ledger(
        &self,
        user_id: UserId,
        ledger: &UserProgressLedger,
    ) -> Result<(), StorageError> {
        let encoded = encode_ledger(ledger)?;
        let mut guard = self
            .ledgers
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(user_id, encoded);
        Ok(())
    }
}

#[async_trait]
impl IncidentRepository for InMemoryRepository {
    async fn append_incident(&self, incident: &SafetyIncident) -> Result<(), StorageError> {
        let mut guard = self
            .incidents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.iter().any(|existing| existing.id() == incident.id()) {
            return Err(StorageError::Conflict);
        }
        guard.push(incident.clone());
        Ok(())
    }

    async fn list_incidents(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<SafetyIncident>, StorageError> {
        let guard = self
            .incidents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard
            .iter()
            .rev()
            .filter(|incident| incident.user_id() == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Aggregates the persistence ports behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub incidents: Arc<dyn IncidentRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let incidents: Arc<dyn IncidentRepository> = Arc::new(repo);
        Self {
            progress,
            incidents,
        }
    }
}
