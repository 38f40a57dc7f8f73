use std::sync::Arc;

use practice_core::model::{Accuracy, ChallengeId, UserId, UserProgressLedger};
use practice_core::{ChallengeScorer, LengthScorer};
use storage::repository::ProgressRepository;

use crate::error::PracticeError;

/// Loads, scores into, and persists per-user progress ledgers.
#[derive(Clone)]
pub struct ProgressService {
    ledgers: Arc<dyn ProgressRepository>,
    scorer: Arc<dyn ChallengeScorer>,
}

impl ProgressService {
    #[must_use]
    pub fn new(ledgers: Arc<dyn ProgressRepository>) -> Self {
        Self {
            ledgers,
            scorer: Arc::new(LengthScorer),
        }
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn ChallengeScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Fetch a user's ledger, or an empty one for a first-time user.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Storage` if the stored ledger cannot be read.
    pub async fn load(&self, user_id: UserId) -> Result<UserProgressLedger, PracticeError> {
        let ledger = self.ledgers.load_ledger(user_id).await?;
        Ok(ledger.unwrap_or_default())
    }

    /// Write the ledger, returning whether it reached storage.
    ///
    /// Failures are logged and swallowed; the in-memory ledger stays authoritative.
    pub async fn persist(&self, user_id: UserId, ledger: &UserProgressLedger) -> bool {
        match self.ledgers.save_ledger(user_id, ledger).await {
            Ok(()) => {
                tracing::debug!(
                    %user_id,
                    total_sessions = ledger.total_sessions(),
                    total_minutes = ledger.total_minutes(),
                    "progress ledger saved"
                );
                true
            }
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "failed to persist progress ledger");
                false
            }
        }
    }

    #[must_use]
    pub fn score(&self, challenge_id: &ChallengeId, response: &str) -> Accuracy {
        self.scorer.score(challenge_id, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::scoring::FixedScorer;
    use practice_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn unknown_user_gets_empty_ledger() {
        let service = ProgressService::new(Arc::new(InMemoryRepository::new()));
        let ledger = service.load(UserId::new(5)).await.unwrap();
        assert_eq!(ledger, UserProgressLedger::new());
    }

    #[tokio::test]
    async fn persisted_ledger_loads_back() {
        let service = ProgressService::new(Arc::new(InMemoryRepository::new()));
        let user = UserId::new(2);
        let mut ledger = UserProgressLedger::new();
        ledger.record_challenge(ChallengeId::new("symbol"), Accuracy::new(80), "", fixed_now());

        assert!(service.persist(user, &ledger).await);
        assert_eq!(service.load(user).await.unwrap(), ledger);
    }

    #[test]
    fn scorer_is_pluggable() {
        let service = ProgressService::new(Arc::new(InMemoryRepository::new()))
            .with_scorer(Arc::new(FixedScorer(64)));
        assert_eq!(
            service.score(&ChallengeId::new("symbol"), "").value(),
            64
        );
    }
}
