use std::sync::{Mutex, PoisonError};

use practice_core::model::{Accuracy, ChallengeId};
use practice_core::{ChallengeScorer, LengthScorer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Length score plus a random bonus of up to `max_jitter` points, capped at 100.
#[derive(Debug)]
pub struct JitteredLengthScorer {
    rng: Mutex<StdRng>,
    max_jitter: u32,
}

impl JitteredLengthScorer {
    pub const DEFAULT_MAX_JITTER: u32 = 30;

    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Reproducible scores for tests and demos.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: u32) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            max_jitter: Self::DEFAULT_MAX_JITTER,
        }
    }
}

impl Default for JitteredLengthScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeScorer for JitteredLengthScorer {
    fn score(&self, _challenge: &ChallengeId, response: &str) -> Accuracy {
        let jitter = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(0..=self.max_jitter);
        Accuracy::new(LengthScorer::base_score(response).saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_stays_within_jitter_band() {
        let scorer = JitteredLengthScorer::seeded(7);
        let id = ChallengeId::new("remote_viewing");
        let response = "x".repeat(40);
        for _ in 0..200 {
            let score = u32::from(scorer.score(&id, &response).value());
            assert!((20..=50).contains(&score), "score {score} out of band");
        }
    }

    #[test]
    fn same_seed_gives_same_scores() {
        let id = ChallengeId::new("symbol");
        let a = JitteredLengthScorer::seeded(42);
        let b = JitteredLengthScorer::seeded(42);
        for _ in 0..20 {
            assert_eq!(a.score(&id, "a square"), b.score(&id, "a square"));
        }
    }

    #[test]
    fn zero_jitter_matches_length_scorer() {
        let id = ChallengeId::new("symbol");
        let scorer = JitteredLengthScorer::seeded(1).with_max_jitter(0);
        assert_eq!(
            scorer.score(&id, "a red door"),
            LengthScorer.score(&id, "a red door")
        );
    }

    #[test]
    fn long_responses_cap_at_100() {
        let id = ChallengeId::new("symbol");
        let scorer = JitteredLengthScorer::seeded(3);
        assert_eq!(scorer.score(&id, &"y".repeat(500)).value(), 100);
    }
}
