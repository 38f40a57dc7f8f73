//! Pluggable challenge scoring.
//!
//! No scorer here claims to measure real accuracy; the trait exists so a
//! validated scorer can replace these without touching the ledger.

use crate::model::{Accuracy, ChallengeId};

/// Turns a free-text challenge response into an accuracy score.
pub trait ChallengeScorer: Send + Sync {
    fn score(&self, challenge: &ChallengeId, response: &str) -> Accuracy;
}

/// Deterministic scorer: half a point per non-whitespace character, capped at 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthScorer;

impl LengthScorer {
    #[must_use]
    pub fn base_score(response: &str) -> u32 {
        let chars = response.chars().filter(|c| !c.is_whitespace()).count();
        u32::try_from(chars / 2).unwrap_or(u32::MAX)
    }
}

impl ChallengeScorer for LengthScorer {
    fn score(&self, _challenge: &ChallengeId, response: &str) -> Accuracy {
        Accuracy::new(Self::base_score(response))
    }
}

/// Returns the same score for every response. Handy in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer(pub u8);

impl ChallengeScorer for FixedScorer {
    fn score(&self, _challenge: &ChallengeId, _response: &str) -> Accuracy {
        Accuracy::new(u32::from(self.0))
    }
}
