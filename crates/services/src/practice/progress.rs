use practice_core::model::{Session, SessionId, SessionStatus};
use serde::Serialize;

/// Point-in-time view of the session clock, published on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub session_id: Option<SessionId>,
    pub status: SessionStatus,
    pub elapsed_secs: u32,
    pub max_duration_secs: u32,
    pub remaining_secs: u32,
}

impl SessionProgress {
    #[must_use]
    pub fn idle(max_duration_secs: u32) -> Self {
        Self {
            session_id: None,
            status: SessionStatus::Idle,
            elapsed_secs: 0,
            max_duration_secs,
            remaining_secs: max_duration_secs,
        }
    }

    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: Some(session.id()),
            status: session.status(),
            elapsed_secs: session.current_duration_secs(),
            max_duration_secs: session.max_duration_secs(),
            remaining_secs: session.remaining_secs(),
        }
    }

    /// Whole percent of the ceiling used so far.
    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        if self.max_duration_secs == 0 {
            return 0;
        }
        let pct = u64::from(self.elapsed_secs) * 100 / u64::from(self.max_duration_secs);
        u8::try_from(pct.min(100)).unwrap_or(100)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_progress_has_full_budget() {
        let progress = SessionProgress::idle(600);
        assert_eq!(progress.remaining_secs, 600);
        assert_eq!(progress.percent_complete(), 0);
        assert!(!progress.is_running());
    }

    #[test]
    fn percent_rounds_down() {
        let progress = SessionProgress {
            session_id: None,
            status: SessionStatus::Active,
            elapsed_secs: 2,
            max_duration_secs: 3,
            remaining_secs: 1,
        };
        assert_eq!(progress.percent_complete(), 66);
    }

    #[test]
    fn serializes_for_ui_bridges() {
        let json = serde_json::to_value(SessionProgress::idle(90)).unwrap();
        assert_eq!(json["maxDurationSecs"], 90);
        assert_eq!(json["remainingSecs"], 90);
        assert!(json["sessionId"].is_null());
    }
}
