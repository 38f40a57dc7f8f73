use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use practice_core::Clock;
use practice_core::model::{SessionSettings, UserId};

use super::lock;
use super::session::{PracticeDeps, PracticeSession, Shared};
use crate::error::PracticeError;
use crate::incident_service::IncidentService;
use crate::notifications::{NotificationSink, TracingSink};
use crate::progress_service::ProgressService;
use crate::timer::TimerEngine;

/// Opens per-user practice contexts.
///
/// At most one live context exists per user; opening the same user again
/// returns a handle to the context that is already open.
pub struct PracticeService {
    settings: SessionSettings,
    deps: PracticeDeps,
    open: Mutex<HashMap<UserId, Weak<Shared>>>,
}

impl PracticeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: SessionSettings,
        progress: Arc<ProgressService>,
        incidents: Arc<IncidentService>,
    ) -> Self {
        Self {
            settings,
            deps: PracticeDeps {
                clock,
                timer: TimerEngine::default(),
                progress,
                incidents,
                sink: Arc::new(TracingSink),
            },
            open: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.deps.sink = sink;
        self
    }

    #[must_use]
    pub fn with_timer(mut self, timer: TimerEngine) -> Self {
        self.deps.timer = timer;
        self
    }

    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Open (or rejoin) the practice context for a user, loading their ledger.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Storage` if the stored ledger cannot be read.
    pub async fn open(&self, user_id: UserId) -> Result<PracticeSession, PracticeError> {
        if let Some(session) = self.live(user_id) {
            return Ok(session);
        }

        let ledger = self.deps.progress.load(user_id).await?;

        let mut open = lock(&self.open);
        open.retain(|_, context| context.strong_count() > 0);
        // Another caller may have opened the user while the ledger was loading.
        if let Some(shared) = open.get(&user_id).and_then(Weak::upgrade) {
            return Ok(PracticeSession::from_shared(shared));
        }

        let session = PracticeSession::new(user_id, self.settings, ledger, self.deps.clone());
        open.insert(user_id, session.downgrade());
        tracing::debug!(
            %user_id,
            total_sessions = session.ledger().total_sessions(),
            "practice context opened"
        );
        Ok(session)
    }

    fn live(&self, user_id: UserId) -> Option<PracticeSession> {
        lock(&self.open)
            .get(&user_id)
            .and_then(Weak::upgrade)
            .map(PracticeSession::from_shared)
    }
}
