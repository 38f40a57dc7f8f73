use std::sync::Arc;

use practice_core::ChallengeScorer;
use practice_core::model::SessionSettings;
use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::incident_service::IncidentService;
use crate::notifications::NotificationSink;
use crate::practice::PracticeService;
use crate::progress_service::ProgressService;
use crate::timer::TimerEngine;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    practice: Arc<PracticeService>,
    progress: Arc<ProgressService>,
    incidents: Arc<IncidentService>,
}

/// Knobs the app layer may override when wiring services.
#[derive(Clone)]
pub struct AppServicesConfig {
    pub clock: Clock,
    pub settings: SessionSettings,
    pub timer: TimerEngine,
    pub sink: Option<Arc<dyn NotificationSink>>,
    pub scorer: Option<Arc<dyn ChallengeScorer>>,
}

impl AppServicesConfig {
    #[must_use]
    pub fn new(clock: Clock, settings: SessionSettings) -> Self {
        Self {
            clock,
            settings,
            timer: TimerEngine::default(),
            sink: None,
            scorer: None,
        }
    }

    #[must_use]
    pub fn with_timer(mut self, timer: TimerEngine) -> Self {
        self.timer = timer;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn ChallengeScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, config: AppServicesConfig) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, config))
    }

    /// Build services backed by process memory. Nothing survives a restart.
    #[must_use]
    pub fn in_memory(config: AppServicesConfig) -> Self {
        Self::from_storage(&Storage::in_memory(), config)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, config: AppServicesConfig) -> Self {
        let mut progress = ProgressService::new(Arc::clone(&storage.progress));
        if let Some(scorer) = config.scorer {
            progress = progress.with_scorer(scorer);
        }
        let progress = Arc::new(progress);
        let incidents = Arc::new(IncidentService::new(Arc::clone(&storage.incidents)));

        let mut practice = PracticeService::new(
            config.clock,
            config.settings,
            Arc::clone(&progress),
            Arc::clone(&incidents),
        )
        .with_timer(config.timer);
        if let Some(sink) = config.sink {
            practice = practice.with_sink(sink);
        }

        Self {
            practice: Arc::new(practice),
            progress,
            incidents,
        }
    }

    #[must_use]
    pub fn practice(&self) -> Arc<PracticeService> {
        Arc::clone(&self.practice)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn incidents(&self) -> Arc<IncidentService> {
        Arc::clone(&self.incidents)
    }
}
