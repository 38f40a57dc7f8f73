use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use practice_core::model::{
    ChallengeId, IncidentType, Milestone, SafetyConditions, SafetyIncident, SafetyProtocol,
    SafetyProtocolSet, Session, SessionId, SessionSettings, SessionStatus, Technique, UserId,
    UserProgressLedger,
};
use practice_core::{
    Clock, SessionController, SessionError, StartRequest, Termination, TickOutcome, safety_gate,
};
use tokio::sync::{Mutex as AsyncMutex, watch};

use super::lock;
use super::progress::SessionProgress;
use super::report::{ChallengeOutcome, SessionReport};
use crate::error::PracticeError;
use crate::incident_service::IncidentService;
use crate::notifications::{NotificationSink, PracticeEvent};
use crate::progress_service::ProgressService;
use crate::timer::{TickFlow, TimerEngine, TimerHandle};

/// Collaborators shared by every practice context a service opens.
#[derive(Clone)]
pub(crate) struct PracticeDeps {
    pub(crate) clock: Clock,
    pub(crate) timer: TimerEngine,
    pub(crate) progress: Arc<ProgressService>,
    pub(crate) incidents: Arc<IncidentService>,
    pub(crate) sink: Arc<dyn NotificationSink>,
}

/// State behind one user's context.
///
/// Locks are always taken in the order timer → controller → ledger → report.
/// `writer` orders ledger saves; the ledger is snapshotted only while holding it.
pub(crate) struct Shared {
    user_id: UserId,
    deps: PracticeDeps,
    timer: Mutex<Option<TimerHandle>>,
    controller: Mutex<SessionController>,
    ledger: Mutex<UserProgressLedger>,
    last_report: Mutex<Option<SessionReport>>,
    writer: AsyncMutex<()>,
    ticks: watch::Sender<SessionProgress>,
    reports: watch::Sender<Option<SessionReport>>,
}

/// A user's practice context: one session at a time plus the progress ledger.
///
/// Cheap to clone; clones share the same session. The session timer runs on
/// the tokio runtime and stops when the last clone is dropped.
#[derive(Clone)]
pub struct PracticeSession {
    shared: Arc<Shared>,
}

impl PracticeSession {
    pub(crate) fn new(
        user_id: UserId,
        settings: SessionSettings,
        ledger: UserProgressLedger,
        deps: PracticeDeps,
    ) -> Self {
        let (ticks, _) = watch::channel(SessionProgress::idle(settings.max_duration_secs()));
        let (reports, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                user_id,
                deps,
                timer: Mutex::new(None),
                controller: Mutex::new(SessionController::new(user_id, settings)),
                ledger: Mutex::new(ledger),
                last_report: Mutex::new(None),
                writer: AsyncMutex::new(()),
                ticks,
                reports,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.shared.user_id
    }

    /// Run the safety gate and, if it passes, start a session and its timer.
    ///
    /// A refusal caused by a missing health clearance is also written to the
    /// safety log.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Session` with `SafetyPreconditionFailure`,
    /// `SessionAlreadyActive`, or `PreviousSessionOpen`.
    pub async fn start_session(
        &self,
        technique: Technique,
        protocols: SafetyProtocolSet,
        conditions: SafetyConditions,
    ) -> Result<SessionProgress, PracticeError> {
        let shared = &self.shared;
        let now = shared.deps.clock.now();
        let request = StartRequest::new(technique, protocols, conditions);

        let started = {
            let mut slot = lock(&shared.timer);
            let mut controller = lock(&shared.controller);
            let started = controller
                .start(request, now)
                .map(|session| (SessionProgress::from_session(session), started_event(session)));
            drop(controller);
            if started.is_ok() {
                *slot = Some(self.spawn_timer());
            }
            started
        };

        match started {
            Ok((progress, event)) => {
                shared.ticks.send_replace(progress.clone());
                shared.deps.sink.notify(event);
                Ok(progress)
            }
            Err(err) => {
                shared.record_gate_denial(&err, now).await;
                Err(err.into())
            }
        }
    }

    /// End the running session normally.
    ///
    /// Returns `None` if there is nothing to end, so repeated calls are harmless.
    /// A session already at its ceiling is escalated as duration-exceeded.
    pub async fn end_session(&self) -> Option<SessionReport> {
        let now = self.shared.deps.clock.now();
        let report = self.shared.halt(|controller| controller.stop(now))?;
        Some(self.shared.commit(report).await)
    }

    /// Escalate the running session and resolve its emergency script.
    ///
    /// Returns `None` if no session is running.
    pub async fn trigger_emergency(
        &self,
        incident_type: IncidentType,
        description: impl Into<String>,
    ) -> Option<SessionReport> {
        let now = self.shared.deps.clock.now();
        let description = description.into();
        let report = self
            .shared
            .halt(move |controller| controller.emergency(incident_type, description, now))?;
        Some(self.shared.commit(report).await)
    }

    /// Score a challenge response and fold it into the ledger.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::EmptyChallengeId` for a blank challenge id.
    pub async fn submit_challenge_response(
        &self,
        challenge_id: ChallengeId,
        response: &str,
        notes: impl Into<String>,
    ) -> Result<ChallengeOutcome, PracticeError> {
        if challenge_id.as_str().trim().is_empty() {
            return Err(PracticeError::EmptyChallengeId);
        }
        let shared = &self.shared;
        let accuracy = shared.deps.progress.score(&challenge_id, response);
        let now = shared.deps.clock.now();

        let (result, new_milestones) = {
            let mut ledger = lock(&shared.ledger);
            let result = ledger.record_challenge(challenge_id, accuracy, notes, now);
            let achieved = ledger.check_milestones();
            (result, achieved)
        };
        tracing::info!(
            user_id = %shared.user_id,
            challenge_id = %result.challenge_id,
            accuracy = result.accuracy.value(),
            completed = result.completed,
            attempts = result.attempts,
            "challenge response recorded"
        );

        let persisted = shared.save_ledger().await;
        shared.announce_milestones(&new_milestones);
        Ok(ChallengeOutcome {
            result,
            new_milestones,
            persisted,
        })
    }

    /// Toggle one required safety protocol for the next start.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ProtocolsLocked` while a session is running.
    pub fn set_protocol(&self, protocol: SafetyProtocol, enabled: bool) -> Result<(), PracticeError> {
        lock(&self.shared.controller).set_protocol(protocol, enabled)?;
        Ok(())
    }

    #[must_use]
    pub fn protocols(&self) -> SafetyProtocolSet {
        *lock(&self.shared.controller).protocols()
    }

    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        lock(&self.shared.controller).settings()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        lock(&self.shared.controller).status()
    }

    /// Latest published progress. After a session ends this keeps its final state.
    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.shared.ticks.borrow().clone()
    }

    /// Snapshot of the in-memory ledger.
    #[must_use]
    pub fn ledger(&self) -> UserProgressLedger {
        lock(&self.shared.ledger).clone()
    }

    /// Report of the most recent session to finish, however it ended.
    ///
    /// Available as soon as the session is counted in the ledger. Until its
    /// incident and ledger writes land, `persisted` reads `false`.
    #[must_use]
    pub fn last_report(&self) -> Option<SessionReport> {
        lock(&self.shared.last_report).clone()
    }

    /// Reports whose storage writes have been attempted, latest only.
    #[must_use]
    pub fn subscribe_reports(&self) -> watch::Receiver<Option<SessionReport>> {
        self.shared.reports.subscribe()
    }

    /// The user's most recent safety incidents, newest first.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Storage` if the log cannot be read.
    pub async fn incidents(&self, limit: u32) -> Result<Vec<SafetyIncident>, PracticeError> {
        self.shared
            .deps
            .incidents
            .recent(self.shared.user_id, limit)
            .await
    }

    /// Progress updates, one per tick plus start and end.
    #[must_use]
    pub fn subscribe_ticks(&self) -> watch::Receiver<SessionProgress> {
        self.shared.ticks.subscribe()
    }

    fn spawn_timer(&self) -> TimerHandle {
        let weak = self.downgrade();
        self.shared
            .deps
            .timer
            .start(move |_elapsed| match weak.upgrade() {
                Some(shared) => shared.on_tick(),
                None => TickFlow::Stop,
            })
    }
}

impl Shared {
    fn on_tick(self: &Arc<Self>) -> TickFlow {
        let now = self.deps.clock.now();
        let (outcome, progress, settled) = {
            let mut controller = lock(&self.controller);
            let outcome = controller.tick(now);
            let progress = controller.session().map(SessionProgress::from_session);
            let settled = match &outcome {
                TickOutcome::Terminated { termination, .. } => {
                    let report = self.settle(termination);
                    controller.close();
                    Some(report)
                }
                _ => None,
            };
            (outcome, progress, settled)
        };

        let Some(progress) = progress else {
            return TickFlow::Stop;
        };
        let session_id = progress.session_id;
        self.ticks.send_replace(progress);

        match outcome {
            TickOutcome::Ignored => TickFlow::Stop,
            TickOutcome::Advanced { .. } => TickFlow::Continue,
            TickOutcome::WarningReached { elapsed, remaining } => {
                if let Some(session_id) = session_id {
                    self.announce_warning(session_id, elapsed, remaining);
                }
                TickFlow::Continue
            }
            TickOutcome::Terminated { warned, .. } => {
                let Some(report) = settled else {
                    return TickFlow::Stop;
                };
                if warned {
                    self.announce_warning(report.session.id(), report.duration_secs(), 0);
                }
                self.announce_end(&report);
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    shared.commit(report).await;
                });
                TickFlow::Stop
            }
        }
    }

    /// Disable the timer, apply a terminal transition, and settle the session
    /// before closing it.
    fn halt<F>(&self, transition: F) -> Option<SessionReport>
    where
        F: FnOnce(&mut SessionController) -> Option<Termination>,
    {
        let mut slot = lock(&self.timer);
        if let Some(timer) = slot.take() {
            timer.stop();
        }
        let mut controller = lock(&self.controller);
        let termination = transition(&mut *controller)?;
        let report = self.settle(&termination);
        controller.close();
        drop(controller);
        drop(slot);

        self.ticks
            .send_replace(SessionProgress::from_session(&report.session));
        self.announce_end(&report);
        Some(report)
    }

    /// Fold a terminal session into the ledger and publish its report.
    ///
    /// Runs under the controller lock, so a session is counted before the
    /// controller lets go of it.
    fn settle(&self, termination: &Termination) -> SessionReport {
        let (ledger, new_milestones) = {
            let mut ledger = lock(&self.ledger);
            ledger.record_session_end(&termination.session);
            let achieved = ledger.check_milestones();
            (ledger.clone(), achieved)
        };
        let report = SessionReport {
            session: termination.session.clone(),
            emergency: termination.emergency,
            incident: termination.incident.clone(),
            new_milestones,
            ledger,
            persisted: false,
        };
        *lock(&self.last_report) = Some(report.clone());
        report
    }

    /// Write a settled session's incident and the ledger, then announce its milestones.
    async fn commit(&self, mut report: SessionReport) -> SessionReport {
        let incident_logged = match &report.incident {
            Some(incident) => self.deps.incidents.record(incident).await,
            None => true,
        };
        let ledger_saved = self.save_ledger().await;
        report.persisted = incident_logged && ledger_saved;

        {
            let mut last = lock(&self.last_report);
            if last
                .as_ref()
                .is_some_and(|last| last.session.id() == report.session.id())
            {
                *last = Some(report.clone());
            }
        }
        self.announce_milestones(&report.new_milestones);
        self.reports.send_replace(Some(report.clone()));
        report
    }

    /// Save the current ledger. Saves run one at a time and each writes the
    /// ledger as it stands once its turn comes, so storage never falls back
    /// to an older copy.
    async fn save_ledger(&self) -> bool {
        let _turn = self.writer.lock().await;
        let ledger = lock(&self.ledger).clone();
        self.deps.progress.persist(self.user_id, &ledger).await
    }

    async fn record_gate_denial(&self, err: &SessionError, now: DateTime<Utc>) {
        let SessionError::SafetyPreconditionFailure { failed } = err else {
            return;
        };
        let names = err.failed_check_names().join(", ");
        tracing::info!(user_id = %self.user_id, failed = %names, "session start refused");

        let Some(severity) = safety_gate::incident_severity(failed) else {
            return;
        };
        let incident = SafetyIncident::new(
            self.user_id,
            None,
            IncidentType::SafetyGateDenied,
            format!("start refused: {names}"),
            severity,
            now,
        );
        self.deps.incidents.record(&incident).await;
    }

    fn announce_warning(&self, session_id: SessionId, elapsed: u32, remaining: u32) {
        self.deps.sink.notify(PracticeEvent::WarningThresholdReached {
            user_id: self.user_id,
            session_id,
            elapsed_secs: elapsed,
            remaining_secs: remaining,
        });
    }

    fn announce_end(&self, report: &SessionReport) {
        let session = &report.session;
        let event = match report.emergency {
            Some(response) => PracticeEvent::EmergencyTriggered {
                user_id: self.user_id,
                session_id: session.id(),
                incident_type: response.incident_type,
                response,
            },
            None => PracticeEvent::SessionCompleted {
                user_id: self.user_id,
                session_id: session.id(),
                duration_secs: session.current_duration_secs(),
            },
        };
        self.deps.sink.notify(event);
    }

    fn announce_milestones(&self, milestones: &[Milestone]) {
        for &milestone in milestones {
            self.deps.sink.notify(PracticeEvent::MilestoneAchieved {
                user_id: self.user_id,
                milestone,
            });
        }
    }
}

fn started_event(session: &Session) -> PracticeEvent {
    PracticeEvent::SessionStarted {
        user_id: session.user_id(),
        session_id: session.id(),
        technique: session.technique().clone(),
        max_duration_secs: session.max_duration_secs(),
    }
}
