use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use practice_core::SessionError;
use practice_core::model::{
    Accuracy, ChallengeId, IncidentType, Milestone, SafetyCheck, SafetyConditions, SafetyProtocol,
    SafetyProtocolSet, SessionOutcome, SessionSettings, SessionStatus, Severity, Technique,
    UserId, UserProgressLedger,
};
use practice_core::time::fixed_now;
use services::{
    ChannelSink, Clock, IncidentService, PracticeError, PracticeEvent, PracticeService,
    PracticeSession, ProgressService, SessionReport,
};
use storage::repository::{
    IncidentRepository, InMemoryRepository, ProgressRepository, StorageError,
};
use tokio::sync::mpsc::UnboundedReceiver;

const USER: UserId = UserId::new(1);

/// Counts ledger writes and can be told to fail or stall them.
#[derive(Clone, Default)]
struct CountingLedgers {
    inner: InMemoryRepository,
    saves: Arc<AtomicUsize>,
    offline: bool,
    first_save_delay: Option<Duration>,
}

#[async_trait]
impl ProgressRepository for CountingLedgers {
    async fn load_ledger(&self, user_id: UserId) -> Result<Option<UserProgressLedger>, StorageError> {
        self.inner.load_ledger(user_id).await
    }

    async fn save_ledger(
        &self,
        user_id: UserId,
        ledger: &UserProgressLedger,
    ) -> Result<(), StorageError> {
        let earlier = self.saves.fetch_add(1, Ordering::SeqCst);
        if let (0, Some(delay)) = (earlier, self.first_save_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.offline {
            return Err(StorageError::Connection("disk unplugged".into()));
        }
        self.inner.save_ledger(user_id, ledger).await
    }
}

struct Harness {
    service: PracticeService,
    events: UnboundedReceiver<PracticeEvent>,
    ledgers: CountingLedgers,
    log: InMemoryRepository,
}

fn harness_with(max_duration_secs: u32, ledgers: CountingLedgers) -> Harness {
    let log = InMemoryRepository::new();
    let (sink, events) = ChannelSink::new();
    let service = PracticeService::new(
        Clock::fixed(fixed_now()),
        SessionSettings::with_max_duration(max_duration_secs).unwrap(),
        Arc::new(ProgressService::new(Arc::new(ledgers.clone()))),
        Arc::new(IncidentService::new(Arc::new(log.clone()))),
    )
    .with_sink(Arc::new(sink));
    Harness {
        service,
        events,
        ledgers,
        log,
    }
}

fn harness(max_duration_secs: u32) -> Harness {
    harness_with(max_duration_secs, CountingLedgers::default())
}

async fn start(session: &PracticeSession) {
    session
        .start_session(
            Technique::new("monroe"),
            SafetyProtocolSet::all_enabled(),
            SafetyConditions::cleared(),
        )
        .await
        .expect("start");
}

fn drain(events: &mut UnboundedReceiver<PracticeEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    names
}

/// Wait until a finished session's storage writes have been attempted.
async fn wait_for_report(session: &PracticeSession) -> SessionReport {
    let mut reports = session.subscribe_reports();
    let report = tokio::time::timeout(Duration::from_secs(60), reports.wait_for(Option::is_some))
        .await
        .expect("session never reported")
        .expect("report channel open")
        .clone();
    report.expect("report")
}

#[tokio::test(start_paused = true)]
async fn short_session_warns_once_then_completes() {
    let mut h = harness(10);
    let session = h.service.open(USER).await.unwrap();
    start(&session).await;

    tokio::time::sleep(Duration::from_millis(9_500)).await;
    assert_eq!(session.progress().elapsed_secs, 9);
    assert_eq!(session.status(), SessionStatus::Warning);

    let report = session.end_session().await.expect("report");
    assert_eq!(report.outcome(), Some(SessionOutcome::Completed));
    assert_eq!(report.duration_secs(), 9);
    assert_eq!(report.ledger.total_sessions(), 1);
    assert_eq!(report.ledger.total_minutes(), 0);
    assert_eq!(report.new_milestones, vec![Milestone::FirstSession]);
    assert!(report.persisted);
    assert_eq!(session.status(), SessionStatus::Idle);

    let names = drain(&mut h.events);
    assert_eq!(
        names,
        vec![
            "sessionStarted",
            "warningThresholdReached",
            "sessionCompleted",
            "milestoneAchieved"
        ]
    );

    let stored = h.ledgers.load_ledger(USER).await.unwrap().unwrap();
    assert_eq!(stored.total_sessions(), 1);
}

#[tokio::test(start_paused = true)]
async fn ticks_stop_once_the_session_ends() {
    let h = harness(60);
    let session = h.service.open(USER).await.unwrap();
    start(&session).await;

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let report = session.end_session().await.unwrap();
    assert_eq!(report.duration_secs(), 3);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(session.progress().elapsed_secs, 3);
    assert_eq!(session.progress().status, SessionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn reaching_the_ceiling_forces_emergency_termination() {
    let mut h = harness(5);
    let session = h.service.open(USER).await.unwrap();
    start(&session).await;

    tokio::time::sleep(Duration::from_millis(6_500)).await;
    let report = wait_for_report(&session).await;

    assert_eq!(
        report.outcome(),
        Some(SessionOutcome::EmergencyTerminated {
            incident_type: IncidentType::DurationExceeded
        })
    );
    assert_eq!(report.duration_secs(), 5);
    assert!(report.is_emergency());
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.progress().elapsed_secs, 5);
    assert!(session.end_session().await.is_none());

    let incidents = session.incidents(10).await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].incident_type(), IncidentType::DurationExceeded);
    assert_eq!(incidents[0].severity(), Severity::Medium);
    assert_eq!(incidents[0].session_id(), Some(report.session.id()));

    assert!(drain(&mut h.events).contains(&"emergencyTriggered"));
    assert_eq!(h.ledgers.saves.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn ceiling_session_is_counted_before_its_writes_land() {
    let ledgers = CountingLedgers {
        first_save_delay: Some(Duration::from_secs(30)),
        ..CountingLedgers::default()
    };
    let h = harness_with(3, ledgers);
    let session = h.service.open(USER).await.unwrap();
    start(&session).await;

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.ledger().total_sessions(), 1);
    let pending = session.last_report().expect("report before the save lands");
    assert_eq!(pending.duration_secs(), 3);
    assert_eq!(pending.ledger.total_sessions(), 1);
    assert!(!pending.persisted);
    assert!(h.ledgers.load_ledger(USER).await.unwrap().is_none());

    start(&session).await;
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let second = session.end_session().await.expect("report");
    assert_eq!(second.ledger.total_sessions(), 2);
    assert!(second.persisted);

    let stored = h.ledgers.load_ledger(USER).await.unwrap().unwrap();
    assert_eq!(stored.total_sessions(), 2);
    assert_eq!(h.ledgers.saves.load(Ordering::SeqCst), 2);
    assert!(wait_for_report(&session).await.persisted);
}

#[tokio::test(start_paused = true)]
async fn very_short_session_warns_before_its_emergency() {
    let mut h = harness(2);
    let session = h.service.open(USER).await.unwrap();
    start(&session).await;

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let report = wait_for_report(&session).await;
    assert!(report.is_emergency());
    assert_eq!(report.duration_secs(), 2);
    assert_eq!(
        drain(&mut h.events),
        vec![
            "sessionStarted",
            "warningThresholdReached",
            "emergencyTriggered",
            "milestoneAchieved"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_stop_and_emergency_transition_once() {
    let h = harness(600);
    let session = h.service.open(USER).await.unwrap();
    start(&session).await;
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let report = session
        .trigger_emergency(IncidentType::ReturnDifficulty, "limbs feel heavy")
        .await
        .expect("escalated");
    let response = report.emergency.expect("script");
    assert!(!response.steps.is_empty());
    assert_eq!(
        report.incident.as_ref().map(|i| i.severity()),
        Some(Severity::High)
    );

    assert!(
        session
            .trigger_emergency(IncidentType::ReturnDifficulty, "again")
            .await
            .is_none()
    );
    assert!(session.end_session().await.is_none());

    assert_eq!(h.ledgers.saves.load(Ordering::SeqCst), 1);
    assert_eq!(session.ledger().total_sessions(), 1);
    assert_eq!(session.incidents(10).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn storage_failure_keeps_the_outcome() {
    let ledgers = CountingLedgers {
        offline: true,
        ..CountingLedgers::default()
    };
    let h = harness_with(600, ledgers);
    let session = h.service.open(USER).await.unwrap();
    start(&session).await;
    tokio::time::sleep(Duration::from_millis(125_500)).await;

    let report = session.end_session().await.expect("report");
    assert!(!report.persisted);
    assert_eq!(report.outcome(), Some(SessionOutcome::Completed));
    assert_eq!(session.ledger().total_sessions(), 1);
    assert_eq!(session.ledger().total_minutes(), 2);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_without_touching_the_session() {
    let h = harness(600);
    let session = h.service.open(USER).await.unwrap();
    start(&session).await;
    tokio::time::sleep(Duration::from_millis(4_500)).await;

    let err = session
        .start_session(
            Technique::new("gateway"),
            SafetyProtocolSet::all_enabled(),
            SafetyConditions::cleared(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PracticeError::Session(SessionError::SessionAlreadyActive { .. })
    ));
    assert_eq!(session.progress().elapsed_secs, 4);
    assert_eq!(session.status(), SessionStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn reopening_a_user_joins_the_live_context() {
    let h = harness(600);
    let first = h.service.open(USER).await.unwrap();
    start(&first).await;

    let second = h.service.open(USER).await.unwrap();
    assert_eq!(second.status(), SessionStatus::Active);
    let again = second
        .start_session(
            Technique::new("monroe"),
            SafetyProtocolSet::all_enabled(),
            SafetyConditions::cleared(),
        )
        .await;
    assert!(again.is_err());

    assert!(second.end_session().await.is_some());
    assert!(first.end_session().await.is_none());
}

#[tokio::test]
async fn missing_health_clearance_is_refused_and_logged() {
    let h = harness(600);
    let session = h.service.open(USER).await.unwrap();

    let err = session
        .start_session(
            Technique::new("monroe"),
            SafetyProtocolSet::all_enabled(),
            SafetyConditions::new(false, true),
        )
        .await
        .unwrap_err();
    assert_eq!(err.failed_checks(), Some(&[SafetyCheck::HealthClearance][..]));
    assert_eq!(session.status(), SessionStatus::Idle);

    let incidents = session.incidents(10).await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].incident_type(), IncidentType::SafetyGateDenied);
    assert_eq!(incidents[0].severity(), Severity::Medium);
    assert_eq!(incidents[0].session_id(), None);
}

#[tokio::test]
async fn protocol_only_refusal_is_not_an_incident() {
    let mut h = harness(600);
    let session = h.service.open(USER).await.unwrap();
    let protocols = SafetyProtocolSet::all_enabled().with(SafetyProtocol::Grounding, false);

    let err = session
        .start_session(Technique::new("monroe"), protocols, SafetyConditions::cleared())
        .await
        .unwrap_err();
    assert_eq!(
        err.failed_checks(),
        Some(&[SafetyCheck::Protocol(SafetyProtocol::Grounding)][..])
    );
    assert!(session.incidents(10).await.unwrap().is_empty());
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn protocols_are_locked_while_running() {
    let h = harness(600);
    let session = h.service.open(USER).await.unwrap();
    start(&session).await;

    assert!(matches!(
        session.set_protocol(SafetyProtocol::Grounding, false),
        Err(PracticeError::Session(SessionError::ProtocolsLocked))
    ));
    session.end_session().await.unwrap();
    session
        .set_protocol(SafetyProtocol::Grounding, false)
        .expect("unlocked when idle");
    assert!(!session.protocols().is_enabled(SafetyProtocol::Grounding));
}

#[tokio::test]
async fn challenge_responses_update_and_persist_the_ledger() {
    let mut h = harness(600);
    let session = h.service.open(USER).await.unwrap();
    let id = ChallengeId::new("remote_viewing");

    let outcome = session
        .submit_challenge_response(id.clone(), &"a".repeat(120), "saw a lighthouse")
        .await
        .unwrap();
    assert_eq!(outcome.result.accuracy.value(), 60);
    assert!(outcome.result.completed);
    assert_eq!(outcome.new_milestones, vec![Milestone::FirstChallenge]);
    assert!(outcome.persisted);

    let retry = session
        .submit_challenge_response(id.clone(), "short", "")
        .await
        .unwrap();
    assert_eq!(retry.result.attempts, 2);
    assert!(!retry.result.completed);
    assert!(retry.new_milestones.is_empty());
    assert!(session.ledger().has_milestone(Milestone::FirstChallenge));

    let stored = h.ledgers.load_ledger(USER).await.unwrap().unwrap();
    assert_eq!(stored.challenge(&id).unwrap().attempts, 2);
    assert_eq!(drain(&mut h.events), vec!["milestoneAchieved"]);
}

#[tokio::test(start_paused = true)]
async fn overlapping_challenge_saves_keep_the_newest_ledger() {
    let ledgers = CountingLedgers {
        first_save_delay: Some(Duration::from_millis(500)),
        ..CountingLedgers::default()
    };
    let h = harness_with(600, ledgers);
    let session = h.service.open(USER).await.unwrap();

    let (first, second) = tokio::join!(
        session.submit_challenge_response(ChallengeId::new("symbol"), "a circle", ""),
        session.submit_challenge_response(ChallengeId::new("color"), "violet", ""),
    );
    assert!(first.unwrap().persisted);
    assert!(second.unwrap().persisted);

    let stored = h.ledgers.load_ledger(USER).await.unwrap().unwrap();
    assert_eq!(stored.challenges().len(), 2);
    assert_eq!(stored, session.ledger());
    assert_eq!(h.ledgers.saves.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn blank_challenge_id_is_rejected() {
    let h = harness(600);
    let session = h.service.open(USER).await.unwrap();
    assert!(matches!(
        session
            .submit_challenge_response(ChallengeId::new("  "), "anything", "")
            .await,
        Err(PracticeError::EmptyChallengeId)
    ));
    assert_eq!(h.ledgers.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn tick_subscribers_follow_the_clock() {
    let h = harness(600);
    let session = h.service.open(USER).await.unwrap();
    let mut ticks = session.subscribe_ticks();
    assert_eq!(ticks.borrow_and_update().status, SessionStatus::Idle);

    start(&session).await;
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(ticks.has_changed().unwrap());
    let latest = ticks.borrow_and_update().clone();
    assert_eq!(latest.elapsed_secs, 2);
    assert_eq!(latest.remaining_secs, 598);
    assert!(latest.is_running());
}

#[tokio::test]
async fn reopened_context_loads_the_stored_ledger() {
    let h = harness(600);
    let mut ledger = UserProgressLedger::new();
    ledger.record_challenge(
        ChallengeId::new("symbol"),
        Accuracy::new(90),
        "",
        fixed_now(),
    );
    h.ledgers.save_ledger(USER, &ledger).await.unwrap();

    let session = h.service.open(USER).await.unwrap();
    assert_eq!(session.ledger(), ledger);
    assert!(h.log.list_incidents(USER, 10).await.unwrap().is_empty());
}
