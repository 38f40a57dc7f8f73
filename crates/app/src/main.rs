use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use practice_core::model::{
    ChallengeId, IncidentType, SafetyConditions, SafetyProtocol, SafetyProtocolSet, SessionId,
    SessionSettings, Technique, UserId,
};
use practice_core::{ChallengeScorer, LengthScorer};
use services::{
    AppServices, AppServicesConfig, ChannelSink, Clock, FanoutSink, JitteredLengthScorer,
    PracticeEvent, PracticeSession, SessionProgress, SessionReport, TimerEngine, TracingSink,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidMaxDuration { raw: String },
    InvalidTickMillis { raw: String },
    InvalidLimit { raw: String },
    InvalidProtocol { raw: String },
    InvalidDbUrl { raw: String },
    InvalidScorer { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required for this command"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidMaxDuration { raw } => {
                write!(f, "invalid --max-duration value: {raw}")
            }
            ArgsError::InvalidTickMillis { raw } => write!(f, "invalid --tick-millis value: {raw}"),
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
            ArgsError::InvalidProtocol { raw } => write!(f, "unknown safety protocol: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidScorer { raw } => {
                write!(f, "invalid --scorer value: {raw} (expected length or jittered)")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- run        [common] [--technique <name>] [--skip <protocol>]...");
    eprintln!("                                 [--no-health-clearance] [--no-environment]");
    eprintln!("  cargo run -p app -- stats      [common]");
    eprintln!("  cargo run -p app -- incidents  [common] [--limit <n>]");
    eprintln!("  cargo run -p app -- challenge  [common] --id <challenge> --response <text> [--notes <text>]");
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --db <sqlite_url>      default sqlite:practice.sqlite3");
    eprintln!("  --in-memory            keep everything in process memory");
    eprintln!("  --user <id>            default 1");
    eprintln!("  --max-duration <secs>  default 3600");
    eprintln!("  --tick-millis <ms>     default 1000");
    eprintln!("  --scorer <kind>        length (default) or jittered");
    eprintln!();
    eprintln!("While a session runs, type `stop`, `status`, or `emergency <type> [details]`.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PRACTICE_DB_URL, PRACTICE_USER_ID, PRACTICE_MAX_DURATION_SECS, PRACTICE_TICK_MILLIS,");
    eprintln!("  PRACTICE_SCORER");
    eprintln!("  RUST_LOG (default info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Stats,
    Incidents,
    Challenge,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "stats" => Some(Self::Stats),
            "incidents" => Some(Self::Incidents),
            "challenge" => Some(Self::Challenge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScorerKind {
    Length,
    Jittered,
}

impl ScorerKind {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg.trim().to_ascii_lowercase().as_str() {
            "length" => Some(Self::Length),
            "jittered" => Some(Self::Jittered),
            _ => None,
        }
    }

    fn build(self) -> Arc<dyn ChallengeScorer> {
        match self {
            Self::Length => Arc::new(LengthScorer),
            Self::Jittered => Arc::new(JitteredLengthScorer::new()),
        }
    }
}

struct Args {
    db_url: Option<String>,
    user_id: UserId,
    max_duration_secs: u32,
    tick_millis: u64,
    scorer: ScorerKind,
    technique: String,
    protocols: SafetyProtocolSet,
    conditions: SafetyConditions,
    limit: u32,
    challenge_id: Option<String>,
    response: Option<String>,
    notes: String,
}

impl Args {
    fn from_env() -> Self {
        let db_url = std::env::var("PRACTICE_DB_URL")
            .ok()
            .map_or_else(|| "sqlite:practice.sqlite3".into(), normalize_sqlite_url);
        let user_id = env_number("PRACTICE_USER_ID").map_or_else(|| UserId::new(1), UserId::new);
        let max_duration_secs = env_number("PRACTICE_MAX_DURATION_SECS")
            .unwrap_or(SessionSettings::DEFAULT_MAX_DURATION_SECS);
        let tick_millis = env_number("PRACTICE_TICK_MILLIS").unwrap_or(1_000);
        let scorer = std::env::var("PRACTICE_SCORER")
            .ok()
            .and_then(|raw| ScorerKind::from_arg(&raw))
            .unwrap_or(ScorerKind::Length);

        Self {
            db_url: Some(db_url),
            user_id,
            max_duration_secs,
            tick_millis,
            scorer,
            technique: "guided".into(),
            protocols: SafetyProtocolSet::all_enabled(),
            conditions: SafetyConditions::cleared(),
            limit: 20,
            challenge_id: None,
            response: None,
            notes: String::new(),
        }
    }

    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self::from_env();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(normalize_sqlite_url(value));
                }
                "--in-memory" => parsed.db_url = None,
                "--user" => {
                    let value = require_value(args, "--user")?;
                    let id: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                    parsed.user_id = UserId::new(id);
                }
                "--max-duration" => {
                    let value = require_value(args, "--max-duration")?;
                    parsed.max_duration_secs = value
                        .parse()
                        .ok()
                        .filter(|secs| *secs > 0)
                        .ok_or(ArgsError::InvalidMaxDuration { raw: value })?;
                }
                "--tick-millis" => {
                    let value = require_value(args, "--tick-millis")?;
                    parsed.tick_millis = value
                        .parse()
                        .ok()
                        .filter(|ms| *ms > 0)
                        .ok_or(ArgsError::InvalidTickMillis { raw: value })?;
                }
                "--scorer" => {
                    let value = require_value(args, "--scorer")?;
                    parsed.scorer =
                        ScorerKind::from_arg(&value).ok_or(ArgsError::InvalidScorer { raw: value })?;
                }
                "--technique" => parsed.technique = require_value(args, "--technique")?,
                "--skip" => {
                    let value = require_value(args, "--skip")?;
                    let protocol = SafetyProtocol::from_str_opt(&value)
                        .ok_or(ArgsError::InvalidProtocol { raw: value })?;
                    parsed.protocols.set(protocol, false);
                }
                "--no-health-clearance" => parsed.conditions.health_clearance = false,
                "--no-environment" => parsed.conditions.environment_ok = false,
                "--limit" => {
                    let value = require_value(args, "--limit")?;
                    parsed.limit = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?;
                }
                "--id" => parsed.challenge_id = Some(require_value(args, "--id")?),
                "--response" => parsed.response = Some(require_value(args, "--response")?),
                "--notes" => parsed.notes = require_value(args, "--notes")?,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

fn normalize_sqlite_url(raw: String) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("sqlite://") {
        return trimmed.to_owned();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

enum Input {
    Stop,
    Status,
    Emergency {
        incident_type: IncidentType,
        details: String,
    },
    Unknown(String),
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    Some(match word {
        "stop" | "end" => Input::Stop,
        "status" => Input::Status,
        "emergency" => {
            let (label, details) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
            Input::Emergency {
                incident_type: IncidentType::from_label(label),
                details: details.trim().to_owned(),
            }
        }
        other => Input::Unknown(other.to_owned()),
    })
}

async fn run_session(
    session: &PracticeSession,
    events: &mut UnboundedReceiver<PracticeEvent>,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = match session
        .start_session(
            Technique::new(args.technique.clone()),
            args.protocols,
            args.conditions,
        )
        .await
    {
        Ok(progress) => progress,
        Err(err) => {
            if let Some(failed) = err.failed_checks() {
                println!("Session refused. Failed safety checks:");
                for check in failed {
                    println!("  - {check}");
                }
                return Ok(());
            }
            return Err(err.into());
        }
    };
    println!(
        "Session started ({}s limit). Type `stop`, `status`, or `emergency <type> [details]`.",
        started.max_duration_secs
    );

    let ticker = tokio::spawn(print_ticks(session.subscribe_ticks()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let report = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break session.end_session().await;
                };
                match parse_input(&line) {
                    None => {}
                    Some(Input::Stop) => break session.end_session().await,
                    Some(Input::Status) => print_progress(&session.progress()),
                    Some(Input::Emergency { incident_type, details }) => {
                        let details = if details.is_empty() {
                            format!("user reported {incident_type}")
                        } else {
                            details
                        };
                        break session.trigger_emergency(incident_type, details).await;
                    }
                    Some(Input::Unknown(word)) => println!("unknown command: {word}"),
                }
            }
            Some(event) = events.recv() => {
                let ended = match &event {
                    PracticeEvent::SessionCompleted { session_id, .. }
                    | PracticeEvent::EmergencyTriggered { session_id, .. } => Some(*session_id),
                    _ => None,
                };
                render_event(&event);
                if let Some(session_id) = ended {
                    break wait_for_report(session, session_id).await;
                }
            }
        }
    };
    ticker.abort();

    while let Ok(event) = events.try_recv() {
        render_event(&event);
    }
    if let Some(report) = report {
        render_report(&report);
    }
    Ok(())
}

/// Wait for the session's storage writes, falling back to the unsaved report.
async fn wait_for_report(session: &PracticeSession, session_id: SessionId) -> Option<SessionReport> {
    let mut reports = session.subscribe_reports();
    let stored = tokio::time::timeout(
        Duration::from_secs(5),
        reports.wait_for(|report| {
            report
                .as_ref()
                .is_some_and(|report| report.session.id() == session_id)
        }),
    )
    .await;
    match stored {
        Ok(Ok(report)) => report.clone(),
        _ => session.last_report(),
    }
}

async fn print_ticks(mut ticks: tokio::sync::watch::Receiver<SessionProgress>) {
    let mut last_status = ticks.borrow().status;
    while ticks.changed().await.is_ok() {
        let progress = ticks.borrow_and_update().clone();
        if progress.status != last_status || progress.elapsed_secs % 60 == 0 {
            print_progress(&progress);
            last_status = progress.status;
        }
    }
}

fn print_progress(progress: &SessionProgress) {
    println!(
        "[{}] {}s / {}s ({}%), {}s left",
        progress.status,
        progress.elapsed_secs,
        progress.max_duration_secs,
        progress.percent_complete(),
        progress.remaining_secs
    );
}

fn render_event(event: &PracticeEvent) {
    match event {
        PracticeEvent::WarningThresholdReached { remaining_secs, .. } => {
            println!("Approaching the session limit: {remaining_secs}s remaining. Begin your return.");
        }
        PracticeEvent::EmergencyTriggered {
            incident_type,
            response,
            ..
        } => {
            println!("EMERGENCY ({incident_type}). Follow these steps:");
            for (i, step) in response.steps.iter().enumerate() {
                println!("  {}. {step}", i + 1);
            }
            let actions: Vec<&str> = response.auto_actions.iter().map(|a| a.as_str()).collect();
            println!("Automatic actions: {}", actions.join(", "));
        }
        PracticeEvent::SessionCompleted { duration_secs, .. } => {
            println!("Session completed after {duration_secs}s.");
        }
        PracticeEvent::MilestoneAchieved { milestone, .. } => {
            println!("Milestone achieved: {milestone}");
        }
        PracticeEvent::SessionStarted { .. } => {}
    }
}

fn render_report(report: &SessionReport) {
    let ledger = &report.ledger;
    println!(
        "Totals: {} sessions, {} minutes, level {}.",
        ledger.total_sessions(),
        ledger.total_minutes(),
        ledger.level().as_str()
    );
    if !report.persisted {
        println!("Warning: progress could not be saved; it is kept for this run only.");
    }
}

fn show_stats(session: &PracticeSession) {
    let ledger = session.ledger();
    println!("User {}", session.user_id());
    println!("  sessions: {}", ledger.total_sessions());
    println!("  minutes:  {}", ledger.total_minutes());
    println!("  level:    {}", ledger.level().as_str());
    let reached: Vec<&str> = ledger
        .milestones()
        .iter()
        .filter(|(_, reached)| **reached)
        .map(|(name, _)| name.as_str())
        .collect();
    if !reached.is_empty() {
        println!("  milestones: {}", reached.join(", "));
    }
    for result in ledger.challenges().values() {
        println!(
            "  challenge {}: {} after {} attempt(s){}",
            result.challenge_id,
            result.accuracy,
            result.attempts,
            if result.completed { ", completed" } else { "" }
        );
    }
}

async fn show_incidents(session: &PracticeSession, limit: u32) -> Result<(), Box<dyn std::error::Error>> {
    let incidents = session.incidents(limit).await?;
    if incidents.is_empty() {
        println!("No safety incidents recorded.");
    }
    for incident in incidents {
        println!(
            "{} [{}] {}: {}",
            incident.timestamp().format("%Y-%m-%d %H:%M:%S"),
            incident.severity(),
            incident.incident_type(),
            incident.description()
        );
    }
    Ok(())
}

async fn submit_challenge(
    session: &PracticeSession,
    events: &mut UnboundedReceiver<PracticeEvent>,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = args
        .challenge_id
        .clone()
        .ok_or(ArgsError::MissingFlag { flag: "--id" })?;
    let response = args
        .response
        .as_deref()
        .ok_or(ArgsError::MissingFlag { flag: "--response" })?;

    let outcome = session
        .submit_challenge_response(ChallengeId::new(id), response, args.notes.clone())
        .await?;
    println!(
        "Scored {} on attempt {}{}.",
        outcome.result.accuracy,
        outcome.result.attempts,
        if outcome.result.completed { " (completed)" } else { "" }
    );
    while let Ok(event) = events.try_recv() {
        render_event(&event);
    }
    if !outcome.persisted {
        println!("Warning: progress could not be saved.");
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let (cmd, rest) = match argv.first().map(String::as_str) {
        None => (Command::Run, &argv[..]),
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => (Command::Run, &argv[..]),
        Some(first) => {
            let cmd = Command::from_arg(first).ok_or_else(|| {
                eprintln!("unknown subcommand: {first}");
                print_usage();
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
            })?;
            (cmd, &argv[1..])
        }
    };

    let args = Args::parse(&mut rest.iter().cloned()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let settings = SessionSettings::with_max_duration(args.max_duration_secs)?;
    let (channel, mut events) = ChannelSink::new();
    let sink = FanoutSink::default()
        .with(Arc::new(TracingSink))
        .with(Arc::new(channel));
    let config = AppServicesConfig::new(Clock::system(), settings)
        .with_timer(TimerEngine::new(Duration::from_millis(args.tick_millis)))
        .with_sink(Arc::new(sink))
        .with_scorer(args.scorer.build());

    let services = match &args.db_url {
        Some(db_url) => {
            prepare_sqlite_file(db_url)?;
            AppServices::new_sqlite(db_url, config).await?
        }
        None => AppServices::in_memory(config),
    };
    let session = services.practice().open(args.user_id).await?;

    match cmd {
        Command::Run => run_session(&session, &mut events, &args).await,
        Command::Stats => {
            show_stats(&session);
            Ok(())
        }
        Command::Incidents => show_incidents(&session, args.limit).await,
        Command::Challenge => submit_challenge(&session, &mut events, &args).await,
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
