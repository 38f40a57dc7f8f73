#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod incident_service;
pub mod notifications;
pub mod practice;
pub mod progress_service;
pub mod scoring;
pub mod timer;

pub use practice_core::Clock;

pub use app_services::{AppServices, AppServicesConfig};
pub use error::{AppServicesError, PracticeError};
pub use incident_service::IncidentService;
pub use notifications::{ChannelSink, FanoutSink, NotificationSink, PracticeEvent, TracingSink};
pub use practice::{ChallengeOutcome, PracticeService, PracticeSession, SessionProgress, SessionReport};
pub use progress_service::ProgressService;
pub use scoring::JitteredLengthScorer;
pub use timer::{TickFlow, TimerEngine, TimerHandle};
