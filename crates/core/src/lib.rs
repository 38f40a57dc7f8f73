#![forbid(unsafe_code)]

pub mod controller;
pub mod emergency;
pub mod error;
pub mod model;
pub mod safety_gate;
pub mod scoring;
pub mod time;

pub use controller::{SessionController, StartRequest, Termination, TickOutcome};
pub use emergency::{AutoAction, EmergencyResponse};
pub use error::SessionError;
pub use safety_gate::GateDecision;
pub use scoring::{ChallengeScorer, LengthScorer};
pub use time::Clock;
