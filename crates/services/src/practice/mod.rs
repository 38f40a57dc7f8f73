mod progress;
mod report;
mod session;
mod workflow;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Public API of the practice subsystem.
pub use crate::error::PracticeError;
pub use progress::SessionProgress;
pub use report::{ChallengeOutcome, SessionReport};
pub use session::PracticeSession;
pub use workflow::PracticeService;

/// Session state stays usable after a panicked tick, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
