//! Repeating tick source for a running session.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Returned by the tick callback to keep or end the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

#[derive(Debug)]
struct TickGate {
    running: bool,
    elapsed: u64,
}

/// Spawns one tick per period onto the tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct TimerEngine {
    period: Duration,
}

impl TimerEngine {
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

    /// Periods shorter than a millisecond are raised to one millisecond.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts delivering ticks to `on_tick`, first one after a full period.
    ///
    /// The callback receives the number of ticks delivered so far, including
    /// the current one. Missed periods are delivered back to back so the count
    /// tracks wall time. Must be called from within a tokio runtime.
    pub fn start<F>(&self, on_tick: F) -> TimerHandle
    where
        F: FnMut(u64) -> TickFlow + Send + 'static,
    {
        let gate = Arc::new(Mutex::new(TickGate {
            running: true,
            elapsed: 0,
        }));
        let task_gate = Arc::clone(&gate);
        let period = self.period;

        let task = tokio::spawn(async move {
            let mut on_tick = on_tick;
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                if !deliver(&task_gate, &mut on_tick) {
                    break;
                }
            }
        });

        TimerHandle { gate, task }
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERIOD)
    }
}

/// Runs one callback under the gate. Returns whether the timer keeps going.
fn deliver<F>(gate: &Mutex<TickGate>, on_tick: &mut F) -> bool
where
    F: FnMut(u64) -> TickFlow,
{
    let Ok(mut gate) = gate.lock() else {
        return false;
    };
    if !gate.running {
        return false;
    }
    gate.elapsed += 1;
    if on_tick(gate.elapsed) == TickFlow::Stop {
        gate.running = false;
    }
    gate.running
}

/// Owner of a running timer. Dropping it stops the timer.
#[derive(Debug)]
pub struct TimerHandle {
    gate: Arc<Mutex<TickGate>>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Disables delivery before returning.
    ///
    /// Waits for a callback already in flight, so it must not be called from
    /// inside the tick callback; return `TickFlow::Stop` there instead.
    pub fn stop(&self) {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running = false;
        self.task.abort();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.gate
            .lock()
            .map(|gate| gate.running)
            .unwrap_or(false)
    }

    /// Ticks delivered so far.
    #[must_use]
    pub fn elapsed(&self) -> u64 {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        // The last owner may be released from inside the callback, so never block here.
        if let Ok(mut gate) = self.gate.try_lock() {
            gate.running = false;
        }
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting(count: &Arc<AtomicU64>) -> impl FnMut(u64) -> TickFlow + Send + 'static {
        let count = Arc::clone(count);
        move |elapsed| {
            count.store(elapsed, Ordering::SeqCst);
            TickFlow::Continue
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_one_tick_per_period() {
        let count = Arc::new(AtomicU64::new(0));
        let handle = TimerEngine::default().start(counting(&count));

        time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(handle.elapsed(), 3);
        assert!(handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn no_ticks_after_stop() {
        let count = Arc::new(AtomicU64::new(0));
        let handle = TimerEngine::default().start(counting(&count));

        time::sleep(Duration::from_millis(2_500)).await;
        handle.stop();
        assert!(!handle.is_running());

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_can_end_the_timer() {
        let count = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&count);
        let handle = TimerEngine::new(Duration::from_millis(100)).start(move |elapsed| {
            seen.store(elapsed, Ordering::SeqCst);
            if elapsed == 4 {
                TickFlow::Stop
            } else {
                TickFlow::Continue
            }
        });

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_delivery() {
        let count = Arc::new(AtomicU64::new(0));
        let handle = TimerEngine::default().start(counting(&count));
        time::sleep(Duration::from_millis(1_500)).await;
        drop(handle);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_period_is_raised() {
        assert_eq!(
            TimerEngine::new(Duration::ZERO).period(),
            Duration::from_millis(1)
        );
    }
}
