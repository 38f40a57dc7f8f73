//! Outbound practice events and the sinks that receive them.

use std::sync::Arc;

use practice_core::EmergencyResponse;
use practice_core::model::{IncidentType, Milestone, SessionId, Technique, UserId};
use tokio::sync::mpsc;

/// Something a caller may want to surface to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PracticeEvent {
    SessionStarted {
        user_id: UserId,
        session_id: SessionId,
        technique: Technique,
        max_duration_secs: u32,
    },
    WarningThresholdReached {
        user_id: UserId,
        session_id: SessionId,
        elapsed_secs: u32,
        remaining_secs: u32,
    },
    SessionCompleted {
        user_id: UserId,
        session_id: SessionId,
        duration_secs: u32,
    },
    EmergencyTriggered {
        user_id: UserId,
        session_id: SessionId,
        incident_type: IncidentType,
        response: EmergencyResponse,
    },
    MilestoneAchieved {
        user_id: UserId,
        milestone: Milestone,
    },
}

impl PracticeEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "sessionStarted",
            Self::WarningThresholdReached { .. } => "warningThresholdReached",
            Self::SessionCompleted { .. } => "sessionCompleted",
            Self::EmergencyTriggered { .. } => "emergencyTriggered",
            Self::MilestoneAchieved { .. } => "milestoneAchieved",
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        match self {
            Self::SessionStarted { user_id, .. }
            | Self::WarningThresholdReached { user_id, .. }
            | Self::SessionCompleted { user_id, .. }
            | Self::EmergencyTriggered { user_id, .. }
            | Self::MilestoneAchieved { user_id, .. } => *user_id,
        }
    }
}

/// Receives practice events. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: PracticeEvent);
}

/// Writes every event to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: PracticeEvent) {
        let name = event.name();
        match event {
            PracticeEvent::SessionStarted {
                user_id,
                session_id,
                technique,
                max_duration_secs,
            } => tracing::info!(
                event = name,
                %user_id,
                %session_id,
                %technique,
                max_duration_secs,
                "practice session started"
            ),
            PracticeEvent::WarningThresholdReached {
                user_id,
                session_id,
                elapsed_secs,
                remaining_secs,
            } => tracing::info!(
                event = name,
                %user_id,
                %session_id,
                elapsed_secs,
                remaining_secs,
                "session nearing its limit"
            ),
            PracticeEvent::SessionCompleted {
                user_id,
                session_id,
                duration_secs,
            } => tracing::info!(
                event = name,
                %user_id,
                %session_id,
                duration_secs,
                "practice session completed"
            ),
            PracticeEvent::EmergencyTriggered {
                user_id,
                session_id,
                incident_type,
                response,
            } => tracing::warn!(
                event = name,
                %user_id,
                %session_id,
                %incident_type,
                steps = response.steps.len(),
                "emergency protocol engaged"
            ),
            PracticeEvent::MilestoneAchieved { user_id, milestone } => tracing::info!(
                event = name,
                %user_id,
                %milestone,
                "milestone achieved"
            ),
        }
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PracticeEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PracticeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: PracticeEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

/// Delivers each event to every inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, event: PracticeEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.notify(event.clone());
            }
            last.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone_event() -> PracticeEvent {
        PracticeEvent::MilestoneAchieved {
            user_id: UserId::new(1),
            milestone: Milestone::FirstSession,
        }
    }

    #[test]
    fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new();
        sink.notify(milestone_event());
        let received = rx.try_recv().expect("event");
        assert_eq!(received.name(), "milestoneAchieved");
        assert_eq!(received.user_id(), UserId::new(1));
    }

    #[test]
    fn channel_sink_ignores_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.notify(milestone_event());
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let (first, mut first_rx) = ChannelSink::new();
        let (second, mut second_rx) = ChannelSink::new();
        let fanout = FanoutSink::default()
            .with(Arc::new(first))
            .with(Arc::new(second))
            .with(Arc::new(TracingSink));
        assert_eq!(fanout.len(), 3);

        fanout.notify(milestone_event());
        assert_eq!(first_rx.try_recv().unwrap(), milestone_event());
        assert_eq!(second_rx.try_recv().unwrap(), milestone_event());
    }
}
