use progress_events::{NormalizedProgressEvent, Phase, TransactionDescriptor};

use crate::error::SessionFailure;
use crate::session::SessionState;

/// Read-only view of a session, published after every transition.
///
/// Every derived value comes from the latest event alone; fields are never merged across the
/// event history.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
    pub intent_id: Option<String>,
    pub state: SessionState,
    pub events: Vec<NormalizedProgressEvent>,
    pub reconnect_attempts: u32,
    pub failure: Option<SessionFailure>,
    pub transport_open: bool,
}

impl TrackerSnapshot {
    /// The view of a tracker that is not following any intent.
    pub fn idle() -> Self {
        Self {
            intent_id: None,
            state: SessionState::Idle,
            events: Vec::new(),
            reconnect_attempts: 0,
            failure: None,
            transport_open: false,
        }
    }

    pub fn latest_event(&self) -> Option<&NormalizedProgressEvent> {
        self.events.last()
    }

    pub fn is_connected(&self) -> bool {
        match self.state {
            SessionState::Connected => true,
            SessionState::Terminated(_) => self.transport_open,
            _ => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.latest_event()
            .is_some_and(NormalizedProgressEvent::is_complete)
    }

    pub fn has_error(&self) -> bool {
        self.failure.is_some()
            || self
                .latest_event()
                .is_some_and(NormalizedProgressEvent::is_error)
    }

    pub fn progress(&self) -> f64 {
        self.latest_event().map_or(0.0, |event| event.progress)
    }

    pub fn current_step(&self) -> Option<Phase> {
        self.latest_event().and_then(|event| event.current_step)
    }

    /// Human-readable error; a producer-reported error wins over a controller failure.
    pub fn error(&self) -> Option<String> {
        let reported = self
            .latest_event()
            .and_then(|event| event.error.as_ref())
            .map(|error| error.message.clone());
        reported.or_else(|| self.failure.as_ref().map(ToString::to_string))
    }

    pub fn transactions(&self) -> Option<&[TransactionDescriptor]> {
        self.latest_event()
            .and_then(|event| event.transactions.as_deref())
    }
}

impl Default for TrackerSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}
