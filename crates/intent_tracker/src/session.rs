//! Connection lifecycle of one tracked intent.
//!
//! [`StreamSession`] is a synchronous state machine. Every input (start, transport
//! notifications, timer expiry, manual close/reconnect) mutates the session and returns the
//! [`SessionAction`]s the owner must carry out. The async driver in [`crate::tracker`] is the
//! only executor; keeping I/O out of this type makes every transition deterministic to test.

use std::time::Duration;

use progress_events::{
    normalize, validate_normalized, validate_raw, NormalizedProgressEvent, ValidationError,
};
use tracing::{debug, info, warn};

use crate::config::SessionPolicy;
use crate::error::{SessionFailure, TrackerError};
use crate::snapshot::TrackerSnapshot;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TerminalOutcome {
    Complete,
    Error,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Terminated(TerminalOutcome),
    Closed,
}

/// Identifies one opened transport; notifications from older connections are ignored.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ConnectionId(u64);

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionAction {
    OpenTransport { connection: ConnectionId },
    ReleaseTransport,
    ScheduleReconnect { delay: Duration },
    ScheduleClose { delay: Duration },
    CancelTimers,
}

#[derive(Debug, Clone)]
pub enum MessageOutcome {
    Appended { terminal: bool },
    Dropped(ValidationError),
    /// Arrived from a superseded connection or after the outcome was already known.
    Ignored,
}

#[derive(Debug)]
pub struct StreamSession {
    intent_id: String,
    policy: SessionPolicy,
    state: SessionState,
    events: Vec<NormalizedProgressEvent>,
    reconnect_attempts: u32,
    failure: Option<SessionFailure>,
    terminal: bool,
    reconnect_pending: bool,
    transport: Option<ConnectionId>,
    next_connection: u64,
    dropped_payloads: u64,
}

impl StreamSession {
    pub fn new(intent_id: impl Into<String>, policy: SessionPolicy) -> Self {
        Self {
            intent_id: intent_id.into(),
            policy,
            state: SessionState::Idle,
            events: Vec::new(),
            reconnect_attempts: 0,
            failure: None,
            terminal: false,
            reconnect_pending: false,
            transport: None,
            next_connection: 0,
            dropped_payloads: 0,
        }
    }

    pub fn intent_id(&self) -> &str {
        &self.intent_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn events(&self) -> &[NormalizedProgressEvent] {
        &self.events
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        self.failure.as_ref()
    }

    /// Whether a `complete`/`error` event has been recorded.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    pub fn current_connection(&self) -> Option<ConnectionId> {
        self.transport
    }

    pub fn dropped_payloads(&self) -> u64 {
        self.dropped_payloads
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            intent_id: Some(self.intent_id.clone()),
            state: self.state,
            events: self.events.clone(),
            reconnect_attempts: self.reconnect_attempts,
            failure: self.failure.clone(),
            transport_open: self.transport.is_some(),
        }
    }

    /// Opens the transport unless one is already held, a reconnect is being set up, or the
    /// outcome is already known.
    pub fn start(&mut self) -> Result<Vec<SessionAction>, TrackerError> {
        if self.is_closed() {
            return Err(TrackerError::SessionClosed);
        }
        if self.state != SessionState::Idle
            || self.transport.is_some()
            || self.reconnect_pending
            || self.terminal
        {
            debug!(intent_id = %self.intent_id, state = ?self.state, "start ignored; session already active");
            return Ok(Vec::new());
        }
        Ok(self.open_transport())
    }

    pub fn on_open(&mut self, connection: ConnectionId) -> Vec<SessionAction> {
        if !self.is_current(connection) {
            return Vec::new();
        }
        if self.state == SessionState::Connecting {
            debug!(intent_id = %self.intent_id, "progress stream connected");
            self.state = SessionState::Connected;
            self.reconnect_attempts = 0;
            self.failure = None;
        }
        Vec::new()
    }

    pub fn on_message(
        &mut self,
        connection: ConnectionId,
        body: &str,
    ) -> (MessageOutcome, Vec<SessionAction>) {
        if !self.is_current(connection) || self.terminal {
            return (MessageOutcome::Ignored, Vec::new());
        }
        match self.state {
            SessionState::Connecting => {
                // Some transports deliver data without a distinct open notification.
                self.on_open(connection);
            }
            SessionState::Connected => {}
            _ => return (MessageOutcome::Ignored, Vec::new()),
        }

        let accepted = validate_raw(body)
            .map(|raw| normalize(&raw, &self.intent_id))
            .and_then(validate_normalized);
        let event = match accepted {
            Ok(event) => event,
            Err(err) => {
                self.dropped_payloads += 1;
                warn!(intent_id = %self.intent_id, kind = ?err.kind, reason = %err.reason, "dropping progress payload");
                return (MessageOutcome::Dropped(err), Vec::new());
            }
        };

        let outcome = if event.is_complete() {
            Some(TerminalOutcome::Complete)
        } else if event.is_error() {
            Some(TerminalOutcome::Error)
        } else {
            None
        };
        self.events.push(event);

        let Some(outcome) = outcome else {
            return (MessageOutcome::Appended { terminal: false }, Vec::new());
        };
        info!(intent_id = %self.intent_id, ?outcome, "intent reached terminal state");
        self.terminal = true;
        self.state = SessionState::Terminated(outcome);
        (
            MessageOutcome::Appended { terminal: true },
            vec![SessionAction::ScheduleClose {
                delay: self.policy.terminal_grace,
            }],
        )
    }

    pub fn on_transport_error(
        &mut self,
        connection: ConnectionId,
        reason: &str,
    ) -> Vec<SessionAction> {
        if !self.is_current(connection) || self.is_closed() {
            return Vec::new();
        }
        if self.terminal {
            debug!(intent_id = %self.intent_id, reason, "ignoring transport error after terminal event");
            return Vec::new();
        }
        if self.reconnect_pending {
            return Vec::new();
        }

        self.transport = None;
        let mut actions = vec![SessionAction::ReleaseTransport];
        if self.reconnect_attempts < self.policy.max_reconnect_attempts {
            warn!(
                intent_id = %self.intent_id,
                attempt = self.reconnect_attempts + 1,
                max = self.policy.max_reconnect_attempts,
                reason,
                "progress stream failed; scheduling reconnect"
            );
            self.state = SessionState::Reconnecting;
            self.reconnect_pending = true;
            actions.push(SessionAction::ScheduleReconnect {
                delay: self.policy.reconnect_delay,
            });
        } else {
            warn!(intent_id = %self.intent_id, attempts = self.reconnect_attempts, reason, "giving up on progress stream");
            self.failure = Some(SessionFailure::ReconnectExhausted {
                attempts: self.reconnect_attempts,
                last_error: reason.to_string(),
            });
            self.state = SessionState::Terminated(TerminalOutcome::Error);
            actions.push(SessionAction::ScheduleClose {
                delay: self.policy.terminal_grace,
            });
        }
        actions
    }

    pub fn on_reconnect_due(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::Reconnecting || !self.reconnect_pending {
            return Vec::new();
        }
        self.reconnect_pending = false;
        self.reconnect_attempts += 1;
        debug!(intent_id = %self.intent_id, attempt = self.reconnect_attempts, "reconnecting progress stream");
        self.open_transport()
    }

    pub fn on_grace_elapsed(&mut self) -> Vec<SessionAction> {
        match self.state {
            SessionState::Terminated(_) => self.close(),
            _ => Vec::new(),
        }
    }

    /// Idempotent; valid from every state.
    pub fn close(&mut self) -> Vec<SessionAction> {
        if self.is_closed() {
            return Vec::new();
        }
        debug!(intent_id = %self.intent_id, "closing progress session");
        self.state = SessionState::Closed;
        self.reconnect_pending = false;
        let mut actions = vec![SessionAction::CancelTimers];
        if self.transport.take().is_some() {
            actions.push(SessionAction::ReleaseTransport);
        }
        actions
    }

    /// Discards everything observed so far and connects again for the same intent.
    pub fn reconnect(&mut self) -> Result<Vec<SessionAction>, TrackerError> {
        if self.is_closed() {
            return Err(TrackerError::SessionClosed);
        }
        let mut actions = vec![SessionAction::CancelTimers];
        if self.transport.take().is_some() {
            actions.push(SessionAction::ReleaseTransport);
        }
        self.events.clear();
        self.failure = None;
        self.terminal = false;
        self.reconnect_attempts = 0;
        self.reconnect_pending = false;
        self.state = SessionState::Idle;
        actions.extend(self.start()?);
        Ok(actions)
    }

    fn open_transport(&mut self) -> Vec<SessionAction> {
        self.next_connection += 1;
        let connection = ConnectionId(self.next_connection);
        self.transport = Some(connection);
        self.state = SessionState::Connecting;
        vec![SessionAction::OpenTransport { connection }]
    }

    fn is_current(&self, connection: ConnectionId) -> bool {
        self.transport == Some(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StreamSession {
        StreamSession::new("intent-1", SessionPolicy::default())
    }

    fn opened(session: &mut StreamSession) -> ConnectionId {
        let actions = session.start().unwrap();
        let [SessionAction::OpenTransport { connection }] = actions[..] else {
            panic!("expected a single open, got {actions:?}");
        };
        session.on_open(connection);
        connection
    }

    #[test]
    fn start_opens_once() {
        let mut session = session();
        let conn = opened(&mut session);
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.start().unwrap().is_empty());
        assert_eq!(session.current_connection(), Some(conn));
    }

    #[test]
    fn malformed_messages_are_dropped_without_state_change() {
        let mut session = session();
        let conn = opened(&mut session);
        let (outcome, actions) = session.on_message(conn, "<html>");
        assert!(matches!(outcome, MessageOutcome::Dropped(ref err) if err.is_parse()));
        assert!(actions.is_empty());
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.events().is_empty());
        assert_eq!(session.dropped_payloads(), 1);
    }

    #[test]
    fn terminal_event_schedules_grace_close() {
        let mut session = session();
        let conn = opened(&mut session);
        let (outcome, actions) = session.on_message(conn, r#"{"type":"error","error":"boom"}"#);
        assert!(matches!(outcome, MessageOutcome::Appended { terminal: true }));
        assert_eq!(
            actions,
            vec![SessionAction::ScheduleClose {
                delay: Duration::from_millis(5000)
            }]
        );
        assert_eq!(session.state(), SessionState::Terminated(TerminalOutcome::Error));

        let (outcome, _) = session.on_message(conn, r#"{"type":"parsing"}"#);
        assert!(matches!(outcome, MessageOutcome::Ignored));
        assert_eq!(session.events().len(), 1);

        let actions = session.on_grace_elapsed();
        assert_eq!(
            actions,
            vec![SessionAction::CancelTimers, SessionAction::ReleaseTransport]
        );
        assert!(session.is_closed());
    }

    #[test]
    fn transport_errors_after_terminal_event_are_ignored() {
        let mut session = session();
        let conn = opened(&mut session);
        session.on_message(conn, r#"{"type":"complete"}"#);
        assert!(session.on_transport_error(conn, "reset").is_empty());
        assert_eq!(session.reconnect_attempts(), 0);
        assert_eq!(session.current_connection(), Some(conn));
    }

    #[test]
    fn reconnects_are_bounded() {
        let mut session = session();
        let mut conn = opened(&mut session);
        for attempt in 1..=3 {
            let actions = session.on_transport_error(conn, "refused");
            assert_eq!(
                actions,
                vec![
                    SessionAction::ReleaseTransport,
                    SessionAction::ScheduleReconnect {
                        delay: Duration::from_millis(2000)
                    }
                ]
            );
            assert_eq!(session.state(), SessionState::Reconnecting);
            let actions = session.on_reconnect_due();
            let [SessionAction::OpenTransport { connection }] = actions[..] else {
                panic!("expected reopen, got {actions:?}");
            };
            assert_eq!(session.reconnect_attempts(), attempt);
            conn = connection;
        }

        let actions = session.on_transport_error(conn, "refused");
        assert_eq!(
            actions,
            vec![
                SessionAction::ReleaseTransport,
                SessionAction::ScheduleClose {
                    delay: Duration::from_millis(5000)
                }
            ]
        );
        assert_eq!(session.state(), SessionState::Terminated(TerminalOutcome::Error));
        let failure = session.failure().unwrap().to_string();
        assert!(failure.contains("3 reconnect attempts"), "{failure}");
    }

    #[test]
    fn successful_open_resets_attempts() {
        let mut session = session();
        let conn = opened(&mut session);
        session.on_transport_error(conn, "reset");
        let actions = session.on_reconnect_due();
        let [SessionAction::OpenTransport { connection }] = actions[..] else {
            panic!("expected reopen");
        };
        assert_eq!(session.reconnect_attempts(), 1);
        session.on_open(connection);
        assert_eq!(session.reconnect_attempts(), 0);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn duplicate_errors_while_reconnect_pending_do_not_double_schedule() {
        let mut session = session();
        let conn = opened(&mut session);
        assert_eq!(session.on_transport_error(conn, "a").len(), 2);
        assert!(session.on_transport_error(conn, "b").is_empty());
        assert!(session.start().unwrap().is_empty());
        assert!(session.reconnect_pending());
    }

    #[test]
    fn stale_connections_are_ignored() {
        let mut session = session();
        let old = opened(&mut session);
        session.reconnect().unwrap();
        let (outcome, _) = session.on_message(old, r#"{"type":"parsing"}"#);
        assert!(matches!(outcome, MessageOutcome::Ignored));
        assert!(session.on_transport_error(old, "late").is_empty());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn manual_reconnect_resets_everything() {
        let mut session = session();
        let conn = opened(&mut session);
        session.on_message(conn, r#"{"type":"parsing","progress":0.2}"#);
        session.on_message(conn, r#"{"type":"complete"}"#);
        assert!(session.is_terminal());

        let actions = session.reconnect().unwrap();
        assert_eq!(actions[0], SessionAction::CancelTimers);
        assert_eq!(actions[1], SessionAction::ReleaseTransport);
        assert!(matches!(actions[2], SessionAction::OpenTransport { .. }));
        assert!(session.events().is_empty());
        assert!(session.failure().is_none());
        assert!(!session.is_terminal());
        assert_eq!(session.reconnect_attempts(), 0);
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn closed_sessions_stay_closed() {
        let mut session = session();
        opened(&mut session);
        assert_eq!(session.close().len(), 2);
        assert!(session.close().is_empty());
        assert!(matches!(session.start(), Err(TrackerError::SessionClosed)));
        assert!(matches!(session.reconnect(), Err(TrackerError::SessionClosed)));
    }
}
