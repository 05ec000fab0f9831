use std::future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use progress_events::{NormalizedProgressEvent, Phase, TransactionDescriptor};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tracing::debug;

use crate::config::{SessionPolicy, TrackerConfig};
use crate::error::TrackerError;
use crate::session::{ConnectionId, SessionAction, StreamSession};
use crate::snapshot::TrackerSnapshot;
use crate::sse::SseTransport;
use crate::transport::{ProgressTransport, TransportEvent, TransportStream};

/// Follows the progress of one intent at a time.
///
/// Each started intent gets its own [`StreamSession`] and a driver task that owns the
/// transport and timers. Consumers read the latest [`TrackerSnapshot`] or subscribe to every
/// update. Starting a session spawns onto the current Tokio runtime.
pub struct IntentTracker {
    transport: Arc<dyn ProgressTransport>,
    policy: SessionPolicy,
    updates: Arc<watch::Sender<TrackerSnapshot>>,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    intent_id: String,
    shared: Arc<Mutex<StreamSession>>,
    commands: mpsc::UnboundedSender<Vec<SessionAction>>,
    driver: JoinHandle<()>,
}

impl IntentTracker {
    pub fn new(transport: Arc<dyn ProgressTransport>, policy: SessionPolicy) -> Self {
        let (updates, _) = watch::channel(TrackerSnapshot::idle());
        Self {
            transport,
            policy,
            updates: Arc::new(updates),
            active: None,
        }
    }

    /// Tracker backed by [`SseTransport`].
    pub fn from_config(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let transport = SseTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), config.policy))
    }

    /// Begins tracking `intent_id`.
    ///
    /// `enabled == false` closes any current session. Starting the intent that is already being
    /// followed is a no-op; starting a different one closes the current session first.
    pub fn start(&mut self, intent_id: &str, enabled: bool) -> Result<(), TrackerError> {
        if !enabled {
            self.close();
            return Ok(());
        }
        if intent_id.trim().is_empty() {
            return Err(TrackerError::EmptyIntentId);
        }
        if let Some(active) = &self.active {
            if active.intent_id == intent_id && !lock(&active.shared).is_closed() {
                return Ok(());
            }
        }
        self.close();
        self.spawn_session(intent_id)
    }

    /// Closes the current session. Idempotent.
    ///
    /// Once this returns, the transport is released, pending timers are cancelled and no
    /// further snapshot is published for the session.
    pub fn close(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        {
            let mut session = lock(&active.shared);
            if !session.is_closed() {
                // The driver task owns the transport and timers; aborting it releases both.
                session.close();
                self.updates.send_replace(session.snapshot());
            }
        }
        active.driver.abort();
    }

    /// Drops the observed history and connects again for the current intent.
    ///
    /// A session that already closed (manually, or after its grace period) is replaced by a
    /// fresh one for the same intent.
    pub fn reconnect(&mut self) -> Result<(), TrackerError> {
        let active = self.active.as_ref().ok_or(TrackerError::NotStarted)?;
        {
            let mut session = lock(&active.shared);
            if !session.is_closed() {
                let actions = session.reconnect()?;
                self.updates.send_replace(session.snapshot());
                return active
                    .commands
                    .send(actions)
                    .map_err(|_| TrackerError::SessionClosed);
            }
        }
        let intent_id = active.intent_id.clone();
        debug!(%intent_id, "replacing closed progress session");
        self.spawn_session(&intent_id)
    }

    fn spawn_session(&mut self, intent_id: &str) -> Result<(), TrackerError> {
        let mut session = StreamSession::new(intent_id, self.policy);
        let initial = session.start()?;
        self.updates.send_replace(session.snapshot());
        let shared = Arc::new(Mutex::new(session));
        let (commands, receiver) = mpsc::unbounded_channel();
        let driver = Driver {
            intent_id: intent_id.to_string(),
            transport: Arc::clone(&self.transport),
            shared: Arc::clone(&shared),
            updates: Arc::clone(&self.updates),
            connection: None,
            timer: None,
        };
        let driver = tokio::spawn(driver.run(initial, receiver));

        self.active = Some(ActiveSession {
            intent_id: intent_id.to_string(),
            shared,
            commands,
            driver,
        });
        Ok(())
    }

    pub fn intent_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.intent_id.as_str())
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.updates.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.updates.subscribe()
    }

    pub fn events(&self) -> Vec<NormalizedProgressEvent> {
        self.updates.borrow().events.clone()
    }

    pub fn latest_event(&self) -> Option<NormalizedProgressEvent> {
        self.updates.borrow().latest_event().cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.updates.borrow().is_connected()
    }

    pub fn is_complete(&self) -> bool {
        self.updates.borrow().is_complete()
    }

    pub fn has_error(&self) -> bool {
        self.updates.borrow().has_error()
    }

    pub fn progress(&self) -> f64 {
        self.updates.borrow().progress()
    }

    pub fn current_step(&self) -> Option<Phase> {
        self.updates.borrow().current_step()
    }

    pub fn error(&self) -> Option<String> {
        self.updates.borrow().error()
    }

    pub fn transactions(&self) -> Option<Vec<TransactionDescriptor>> {
        self.updates.borrow().transactions().map(<[_]>::to_vec)
    }
}

impl Drop for IntentTracker {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for IntentTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentTracker")
            .field("policy", &self.policy)
            .field("intent_id", &self.intent_id())
            .finish_non_exhaustive()
    }
}

fn lock(session: &Mutex<StreamSession>) -> MutexGuard<'_, StreamSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Reconnect,
    GraceClose,
}

enum Input {
    Actions(Vec<SessionAction>),
    /// `None` means the transport stream ended.
    Transport(ConnectionId, Option<TransportEvent>),
    Timer(TimerKind),
}

/// Executes session actions and feeds transport and timer notifications back in.
struct Driver {
    intent_id: String,
    transport: Arc<dyn ProgressTransport>,
    shared: Arc<Mutex<StreamSession>>,
    updates: Arc<watch::Sender<TrackerSnapshot>>,
    connection: Option<(ConnectionId, TransportStream)>,
    timer: Option<(TimerKind, Pin<Box<Sleep>>)>,
}

impl Driver {
    async fn run(
        mut self,
        initial: Vec<SessionAction>,
        mut commands: mpsc::UnboundedReceiver<Vec<SessionAction>>,
    ) {
        let mut input = Input::Actions(initial);
        while self.apply(input) {
            input = tokio::select! {
                biased;
                actions = commands.recv() => match actions {
                    Some(actions) => Input::Actions(actions),
                    None => break,
                },
                event = next_event(&mut self.connection) => event,
                kind = timer_elapsed(&mut self.timer) => Input::Timer(kind),
            };
        }
        debug!(intent_id = %self.intent_id, "progress session driver stopped");
    }

    /// Returns `false` once the session is closed.
    fn apply(&mut self, input: Input) -> bool {
        let shared = Arc::clone(&self.shared);
        let mut session = lock(&shared);
        if session.is_closed() {
            return false;
        }

        let actions = match input {
            Input::Actions(actions) => actions,
            Input::Transport(connection, Some(TransportEvent::Opened)) => {
                session.on_open(connection)
            }
            Input::Transport(connection, Some(TransportEvent::Message(body))) => {
                session.on_message(connection, &body).1
            }
            Input::Transport(connection, Some(TransportEvent::Error(reason))) => {
                session.on_transport_error(connection, &reason)
            }
            Input::Transport(connection, None) => {
                self.connection = None;
                session.on_transport_error(connection, "progress stream ended")
            }
            Input::Timer(kind) => {
                self.timer = None;
                match kind {
                    TimerKind::Reconnect => session.on_reconnect_due(),
                    TimerKind::GraceClose => session.on_grace_elapsed(),
                }
            }
        };
        self.execute(actions);

        let next = session.snapshot();
        self.updates.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        !session.is_closed()
    }

    fn execute(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::OpenTransport { connection } => {
                    let stream = self.transport.open(&self.intent_id);
                    self.connection = Some((connection, stream));
                }
                SessionAction::ReleaseTransport => self.connection = None,
                SessionAction::ScheduleReconnect { delay } => {
                    self.timer = Some((TimerKind::Reconnect, Box::pin(sleep(delay))));
                }
                SessionAction::ScheduleClose { delay } => {
                    self.timer = Some((TimerKind::GraceClose, Box::pin(sleep(delay))));
                }
                SessionAction::CancelTimers => self.timer = None,
            }
        }
    }
}

async fn next_event(connection: &mut Option<(ConnectionId, TransportStream)>) -> Input {
    match connection {
        Some((id, stream)) => Input::Transport(*id, stream.next().await),
        None => future::pending().await,
    }
}

async fn timer_elapsed(timer: &mut Option<(TimerKind, Pin<Box<Sleep>>)>) -> TimerKind {
    match timer {
        Some((kind, delay)) => {
            delay.as_mut().await;
            *kind
        }
        None => future::pending().await,
    }
}
