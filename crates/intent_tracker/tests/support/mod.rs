#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc;
use futures::stream::{self, StreamExt};
use intent_tracker::{ProgressTransport, TransportEvent, TransportStream};
use tokio::time::Instant;

/// What one connection attempt does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Fails immediately with the given reason.
    Fail(String),
    /// Stays open; the test pushes events with [`ScriptedTransport::send`].
    Live,
}

/// In-memory transport that replays scripted connection attempts.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    scripts: VecDeque<Script>,
    fallback: Option<Script>,
    opened: Vec<(String, Instant)>,
    live: Vec<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

impl ScriptedTransport {
    pub fn live() -> Self {
        Self::default()
    }

    /// Every attempt fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        let transport = Self::default();
        transport.inner.lock().unwrap().fallback = Some(Script::Fail(reason.to_string()));
        transport
    }

    pub fn scripted(scripts: impl IntoIterator<Item = Script>) -> Self {
        let transport = Self::default();
        transport.inner.lock().unwrap().scripts = scripts.into_iter().collect();
        transport
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().unwrap().opened.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        let inner = self.inner.lock().unwrap();
        inner.opened.iter().map(|(_, at)| *at).collect()
    }

    pub fn opened_intents(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.opened.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Pushes an event into the `attempt`-th connection (zero-based).
    pub fn send(&self, attempt: usize, event: TransportEvent) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.live.get(attempt) {
            Some(Some(sender)) => sender.unbounded_send(event).is_ok(),
            _ => panic!("connection {attempt} is not a live connection"),
        }
    }

    pub fn send_json(&self, attempt: usize, payload: serde_json::Value) -> bool {
        self.send(attempt, TransportEvent::Message(payload.to_string()))
    }

    /// Whether the tracker dropped the stream of the `attempt`-th connection.
    pub fn is_released(&self, attempt: usize) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.live.get(attempt) {
            Some(Some(sender)) => sender.is_closed(),
            Some(None) => true,
            None => panic!("connection {attempt} was never opened"),
        }
    }
}

impl ProgressTransport for ScriptedTransport {
    fn open(&self, intent_id: &str) -> TransportStream {
        let mut inner = self.inner.lock().unwrap();
        inner.opened.push((intent_id.to_string(), Instant::now()));
        let script = inner
            .scripts
            .pop_front()
            .or_else(|| inner.fallback.clone())
            .unwrap_or(Script::Live);
        match script {
            Script::Fail(reason) => {
                inner.live.push(None);
                stream::iter([TransportEvent::Error(reason)]).boxed()
            }
            Script::Live => {
                let (sender, receiver) = mpsc::unbounded();
                inner.live.push(Some(sender));
                receiver.boxed()
            }
        }
    }
}

/// Lets every ready task run. Under a paused clock this advances time by one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
