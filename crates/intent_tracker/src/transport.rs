use futures::stream::BoxStream;

/// Notifications a server-push channel delivers for one connection.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TransportEvent {
    Opened,
    /// One message body, not yet validated.
    Message(String),
    /// Connection-level failure; the stream ends after it.
    Error(String),
}

pub type TransportStream = BoxStream<'static, TransportEvent>;

/// Opens progress channels. One call is one connection attempt.
///
/// `open` must not block: connecting happens when the returned stream is first polled, and
/// dropping the stream releases the connection.
pub trait ProgressTransport: Send + Sync + 'static {
    fn open(&self, intent_id: &str) -> TransportStream;
}
