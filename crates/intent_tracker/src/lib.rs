#![forbid(unsafe_code)]
//! Client-side progress tracking for asynchronous intent execution.
//!
//! An [`IntentTracker`] follows one intent over a server-push channel. Incoming payloads go
//! through [`progress_events`] validation and normalization and are appended to the session's
//! event log; transport failures are retried a bounded number of times with a fixed delay.
//!
//! ```rust,no_run
//! use intent_tracker::{IntentTracker, TrackerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrackerConfig::builder()
//!     .base_url("https://api.example.com")?
//!     .build()?;
//! let mut tracker = IntentTracker::from_config(&config)?;
//! tracker.start("intent-42", true)?;
//!
//! let mut updates = tracker.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow_and_update().clone();
//!     println!("{:.0}%", snapshot.progress() * 100.0);
//!     if snapshot.is_complete() || snapshot.has_error() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod session;
mod snapshot;
mod sse;
mod tracker;
mod transport;

pub use config::{
    EndpointConfig, SessionPolicy, TrackerConfig, TrackerConfigBuilder, BASE_URL_ENV,
    DEFAULT_STREAM_PATH, INTENT_ID_PLACEHOLDER, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY,
    TERMINAL_GRACE_PERIOD,
};
pub use error::{SessionFailure, TrackerError};
pub use session::{
    ConnectionId, MessageOutcome, SessionAction, SessionState, StreamSession, TerminalOutcome,
};
pub use snapshot::TrackerSnapshot;
pub use sse::SseTransport;
pub use tracker::IntentTracker;
pub use transport::{ProgressTransport, TransportEvent, TransportStream};

pub use progress_events;
