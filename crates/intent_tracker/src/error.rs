use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the tracker API and its configuration layer.
///
/// Stream-level failures (dropped payloads, transport errors) never surface here; they are
/// recovered inside the session and show up as observable state instead.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("intent id must not be empty")]
    EmptyIntentId,
    #[error("no stream base URL configured (set `base_url` or INTENT_TRACKER_BASE_URL)")]
    MissingBaseUrl,
    #[error("invalid stream base URL `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("stream base URL `{0}` cannot carry a path")]
    CannotBeABase(String),
    #[error("stream path `{0}` must contain a `{{intentId}}` segment")]
    InvalidStreamPath(String),
    #[error("failed to read tracker config `{path}`: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse tracker config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("tracker has not been started")]
    NotStarted,
    #[error("session is closed; start a new session to track again")]
    SessionClosed,
}

/// A controller-level failure, distinct from an error reported by the producer.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SessionFailure {
    #[error("Connection lost after {attempts} reconnect attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },
}
