use std::{path::Path, time::Duration};

use progress_events::DecodeLimits;
use serde::Deserialize;
use url::Url;

use crate::error::TrackerError;

pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;
pub const RECONNECT_DELAY: Duration = Duration::from_millis(2000);
pub const TERMINAL_GRACE_PERIOD: Duration = Duration::from_millis(5000);

pub const DEFAULT_STREAM_PATH: &str = "/api/intents/{intentId}/stream";
pub const INTENT_ID_PLACEHOLDER: &str = "{intentId}";
pub const BASE_URL_ENV: &str = "INTENT_TRACKER_BASE_URL";

/// Reconnection and shutdown policy of one stream session.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SessionPolicy {
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts (no backoff).
    pub reconnect_delay: Duration,
    /// How long a terminated session stays observable before it closes itself.
    pub terminal_grace: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: RECONNECT_DELAY,
            terminal_grace: TERMINAL_GRACE_PERIOD,
        }
    }
}

/// Where progress streams live.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EndpointConfig {
    pub base_url: Option<Url>,
    /// Path template; one segment must be exactly `{intentId}`.
    pub stream_path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            stream_path: DEFAULT_STREAM_PATH.to_string(),
        }
    }
}

impl EndpointConfig {
    /// Builds the stream URL for one intent. The id is percent-encoded as a single segment.
    pub fn stream_url(&self, intent_id: &str) -> Result<Url, TrackerError> {
        let base = self.base_url.as_ref().ok_or(TrackerError::MissingBaseUrl)?;
        self.check_stream_path()?;

        let mut url = base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| TrackerError::CannotBeABase(base.to_string()))?;
            segments.pop_if_empty();
            for segment in self.stream_path.split('/').filter(|s| !s.is_empty()) {
                if segment == INTENT_ID_PLACEHOLDER {
                    segments.push(intent_id);
                } else {
                    segments.push(segment);
                }
            }
        }
        Ok(url)
    }

    fn check_stream_path(&self) -> Result<(), TrackerError> {
        let has_placeholder = self
            .stream_path
            .split('/')
            .any(|segment| segment == INTENT_ID_PLACEHOLDER);
        if has_placeholder {
            Ok(())
        } else {
            Err(TrackerError::InvalidStreamPath(self.stream_path.clone()))
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TrackerConfig {
    pub endpoint: EndpointConfig,
    pub policy: SessionPolicy,
    pub limits: DecodeLimits,
}

/// On-disk form of [`TrackerConfig`]; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TrackerConfigFile {
    base_url: Option<String>,
    stream_path: Option<String>,
    max_reconnect_attempts: Option<u32>,
    reconnect_delay_ms: Option<u64>,
    terminal_grace_ms: Option<u64>,
    max_line_bytes: Option<usize>,
    max_frame_bytes: Option<usize>,
}

impl TrackerConfig {
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Parses a TOML document on top of the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, TrackerError> {
        let file: TrackerConfigFile = toml::from_str(text)?;
        let mut builder = Self::builder();
        if let Some(url) = file.base_url {
            builder = builder.base_url(&url)?;
        }
        if let Some(path) = file.stream_path {
            builder = builder.stream_path(path);
        }
        if let Some(attempts) = file.max_reconnect_attempts {
            builder = builder.max_reconnect_attempts(attempts);
        }
        if let Some(ms) = file.reconnect_delay_ms {
            builder = builder.reconnect_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = file.terminal_grace_ms {
            builder = builder.terminal_grace(Duration::from_millis(ms));
        }
        if let Some(bytes) = file.max_line_bytes {
            builder = builder.max_line_bytes(bytes);
        }
        if let Some(bytes) = file.max_frame_bytes {
            builder = builder.max_frame_bytes(bytes);
        }
        builder.build()
    }

    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        let text = std::fs::read_to_string(path).map_err(|source| TrackerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Applies `INTENT_TRACKER_BASE_URL` when it is set and non-empty.
    pub fn with_env_overrides(self) -> Result<Self, TrackerError> {
        match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => self.with_base_url(&url),
            _ => Ok(self),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self, TrackerError> {
        self.endpoint.base_url = Some(parse_base_url(url)?);
        Ok(self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackerConfigBuilder {
    config: TrackerConfig,
}

impl TrackerConfigBuilder {
    pub fn base_url(mut self, url: &str) -> Result<Self, TrackerError> {
        self.config.endpoint.base_url = Some(parse_base_url(url)?);
        Ok(self)
    }

    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint.stream_path = path.into();
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.policy.max_reconnect_attempts = attempts;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.policy.reconnect_delay = delay;
        self
    }

    pub fn terminal_grace(mut self, grace: Duration) -> Self {
        self.config.policy.terminal_grace = grace;
        self
    }

    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.config.limits.max_line_bytes = bytes;
        self
    }

    pub fn max_frame_bytes(mut self, bytes: usize) -> Self {
        self.config.limits.max_frame_bytes = bytes;
        self
    }

    pub fn build(self) -> Result<TrackerConfig, TrackerError> {
        self.config.endpoint.check_stream_path()?;
        Ok(self.config)
    }
}

fn parse_base_url(url: &str) -> Result<Url, TrackerError> {
    let parsed = Url::parse(url.trim()).map_err(|source| TrackerError::InvalidBaseUrl {
        url: url.to_string(),
        source,
    })?;
    if parsed.cannot_be_a_base() {
        return Err(TrackerError::CannotBeABase(url.to_string()));
    }
    Ok(parsed)
}
