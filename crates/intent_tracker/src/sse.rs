use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use progress_events::{DecodeLimits, SseDecoder};
use tracing::{debug, warn};
use url::Url;

use crate::config::{EndpointConfig, TrackerConfig};
use crate::error::TrackerError;
use crate::transport::{ProgressTransport, TransportEvent, TransportStream};

/// [`ProgressTransport`] over HTTP server-sent events.
///
/// The transport never retries on its own: the first failure ends the stream and the session
/// decides whether to reconnect.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    endpoint: EndpointConfig,
    limits: DecodeLimits,
}

impl SseTransport {
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(TrackerError::HttpClient)?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: reqwest::Client, config: &TrackerConfig) -> Result<Self, TrackerError> {
        // Surface endpoint misconfiguration at construction instead of on every attempt.
        config.endpoint.stream_url("intent")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            limits: config.limits,
        })
    }
}

impl ProgressTransport for SseTransport {
    fn open(&self, intent_id: &str) -> TransportStream {
        let state = match self.endpoint.stream_url(intent_id) {
            Ok(url) => SseState::Connect {
                client: self.client.clone(),
                url,
                limits: self.limits,
            },
            Err(err) => SseState::Failed(err.to_string()),
        };
        stream::unfold(state, advance).boxed()
    }
}

enum SseState {
    Connect {
        client: reqwest::Client,
        url: Url,
        limits: DecodeLimits,
    },
    Streaming {
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        decoder: SseDecoder,
        pending: VecDeque<TransportEvent>,
        ended: bool,
    },
    Failed(String),
    Done,
}

async fn advance(state: SseState) -> Option<(TransportEvent, SseState)> {
    match state {
        SseState::Connect { client, url, limits } => Some(connect(client, url, limits).await),
        SseState::Streaming {
            body,
            decoder,
            pending,
            ended,
        } => next_message(body, decoder, pending, ended).await,
        SseState::Failed(reason) => Some((TransportEvent::Error(reason), SseState::Done)),
        SseState::Done => None,
    }
}

async fn connect(
    client: reqwest::Client,
    url: Url,
    limits: DecodeLimits,
) -> (TransportEvent, SseState) {
    debug!(%url, "opening progress stream");
    let response = client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            return (
                TransportEvent::Error(format!("failed to connect to {url}: {err}")),
                SseState::Done,
            )
        }
    };
    let status = response.status();
    if !status.is_success() {
        return (
            TransportEvent::Error(format!("progress stream {url} returned {status}")),
            SseState::Done,
        );
    }

    (
        TransportEvent::Opened,
        SseState::Streaming {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(limits),
            pending: VecDeque::new(),
            ended: false,
        },
    )
}

async fn next_message(
    mut body: BoxStream<'static, reqwest::Result<Bytes>>,
    mut decoder: SseDecoder,
    mut pending: VecDeque<TransportEvent>,
    mut ended: bool,
) -> Option<(TransportEvent, SseState)> {
    loop {
        if let Some(event) = pending.pop_front() {
            let state = SseState::Streaming {
                body,
                decoder,
                pending,
                ended,
            };
            return Some((event, state));
        }
        if ended {
            // A clean end of body is reported by ending the stream.
            return None;
        }

        match body.next().await {
            Some(Ok(chunk)) => {
                for frame in decoder.push(&chunk) {
                    match frame {
                        Ok(frame) => pending.push_back(TransportEvent::Message(frame.data)),
                        Err(err) => warn!(%err, "skipping undecodable event-stream frame"),
                    }
                }
            }
            Some(Err(err)) => {
                return Some((
                    TransportEvent::Error(format!("progress stream read failed: {err}")),
                    SseState::Done,
                ))
            }
            None => {
                if let Some(err) = decoder.finish() {
                    warn!(%err, "skipping undecodable event-stream frame");
                }
                ended = true;
            }
        }
    }
}
