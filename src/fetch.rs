//! Rate-limited JSON metadata fetcher backed by the payload cache.
//!
//! Every network attempt is preceded by a fixed politeness delay; cache hits
//! skip both the delay and the network. Connection-level failures are retried
//! once with a fixed backoff. HTTP errors and unparseable bodies are
//! definitive answers and are never retried.

use crate::cache::PayloadStore;
use crate::util::truncate_string;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::thread;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const POLITENESS_DELAY: Duration = Duration::from_millis(500);
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);
pub const MAX_RETRIES: u32 = 1;

/// Error reasons embedded in status tags are capped at this many bytes.
const REASON_LIMIT: usize = 50;

/// Outcome of a fetch, recorded verbatim in the registry. Serializes as the
/// transport status code (a number) or as one of the string tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// HTTP status of the response, success or not.
    Http(u16),
    /// Payload served from the cache; no network attempt was made.
    Cached,
    /// The server responded but the body was not JSON.
    InvalidJson,
    /// No response after exhausting the retry budget.
    Transport(String),
    /// Any other failure (TLS setup, bad URI, ...).
    Failed(String),
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Http(code) => write!(f, "{code}"),
            FetchStatus::Cached => write!(f, "cached"),
            FetchStatus::InvalidJson => write!(f, "InvalidJSON"),
            FetchStatus::Transport(reason) => write!(f, "URLError: {reason}"),
            FetchStatus::Failed(message) => write!(f, "Error: {message}"),
        }
    }
}

impl Serialize for FetchStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FetchStatus::Http(code) => serializer.serialize_u16(*code),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

/// Error from a single HTTP attempt.
#[derive(Debug)]
pub enum TransportError {
    /// Definitive non-success status from the server; not retried.
    Status(u16),
    /// No response (DNS, connect, timeout, mid-body I/O); retried within the
    /// budget.
    Connection(String),
    /// Anything else; not retried.
    Other(String),
}

/// Single-attempt HTTP GET returning the status code and body text. The
/// fetcher owns throttling and retries; implementations only make one attempt.
pub trait Transport {
    fn get_text(&self, url: &str) -> Result<(u16, String), TransportError>;
}

/// Production transport: blocking `ureq` agent with a global timeout and a
/// declared client identifier.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .user_agent(concat!("mapscout/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent: config.new_agent(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn get_text(&self, url: &str) -> Result<(u16, String), TransportError> {
        match self.agent.get(url).call() {
            Ok(mut response) => {
                let status = response.status().as_u16();
                let body = response
                    .body_mut()
                    .read_to_string()
                    .map_err(|err| TransportError::Connection(err.to_string()))?;
                Ok((status, body))
            }
            Err(ureq::Error::StatusCode(code)) => Err(TransportError::Status(code)),
            Err(err) if is_connection_error(&err) => {
                Err(TransportError::Connection(err.to_string()))
            }
            Err(err) => Err(TransportError::Other(err.to_string())),
        }
    }
}

fn is_connection_error(err: &ureq::Error) -> bool {
    matches!(
        err,
        ureq::Error::Io(_)
            | ureq::Error::Timeout(_)
            | ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
    )
}

/// Cache-first fetcher. Pacing is configurable so tests can run without
/// sleeping; the CLI always uses the fixed production pacing.
pub struct Fetcher {
    store: Box<dyn PayloadStore>,
    transport: Box<dyn Transport>,
    delay: Duration,
    backoff: Duration,
    retries: u32,
}

impl Fetcher {
    pub fn new(store: Box<dyn PayloadStore>, transport: Box<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            delay: POLITENESS_DELAY,
            backoff: RETRY_BACKOFF,
            retries: MAX_RETRIES,
        }
    }

    /// Overrides the politeness delay and retry backoff.
    pub fn with_pacing(mut self, delay: Duration, backoff: Duration) -> Self {
        self.delay = delay;
        self.backoff = backoff;
        self
    }

    pub fn fetch(&self, url: &str) -> (Option<Value>, FetchStatus) {
        self.fetch_with_cache(url, true)
    }

    pub fn fetch_with_cache(&self, url: &str, use_cache: bool) -> (Option<Value>, FetchStatus) {
        if use_cache {
            if let Some(payload) = self.store.get(url) {
                tracing::debug!(url, "cache hit");
                return (Some(payload), FetchStatus::Cached);
            }
        }

        thread::sleep(self.delay);
        let mut attempt = 0;
        loop {
            match self.transport.get_text(url) {
                Ok((status, body)) => {
                    let payload: Value = match serde_json::from_str(&body) {
                        Ok(payload) => payload,
                        Err(_) => return (None, FetchStatus::InvalidJson),
                    };
                    if let Err(err) = self.store.put(url, &payload) {
                        tracing::warn!(url, error = %err, "cache write failed");
                    }
                    return (Some(payload), FetchStatus::Http(status));
                }
                Err(TransportError::Status(code)) => {
                    return (None, FetchStatus::Http(code));
                }
                Err(TransportError::Connection(reason)) => {
                    if attempt < self.retries {
                        attempt += 1;
                        tracing::debug!(url, attempt, "retrying after connection failure");
                        thread::sleep(self.backoff);
                        continue;
                    }
                    return (
                        None,
                        FetchStatus::Transport(truncate_string(&reason, REASON_LIMIT)),
                    );
                }
                Err(TransportError::Other(message)) => {
                    return (
                        None,
                        FetchStatus::Failed(truncate_string(&message, REASON_LIMIT)),
                    );
                }
            }
        }
    }
}
