//! Fetch error taxonomy.

use thiserror::Error;

/// Coarse classification of a [`FetchError`], used by retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Connect,
    Io,
    Status,
    Decode,
    CircuitOpen,
    RetriesExhausted,
    Other,
}

impl ErrorKind {
    /// Kinds retried by default: network timeouts, connection failures and
    /// read/write errors.
    pub const TRANSIENT: [ErrorKind; 3] = [ErrorKind::Timeout, ErrorKind::Connect, ErrorKind::Io];

    pub fn is_transient(self) -> bool {
        Self::TRANSIENT.contains(&self)
    }
}

/// Errors raised while fetching remote content.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("Max retries ({attempts}) exceeded for {operation}: {source}")]
    MaxRetriesExceeded {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout(_) => ErrorKind::Timeout,
            FetchError::Connect(_) => ErrorKind::Connect,
            FetchError::Io(_) => ErrorKind::Io,
            FetchError::Status { .. } => ErrorKind::Status,
            FetchError::Decode(_) => ErrorKind::Decode,
            FetchError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            FetchError::MaxRetriesExceeded { .. } => ErrorKind::RetriesExhausted,
            FetchError::Other(_) => ErrorKind::Other,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// The error that ended the last attempt, unwrapping retry exhaustion.
    pub fn last_error(&self) -> &FetchError {
        match self {
            FetchError::MaxRetriesExceeded { source, .. } => source.last_error(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else if e.is_body() || e.is_request() {
            FetchError::Io(e.to_string())
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        FetchError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}
