//! Client error types.
//!
//! Every operation resolves to exactly one of these or to a value; there is
//! no unbounded wait behind any of them.

use std::fmt;
use std::time::Duration;

use shared_types::RecordError;

use crate::domain::config::ConfigError;

/// Rejection reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteError {
    /// HTTP status for REST, absent for WebSocket.
    pub status: Option<u16>,
    /// Server error code, absent for REST.
    pub code: Option<i64>,
    pub message: String,
}

impl RemoteError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code) {
            (Some(status), _) => write!(f, "unexpected status {status}")?,
            (None, Some(code)) => write!(f, "code {code}")?,
            (None, None) => f.write_str("request rejected")?,
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Errors returned by client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Outbound payload could not be serialized or written
    #[error("transmit failed: {0}")]
    TransmitFailed(String),

    /// Caller timeout elapsed; the operation itself may still complete
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Service stopped before or while waiting
    #[error("stopped")]
    Stopped,

    /// Server answered with a non-success status
    #[error("{0}")]
    Transport(RemoteError),

    /// Server answer could not be decoded
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Connection-level failure (connect, read, HTTP I/O)
    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Rejected locally; nothing was sent
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Remote rejection details, if this is one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Transport(remote) => Some(remote),
            _ => None,
        }
    }
}

impl From<RecordError> for ClientError {
    fn from(err: RecordError) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// Result alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
