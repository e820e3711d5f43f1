//! Error types for the Intercom client.
//!
//! # Design
//! `NotFound` and `Unauthorized` get dedicated variants because callers branch
//! on them (a missing remote user is a normal state during account sync). All
//! other non-2xx responses land in `HttpError` with the raw status and body.
//! Deferred-log failures live in `QueueError` and fold into `ApiError::Queue`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by client, transport and messenger operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server returned 404; the requested user does not exist.
    #[error("resource not found")]
    NotFound,

    /// The server rejected the basic-auth credentials.
    #[error("unauthorized: check app id and api key")]
    Unauthorized,

    /// The server returned a non-2xx status other than 401 or 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// No response was obtained from the remote service.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// A user create/update carried neither a user id nor an email.
    #[error("a user id or an email is required")]
    MissingIdentity,

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ApiError {
    /// Stable label for the last-error slot and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound => "not_found",
            ApiError::Unauthorized => "unauthorized",
            ApiError::HttpError { .. } => "http",
            ApiError::Transport(err) => err.kind.as_str(),
            ApiError::DeserializationError(_) => "deserialization",
            ApiError::SerializationError(_) => "serialization",
            ApiError::MissingIdentity => "missing_identity",
            ApiError::Queue(QueueError::WriteFailed { .. }) => "queue_write_failed",
            ApiError::Queue(QueueError::ReadFailed { .. }) => "queue_read_failed",
            ApiError::Queue(QueueError::ReplayAborted { .. }) => "replay_aborted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Io,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Io => "io",
            TransportErrorKind::Other => "other",
        }
    }
}

/// Connection-level failure: nothing came back from the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error ({}): {message}", .kind.as_str())]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Failures of the deferred call log.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to append to deferred log {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read deferred log {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The replay loop stopped early; the working file is left in place.
    #[error("replay of {} aborted after {handled} calls: {source}", .path.display())]
    ReplayAborted {
        path: PathBuf,
        handled: usize,
        #[source]
        source: io::Error,
    },
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Code/message pair describing the most recent failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub code: &'static str,
    pub message: String,
}

impl From<&ApiError> for LastError {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
