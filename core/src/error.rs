//! Error types for the accounts API client.
//!
//! # Design
//! Every pipeline failure keeps whatever raw response was received, so
//! callers can still branch on the status code. `ApiError::kind` and
//! `ApiError::status` expose the classification explicitly instead of making
//! callers parse the message.

use thiserror::Error;

use crate::http::HttpResponse;

/// Failures raised while building a `Client`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("invalid host {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },
}

/// Failures reported by a `Transport` before any response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Io(String),

    /// The caller cancelled while the request was in flight.
    #[error("request cancelled in flight")]
    Cancelled,
}

/// Failures turning a response body into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The body stream could not be read to completion.
    #[error("reading response body failed: {0}")]
    Io(String),

    /// The body was not valid JSON for the expected shape.
    #[error("deserialization failed: {0}")]
    Json(String),
}

/// Coarse classification of an `ApiError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Cancelled,
    Status,
    Decode,
    Serialization,
}

/// Errors returned by `Client::execute` and the resource services.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure: DNS, refused connection, timeout without a
    /// caller deadline.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("request cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The request body could not be encoded as JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),

    /// A response arrived with a status outside 200..=299.
    #[error("{status} {reason}")]
    Status {
        status: u16,
        reason: String,
        response: Box<HttpResponse>,
    },

    /// A 2xx response arrived but its body could not be decoded.
    #[error("{source}")]
    Decode {
        source: DecodeError,
        response: Box<HttpResponse>,
    },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport(_) | ApiError::InvalidUrl(_) => ErrorKind::Transport,
            ApiError::Cancelled | ApiError::DeadlineExceeded => ErrorKind::Cancelled,
            ApiError::Serialization(_) => ErrorKind::Serialization,
            ApiError::Status { .. } => ErrorKind::Status,
            ApiError::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Status code of the response that caused this error, if one arrived.
    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    /// Raw response attached to this error, if one arrived.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            ApiError::Status { response, .. } | ApiError::Decode { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}
