//! Error types for the ManageIQ API client.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! is [`ApiError`]. Only [`ApiError::Connection`] is ever retried, and only by
//! the transport; everything else propagates to the caller unchanged.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors that can occur while talking to the API or walking the resource graph.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// DNS, connect or reset failure. Retried up to the configured budget.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Any other transport failure (timeout, body read, redirect loop).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The response body was not JSON where JSON was required.
    #[error("JSONDecodeError: {0}")]
    Decode(String),

    /// The server answered with an error payload.
    #[error("{0}")]
    Domain(DomainError),

    /// A record carried neither an `id` nor an `href`, or had the wrong shape.
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// No such attribute, subcollection, action, version or filter match.
    #[error("{0}")]
    NotFound(String),

    /// Action method or action result shape this client does not know.
    #[error("not implemented: {0}")]
    Unimplemented(String),

    /// A collection reload returned a payload for a different collection.
    #[error("collection name mismatch: expected {expected:?}, server returned {actual:?}")]
    NameMismatch {
        /// Name the collection was built with.
        expected: String,
        /// Name found in the server payload.
        actual: String,
    },

    /// An href or entry point could not be turned into a URL.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The offending href.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The client configuration could not be applied.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A poll loop ran out of time.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl ApiError {
    /// Returns true if the transport may retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Connection(_))
    }

    /// Returns true if this is a server-reported error payload.
    pub fn is_domain(&self) -> bool {
        matches!(self, ApiError::Domain(_))
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || (err.is_request() && !err.is_timeout() && is_disconnect(&err)) {
            ApiError::Connection(err.to_string())
        } else {
            ApiError::Http(err.to_string())
        }
    }
}

/// Whether the source chain shows the peer dropping the connection.
fn is_disconnect(err: &(dyn StdError + 'static)) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            if is_disconnect_kind(io.kind()) {
                return true;
            }
        }
        if let Some(hyper) = cause.downcast_ref::<hyper::Error>() {
            if hyper.is_incomplete_message() || hyper.is_canceled() {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

/// Error payload reported by the server.
///
/// Two shapes are understood: `{"error": {"klass": .., "message": ..}}` fills
/// `kind`, and `{"status": .., "error": ..}` fills `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainError {
    /// Server-side error class, e.g. `ActiveRecord::RecordNotFound`.
    pub kind: Option<String>,
    /// HTTP-ish status code from the flat error shape.
    pub status: Option<i64>,
    /// Human readable message.
    pub message: String,
}

impl DomainError {
    /// Error carrying a class and message.
    pub fn with_kind(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            status: None,
            message: message.into(),
        }
    }

    /// Error carrying an optional status code and message. A missing status
    /// renders as `None`.
    pub fn with_status(status: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            kind: None,
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, self.status) {
            (Some(kind), _) => write!(f, "{}: {}", kind, self.message),
            (None, Some(status)) => write!(f, "{}: {}", status, self.message),
            (None, None) => write!(f, "None: {}", self.message),
        }
    }
}
