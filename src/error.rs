//! Error types for CouchDB operations.
//!
//! Every fallible operation in this crate returns [`Result<T>`], an alias over
//! [`CouchError`]. The change feed loop only surfaces an error when its very
//! first request cannot be built; connection failures inside the loop are
//! logged and retried instead.

use thiserror::Error;

/// Errors produced by the CouchDB client.
#[derive(Error, Debug)]
pub enum CouchError {
    /// Transport-level failure reported by the HTTP client.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a non-success status code.
    #[error("{message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Status line text as sent by the server.
        message: String,
    },

    /// A URL could not be parsed or built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Socket-level I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An option value cannot be represented in a query string.
    #[error("Invalid option '{key}': {reason}")]
    InvalidOption {
        /// Option name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The server sent a response the client cannot frame.
    #[error("Malformed response: {0}")]
    Protocol(String),

    /// The server accepted the request but replied `ok: false`.
    #[error("{error}: {reason}")]
    Rejected {
        /// CouchDB error identifier.
        error: String,
        /// Human readable reason.
        reason: String,
    },

    /// A document lacks the fields an operation requires.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The CouchDB server did not answer `/_all_dbs`.
    #[error("CouchDB not running")]
    NotRunning,

    /// The named database does not exist.
    #[error("Database does not exist: {0}")]
    DatabaseMissing(String),
}

impl CouchError {
    /// Build an [`CouchError::InvalidOption`].
    pub fn invalid_option(key: impl Into<String>, reason: impl Into<String>) -> Self {
        CouchError::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            CouchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CouchError::Http(_) | CouchError::Io(_) => true,
            CouchError::Status { status, .. } => {
                crate::client::is_retryable_status(*status)
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CouchError {
    fn from(err: reqwest::Error) -> Self {
        CouchError::Http(err.to_string())
    }
}

/// Result type alias for CouchDB operations.
pub type Result<T> = std::result::Result<T, CouchError>;
