//! Error types for quillapi

use std::io;

/// Result type alias for quill client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for API, storage and cache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No bearer credential, or the backend answered 401
    #[error("unauthorized: please login first")]
    Unauthorized,

    /// Transport failure (connect, TLS, timeout)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("{message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Backend-provided message, or a generic status line
        message: String,
    },

    /// Response body could not be decoded
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Fetch was cancelled or superseded before it settled
    #[error("query cancelled")]
    Cancelled,

    /// Cached document does not have the requested shape
    #[error("projection {key}: {reason}")]
    Projection {
        /// Display form of the query key
        key: String,
        /// Decode failure
        reason: String,
    },

    /// Rejected client-side before any request was made
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Client storage file is corrupt or unwritable
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for failures of the request itself (transport or HTTP status)
    pub fn is_network_or_server(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Server { .. })
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Server { status, .. } => Some(*status),
            Error::Unauthorized => Some(401),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_displays_message() {
        let err = Error::Server {
            status: 404,
            message: "Post not found".to_string(),
        };
        assert_eq!(err.to_string(), "Post not found");
        assert_eq!(err.status(), Some(404));
        assert!(err.is_network_or_server());
    }

    #[test]
    fn test_local_errors_are_not_network() {
        assert!(!Error::Unauthorized.is_network_or_server());
        assert!(!Error::Cancelled.is_network_or_server());
        assert!(!Error::MalformedResponse("eof".into()).is_network_or_server());
        assert_eq!(Error::Unauthorized.status(), Some(401));
    }
}
