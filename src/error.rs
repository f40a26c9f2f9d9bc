//! Unified error type.
//!
//! Everything that travels through the dispatch loop as a failure is an
//! [`Error`]. It is `Clone` because the router replays a stored failure when a
//! parameter interceptor already rejected a value earlier in the same request.

use std::any::Any;
use std::sync::Arc;

use http::StatusCode;
use thiserror::Error;

/// The error type carried through dispatch and returned by pathway's fallible
/// operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Binding a port, accepting a connection, reading a body.
    #[error("io: {0}")]
    Io(Arc<std::io::Error>),

    /// A captured path segment was not valid percent-encoded UTF-8.
    #[error("Failed to decode param '{0}'")]
    DecodeParam(String),

    /// A header name or value was rejected by the `http` crate.
    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    /// An error with an explicit HTTP status, raised by a handler.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// A handler future panicked. The payload message is kept when it is a
    /// string.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// Any other error a handler wants to pass along.
    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary error.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Arc::new(err))
    }

    /// An error that maps to `status` when it reaches the final handler.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http { status, message: message.into() }
    }

    /// A `500 Internal Server Error` with a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::http(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// The status code the final handler responds with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::DecodeParam(_) => StatusCode::BAD_REQUEST,
            Self::Http { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_owned());
        Self::Panic(message)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// Failure to compile a path template. Raised at registration time.
#[derive(Debug, Clone, Error)]
pub enum PatternError {
    #[error("unbalanced group")]
    UnbalancedGroup,

    #[error("dangling escape at end of template")]
    DanglingEscape,

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_are_client_errors() {
        assert_eq!(Error::DecodeParam("%zz".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::DecodeParam("%zz".into()).to_string(),
            "Failed to decode param '%zz'"
        );
    }

    #[test]
    fn http_errors_keep_their_status() {
        let err = Error::http(StatusCode::FORBIDDEN, "nope");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "nope");
        assert_eq!(Error::msg("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = Error::from_panic(Box::new("static message"));
        assert_eq!(err.to_string(), "handler panicked: static message");

        let err = Error::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "handler panicked: owned");

        let err = Error::from_panic(Box::new(42_u8));
        assert!(matches!(err, Error::Panic(_)));
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::other("disk").into();
        assert_eq!(err.to_string(), "io: disk");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
