//! Error types for the call-control library

use thiserror::Error;

/// Result type for call-control operations
pub type CallControlResult<T> = Result<T, CallControlError>;

/// Errors that can occur while talking to the telephony platform
///
/// Only caller-initiated operations (session creation and per-session call
/// control) ever hand one of these back. Bootstrap fetches swallow them at the
/// fetch boundary and log instead.
#[derive(Debug, Error)]
pub enum CallControlError {
    /// Transport-level failure (connect, TLS, timeout, ...)
    #[error("Network error: {message}")]
    Network { message: String },

    /// The platform answered with a non-success status
    #[error("Platform returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The platform answered, but not with what we expected
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session has no leg belonging to the owning extension
    #[error("Session {session_id} has no party owned by this extension")]
    NoObservableParty { session_id: String },

    /// A caller-supplied argument is unusable
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl CallControlError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a no-observable-party error
    pub fn no_observable_party(session_id: impl Into<String>) -> Self {
        Self::NoObservableParty {
            session_id: session_id.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for CallControlError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::HttpStatus {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            Self::invalid_response(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}
