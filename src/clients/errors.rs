//! Request error types for the request gate.
//!
//! # Error Handling
//!
//! - [`InvalidRequestError`]: A descriptor failed validation before admission
//! - [`TransportError`]: An attempt produced no HTTP response
//! - [`RequestError`]: Why a request ended in an `Error` lifecycle event
//!
//! # Example
//!
//! ```rust
//! use request_gate::{LifecycleEvent, RequestError};
//!
//! fn describe(event: &LifecycleEvent) -> String {
//!     match event {
//!         LifecycleEvent::Error(RequestError::Network(e)) => format!("offline: {e}"),
//!         LifecycleEvent::Error(RequestError::Api { status, .. }) => {
//!             format!("api error {status}")
//!         }
//!         LifecycleEvent::Error(other) => other.to_string(),
//!         _ => String::new(),
//!     }
//! }
//! ```

use thiserror::Error;

use crate::auth::AuthError;
use crate::gate::ApiErrorBody;

/// Error returned when a request descriptor fails validation.
///
/// No lifecycle events fire for a request rejected this way.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidRequestError {
    /// The URL is not an absolute `http`/`https` URL.
    #[error("Invalid request URL '{url}'. Requests need an absolute http(s) URL.")]
    InvalidUrl {
        /// The URL that was provided.
        url: String,
    },

    /// A header name or value is not valid HTTP.
    #[error("Invalid header '{name}'.")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },
}

/// Error returned when an attempt produced no HTTP response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The attempt timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Any other failure before a response arrived.
    #[error("Network error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else {
            Self::Other(error.to_string())
        }
    }
}

/// Why a request ended in an `Error` lifecycle event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No HTTP response was received.
    #[error(transparent)]
    Network(TransportError),

    /// The server answered with a structured error body.
    #[error("API error {status}: {}", body.description().unwrap_or("no description"))]
    Api {
        /// The HTTP status code returned.
        status: u16,
        /// The decoded error body.
        body: ApiErrorBody,
    },

    /// The server answered with an error that could not be decoded.
    #[error("Unreadable response with status {status}")]
    Unparseable {
        /// The HTTP status code returned.
        status: u16,
    },

    /// A successful response did not match the expected shape.
    #[error("Failed to parse response: {reason}")]
    Parse {
        /// What went wrong.
        reason: String,
    },

    /// The credential needed for this request could not be acquired.
    #[error(transparent)]
    Auth(AuthError),

    /// The server sent a `Location` that could not be resolved.
    #[error("Invalid redirect location '{location}'")]
    InvalidRedirect {
        /// The raw `Location` header value.
        location: String,
    },

    /// The server redirected more times than allowed.
    #[error("Exceeded the maximum of {max} redirects")]
    TooManyRedirects {
        /// The redirect limit that was exceeded.
        max: u32,
    },

    /// The server demanded re-authentication more times than allowed.
    #[error("Exceeded the maximum of {max} logon attempts")]
    LogonAttemptsExceeded {
        /// The logon attempt limit that was exceeded.
        max: u32,
    },
}

// Verify errors can travel inside lifecycle events
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RequestError>();
    assert_send_sync::<TransportError>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_message() {
        let error = InvalidRequestError::InvalidUrl {
            url: "loads".to_string(),
        };
        assert!(error.to_string().contains("'loads'"));
    }

    #[test]
    fn test_api_error_uses_body_description() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"message":"Load no longer available"}"#).unwrap();
        let error = RequestError::Api { status: 409, body };
        assert_eq!(error.to_string(), "API error 409: Load no longer available");
    }

    #[test]
    fn test_network_error_is_transparent() {
        let error = RequestError::Network(TransportError::Connect("refused".to_string()));
        assert_eq!(error.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_error_types_implement_std_error() {
        let error: &dyn std::error::Error = &RequestError::Parse {
            reason: "expected JSON".to_string(),
        };
        let _ = error;

        let error: &dyn std::error::Error = &InvalidRequestError::InvalidHeader {
            name: "X".to_string(),
        };
        let _ = error;

        let error: &dyn std::error::Error = &TransportError::Other("boom".to_string());
        let _ = error;
    }
}
