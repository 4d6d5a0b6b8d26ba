//! Credential acquisition error types.
//!
//! # Error Types
//!
//! - [`AuthError::Network`]: The token endpoint could not be reached
//! - [`AuthError::ServiceOutage`]: The token endpoint answered 503
//! - [`AuthError::Rejected`]: The token endpoint answered with a structured error body
//! - [`AuthError::Unparseable`]: The token endpoint answered with something unreadable
//! - [`AuthError::NoCredentials`]: There is nothing to refresh and no cached login
//! - [`AuthError::TooManyRedirects`]: The token endpoint kept redirecting
//! - [`AuthError::Canceled`]: A logout discarded the grant
//!
//! # Example
//!
//! ```rust
//! use request_gate::AuthError;
//!
//! let error = AuthError::Unparseable { status: 500 };
//! assert!(error.to_string().contains("500"));
//! ```

use thiserror::Error;

use crate::clients::TransportError;
use crate::gate::ApiErrorBody;

/// Errors that can occur while acquiring a credential.
///
/// `AuthError` is `Clone` because one credential operation may be awaited by
/// many callers at once.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error("Token request failed: {0}")]
    Network(TransportError),

    /// The token endpoint is down for maintenance.
    #[error("Token endpoint reported a service outage (503)")]
    ServiceOutage,

    /// The token endpoint rejected the grant with a structured error body.
    ///
    /// The body's actions are resolved like those of any other API error.
    #[error(
        "Token request rejected with status {status}: {}",
        body.description().unwrap_or("no description")
    )]
    Rejected {
        /// The HTTP status code returned.
        status: u16,
        /// The decoded error body.
        body: ApiErrorBody,
    },

    /// The token endpoint answered with a body that could not be decoded.
    #[error("Token endpoint returned an unreadable response with status {status}")]
    Unparseable {
        /// The HTTP status code returned.
        status: u16,
    },

    /// No refresh token exists and no login is cached.
    #[error("No credentials available. Log in before sending authenticated requests.")]
    NoCredentials,

    /// The token endpoint redirected more times than allowed.
    #[error("Token request exceeded the maximum of {max} redirects")]
    TooManyRedirects {
        /// The redirect limit that was exceeded.
        max: u32,
    },

    /// A logout happened while the grant was in flight; its result was discarded.
    #[error("Credential grant canceled by logout")]
    Canceled,
}

// Verify AuthError is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<AuthError>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_includes_status_and_description() {
        let body: ApiErrorBody = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
        )
        .unwrap();
        let error = AuthError::Rejected { status: 400, body };

        let message = error.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("Refresh token revoked"));
    }

    #[test]
    fn test_network_error_wraps_transport_error() {
        let error = AuthError::Network(TransportError::Timeout("15s elapsed".to_string()));
        assert!(error.to_string().contains("15s elapsed"));
    }

    #[test]
    fn test_auth_error_implements_std_error() {
        let error: &dyn std::error::Error = &AuthError::NoCredentials;
        let _ = error;

        let error: &dyn std::error::Error = &AuthError::TooManyRedirects { max: 5 };
        let _ = error;
    }
}
