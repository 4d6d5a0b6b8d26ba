//! Configuration error types for the request gate.
//!
//! This module contains the error type returned while building a
//! [`GateConfig`](crate::GateConfig), its validated newtypes, or the
//! [`RequestGate`](crate::RequestGate) itself.
//!
//! # Error Handling
//!
//! All configuration constructors return `Result<T, ConfigError>` to enable
//! fail-fast validation. Error messages are designed to be clear and actionable.
//!
//! # Example
//!
//! ```rust
//! use request_gate::{ClientId, ConfigError};
//!
//! let result = ClientId::new("");
//! assert!(matches!(result, Err(ConfigError::EmptyClientId)));
//! ```

use thiserror::Error;

/// Errors that can occur during gate configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Client id cannot be empty.
    #[error("Client id cannot be empty. Please provide the OAuth client id used for the token endpoint.")]
    EmptyClientId,

    /// Client secret cannot be empty.
    #[error("Client secret cannot be empty. Please provide the OAuth client secret used for the token endpoint.")]
    EmptyClientSecret,

    /// An API URL is invalid.
    #[error("Invalid URL '{url}'. Please provide an absolute http(s) URL (e.g., 'https://api.example.com/token').")]
    InvalidApiUrl {
        /// The invalid URL that was provided.
        url: String,
    },

    /// A required field is missing.
    #[error("Missing required field: '{field}'. This field must be set before building the configuration.")]
    MissingRequiredField {
        /// The name of the missing field.
        field: &'static str,
    },

    /// The HTTP client could not be created.
    #[error("Failed to create HTTP client: {reason}")]
    HttpClient {
        /// Why the client could not be created.
        reason: String,
    },

    /// The gate was built outside of a tokio runtime.
    #[error("No tokio runtime available. Build the RequestGate from within a tokio runtime.")]
    MissingRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_client_id_error_message() {
        let message = ConfigError::EmptyClientId.to_string();
        assert!(message.contains("Client id cannot be empty"));
    }

    #[test]
    fn test_invalid_api_url_error_message() {
        let error = ConfigError::InvalidApiUrl {
            url: "not a url".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("not a url"));
        assert!(message.contains("absolute"));
    }

    #[test]
    fn test_missing_required_field_error_message() {
        let error = ConfigError::MissingRequiredField { field: "token_url" };
        let message = error.to_string();
        assert!(message.contains("token_url"));
        assert!(message.contains("must be set"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let error = ConfigError::MissingRuntime;
        let _: &dyn std::error::Error = &error;
    }
}
