//! Configuration types for the request gate.
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`GateConfig`]: The configuration struct holding all gate settings
//! - [`GateConfigBuilder`]: A builder for constructing [`GateConfig`] instances
//! - [`ClientId`]: A validated OAuth client id newtype
//! - [`ClientSecret`]: A validated OAuth client secret with masked debug output
//! - [`ApiUrl`]: A validated absolute URL
//!
//! # Example
//!
//! ```rust
//! use request_gate::{ApiUrl, ClientId, ClientSecret, GateConfig};
//!
//! let config = GateConfig::builder()
//!     .token_url(ApiUrl::new("https://api.example.com/token").unwrap())
//!     .client_id(ClientId::new("mobile-app").unwrap())
//!     .client_secret(ClientSecret::new("my-secret").unwrap())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.max_logon_attempts(), 3);
//! ```

mod newtypes;

pub use newtypes::{basic_authorization, ApiUrl, ClientId, ClientSecret};

use crate::auth::LoginCredentials;
use crate::clients::RetryPolicy;
use crate::error::ConfigError;

/// Default number of forced re-authentications a single request may go through.
pub const DEFAULT_MAX_LOGON_ATTEMPTS: u32 = 3;

/// Default number of consecutive redirects followed for a single request.
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Configuration for the request gate.
///
/// # Thread Safety
///
/// `GateConfig` is `Clone`, `Send`, and `Sync`.
#[derive(Clone, Debug)]
pub struct GateConfig {
    token_url: ApiUrl,
    client_id: ClientId,
    client_secret: ClientSecret,
    login: Option<LoginCredentials>,
    retry_policy: RetryPolicy,
    max_logon_attempts: u32,
    max_redirects: u32,
    user_agent_prefix: Option<String>,
}

impl GateConfig {
    /// Creates a new builder for constructing a `GateConfig`.
    #[must_use]
    pub fn builder() -> GateConfigBuilder {
        GateConfigBuilder::new()
    }

    /// Returns the OAuth token endpoint.
    #[must_use]
    pub const fn token_url(&self) -> &ApiUrl {
        &self.token_url
    }

    /// Returns the OAuth client id.
    #[must_use]
    pub const fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Returns the OAuth client secret.
    #[must_use]
    pub const fn client_secret(&self) -> &ClientSecret {
        &self.client_secret
    }

    /// Returns the cached login used to bootstrap a session, if configured.
    #[must_use]
    pub const fn login(&self) -> Option<&LoginCredentials> {
        self.login.as_ref()
    }

    /// Returns the retry policy applied to requests that do not override it.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Returns how many forced re-authentications a request may go through.
    #[must_use]
    pub const fn max_logon_attempts(&self) -> u32 {
        self.max_logon_attempts
    }

    /// Returns how many consecutive redirects are followed.
    #[must_use]
    pub const fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    /// Returns the user agent prefix, if configured.
    #[must_use]
    pub fn user_agent_prefix(&self) -> Option<&str> {
        self.user_agent_prefix.as_deref()
    }
}

// Verify GateConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<GateConfig>();
};

/// Builder for constructing [`GateConfig`] instances.
///
/// Required fields are `token_url`, `client_id` and `client_secret`.
///
/// # Defaults
///
/// - `retry_policy`: [`RetryPolicy::standard`] (15 second timeout, no retries)
/// - `max_logon_attempts`: 3
/// - `max_redirects`: 5
/// - `login`: `None`
/// - `user_agent_prefix`: `None`
#[derive(Debug, Default)]
pub struct GateConfigBuilder {
    token_url: Option<ApiUrl>,
    client_id: Option<ClientId>,
    client_secret: Option<ClientSecret>,
    login: Option<LoginCredentials>,
    retry_policy: Option<RetryPolicy>,
    max_logon_attempts: Option<u32>,
    max_redirects: Option<u32>,
    user_agent_prefix: Option<String>,
}

impl GateConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the OAuth token endpoint (required).
    #[must_use]
    pub fn token_url(mut self, url: ApiUrl) -> Self {
        self.token_url = Some(url);
        self
    }

    /// Sets the OAuth client id (required).
    #[must_use]
    pub fn client_id(mut self, id: ClientId) -> Self {
        self.client_id = Some(id);
        self
    }

    /// Sets the OAuth client secret (required).
    #[must_use]
    pub fn client_secret(mut self, secret: ClientSecret) -> Self {
        self.client_secret = Some(secret);
        self
    }

    /// Sets the login used when a request needs a credential and no refresh
    /// token exists.
    #[must_use]
    pub fn login(mut self, login: LoginCredentials) -> Self {
        self.login = Some(login);
        self
    }

    /// Sets the default retry policy.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets how many forced re-authentications a single request may go through.
    #[must_use]
    pub const fn max_logon_attempts(mut self, attempts: u32) -> Self {
        self.max_logon_attempts = Some(attempts);
        self
    }

    /// Sets how many consecutive redirects are followed.
    #[must_use]
    pub const fn max_redirects(mut self, redirects: u32) -> Self {
        self.max_redirects = Some(redirects);
        self
    }

    /// Sets the user agent prefix for HTTP requests.
    #[must_use]
    pub fn user_agent_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent_prefix = Some(prefix.into());
        self
    }

    /// Builds the [`GateConfig`], validating that required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequiredField`] if `token_url`,
    /// `client_id` or `client_secret` are not set.
    pub fn build(self) -> Result<GateConfig, ConfigError> {
        let token_url = self
            .token_url
            .ok_or(ConfigError::MissingRequiredField { field: "token_url" })?;
        let client_id = self
            .client_id
            .ok_or(ConfigError::MissingRequiredField { field: "client_id" })?;
        let client_secret = self
            .client_secret
            .ok_or(ConfigError::MissingRequiredField {
                field: "client_secret",
            })?;

        Ok(GateConfig {
            token_url,
            client_id,
            client_secret,
            login: self.login,
            retry_policy: self.retry_policy.unwrap_or_else(RetryPolicy::standard),
            max_logon_attempts: self
                .max_logon_attempts
                .unwrap_or(DEFAULT_MAX_LOGON_ATTEMPTS),
            max_redirects: self.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
            user_agent_prefix: self.user_agent_prefix,
        })
    }
}
