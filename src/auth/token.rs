//! OAuth token endpoint wire format.
//!
//! The token endpoint accepts a form-encoded POST authenticated with the
//! client's `Basic` header and answers with a JSON [`TokenResponse`].
//!
//! Three grants are supported:
//!
//! - [`TokenGrant::RefreshToken`]: exchange a refresh token for a new access token
//! - [`TokenGrant::Password`]: log in with a username and password
//! - [`TokenGrant::ExternalGrant`]: log in with a ticket from an external identity provider

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clients::{HttpMethod, RetryPolicy, TransportRequest, AUTHORIZATION_HEADER};
use crate::config::{basic_authorization, GateConfig};

/// Content type of token endpoint requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";
const PASSWORD_GRANT_TYPE: &str = "password";
const EXTERNAL_GRANT_TYPE: &str = "external_grant";
const EXTERNAL_TICKET_TYPE: &str = "token";

/// A credential grant sent to the token endpoint.
///
/// Secrets are masked in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenGrant {
    /// Exchange a refresh token for a new access token.
    RefreshToken {
        /// The refresh token to exchange.
        refresh_token: String,
    },
    /// Log in with a username and password.
    Password {
        /// Account username.
        username: String,
        /// Account password.
        password: String,
    },
    /// Log in with a ticket issued by an external identity provider.
    ExternalGrant {
        /// Identity provider name.
        provider: String,
        /// Provider-issued ticket.
        ticket: String,
    },
}

impl TokenGrant {
    /// Returns the OAuth `grant_type` value.
    #[must_use]
    pub const fn grant_type(&self) -> &'static str {
        match self {
            Self::RefreshToken { .. } => REFRESH_TOKEN_GRANT_TYPE,
            Self::Password { .. } => PASSWORD_GRANT_TYPE,
            Self::ExternalGrant { .. } => EXTERNAL_GRANT_TYPE,
        }
    }

    /// Returns the form fields of this grant, `grant_type` included.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![("grant_type", self.grant_type())];
        match self {
            Self::RefreshToken { refresh_token } => {
                fields.push(("refresh_token", refresh_token));
            }
            Self::Password { username, password } => {
                fields.push(("username", username));
                fields.push(("password", password));
            }
            Self::ExternalGrant { provider, ticket } => {
                fields.push(("external_provider", provider));
                fields.push(("ticket", ticket));
                fields.push(("ticket_type", EXTERNAL_TICKET_TYPE));
            }
        }
        fields
    }

    /// Encodes the grant as an `application/x-www-form-urlencoded` body.
    ///
    /// # Example
    ///
    /// ```rust
    /// use request_gate::auth::TokenGrant;
    ///
    /// let grant = TokenGrant::Password {
    ///     username: "jane@example.com".to_string(),
    ///     password: "p&ss".to_string(),
    /// };
    /// assert_eq!(
    ///     grant.to_form_body(),
    ///     "grant_type=password&username=jane%40example.com&password=p%26ss"
    /// );
    /// ```
    #[must_use]
    pub fn to_form_body(&self) -> String {
        self.form_fields()
            .into_iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RefreshToken { .. } => f
                .debug_struct("RefreshToken")
                .field("refresh_token", &"*****")
                .finish(),
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"*****")
                .finish(),
            Self::ExternalGrant { provider, .. } => f
                .debug_struct("ExternalGrant")
                .field("provider", provider)
                .field("ticket", &"*****")
                .finish(),
        }
    }
}

/// Successful token endpoint response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The new access token.
    pub access_token: String,
    /// The new refresh token, if one was issued.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: i64,
    /// Whether the account is a guest account.
    #[serde(default)]
    pub is_guest: bool,
}

/// Builds the token endpoint request for `grant`.
pub(crate) fn token_request(config: &GateConfig, grant: &TokenGrant) -> TransportRequest {
    let mut headers = HashMap::new();
    headers.insert(
        AUTHORIZATION_HEADER.to_string(),
        basic_authorization(config.client_id(), config.client_secret()),
    );
    headers.insert("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string());
    headers.insert("Accept".to_string(), "application/json".to_string());

    TransportRequest {
        method: HttpMethod::Post,
        url: config.token_url().to_string(),
        headers,
        body: Some(grant.to_form_body()),
        retry_policy: RetryPolicy::standard(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiUrl, ClientId, ClientSecret};

    fn config() -> GateConfig {
        GateConfig::builder()
            .token_url(ApiUrl::new("https://auth.example.com/oauth/token").unwrap())
            .client_id(ClientId::new("androidapp").unwrap())
            .client_secret(ClientSecret::new("s3cret").unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_refresh_grant_form_body() {
        let grant = TokenGrant::RefreshToken {
            refresh_token: "r/1+2".to_string(),
        };
        assert_eq!(
            grant.to_form_body(),
            "grant_type=refresh_token&refresh_token=r%2F1%2B2"
        );
    }

    #[test]
    fn test_external_grant_form_body() {
        let grant = TokenGrant::ExternalGrant {
            provider: "google".to_string(),
            ticket: "abc".to_string(),
        };
        assert_eq!(
            grant.to_form_body(),
            "grant_type=external_grant&external_provider=google&ticket=abc&ticket_type=token"
        );
    }

    #[test]
    fn test_token_request_uses_basic_auth_and_form_body() {
        let grant = TokenGrant::RefreshToken {
            refresh_token: "rt".to_string(),
        };
        let request = token_request(&config(), &grant);

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://auth.example.com/oauth/token");
        assert_eq!(
            request.headers.get(AUTHORIZATION_HEADER).map(String::as_str),
            Some("Basic YW5kcm9pZGFwcDpzM2NyZXQ=")
        );
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some(FORM_CONTENT_TYPE)
        );
        assert_eq!(
            request.body.as_deref(),
            Some("grant_type=refresh_token&refresh_token=rt")
        );
    }

    #[test]
    fn test_token_response_defaults_optional_fields() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at","expires_in":3600}"#).unwrap();
        assert_eq!(response.access_token, "at");
        assert_eq!(response.expires_in, 3600);
        assert!(response.refresh_token.is_none());
        assert!(!response.is_guest);
    }

    #[test]
    fn test_grant_debug_masks_secrets() {
        let grant = TokenGrant::Password {
            username: "jane".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{grant:?}");
        assert!(debug.contains("jane"));
        assert!(!debug.contains("hunter2"));
    }
}
