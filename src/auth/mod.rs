//! Credential types for authenticated requests.
//!
//! # Overview
//!
//! - [`CredentialState`]: The current access/refresh token pair and its lifetime
//! - [`CredentialStore`]: The shared holder of the process credential
//! - [`LoginCredentials`]: A cached username/password used to bootstrap a session
//! - [`TokenGrant`]: A grant sent to the OAuth token endpoint
//! - [`TokenResponse`]: The token endpoint's successful answer
//! - [`AuthError`]: Why a credential could not be acquired
//!
//! Acquiring credentials is driven by [`RequestGate`](crate::RequestGate),
//! which guarantees at most one grant is outstanding at any time.
//!
//! # Example
//!
//! ```rust
//! use request_gate::auth::{CredentialStore, LoginCredentials};
//!
//! let store = CredentialStore::new(Some(LoginCredentials::new("jane", "hunter2")));
//! assert!(!store.has_refresh_token());
//! assert!(!store.has_access_token());
//! ```

mod credentials;
mod error;
mod token;

pub use credentials::{CredentialState, CredentialStore, LoginCredentials};
pub use error::AuthError;
pub use token::{TokenGrant, TokenResponse, FORM_CONTENT_TYPE};

pub(crate) use token::token_request;
