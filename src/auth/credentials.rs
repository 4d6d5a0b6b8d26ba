//! Credential storage for authenticated requests.
//!
//! [`CredentialState`] is the plain data (tokens, issue time, lifetime) and
//! [`CredentialStore`] is the single shared instance the gate reads for
//! admission checks and the token manager writes after a successful grant.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::auth::token::TokenResponse;

/// Username and password cached from the last successful login.
///
/// Used to bootstrap a session when a request needs a credential and no
/// refresh token exists. The password is masked in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    username: String,
    password: String,
}

impl LoginCredentials {
    /// Creates a new login.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"*****")
            .finish()
    }
}

/// The current OAuth credential.
///
/// The access token is valid iff it is present and `now < issued_at + expires_in`.
/// An unset `issued_at` counts as the Unix epoch and an unset lifetime as zero,
/// so a credential that was never stored is always expired.
///
/// A missing refresh token means the user is logged out.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    /// Bearer token sent with authenticated requests.
    pub access_token: Option<String>,
    /// Token exchanged for a new access token.
    pub refresh_token: Option<String>,
    /// When the access token was stored.
    pub issued_at: Option<DateTime<Utc>>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Whether the session belongs to a guest account.
    pub is_guest: bool,
    /// Token from the last grant, handed to the account-linking screen.
    pub external_access_token: Option<String>,
    /// Display name handed to the account-linking screen.
    pub link_account_name: Option<String>,
}

impl CredentialState {
    /// Returns `true` if a refresh token is present.
    #[must_use]
    pub const fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Returns `true` if the access token is present and unexpired at `now`.
    #[must_use]
    pub fn is_access_token_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_some() && now < self.expires_at()
    }

    /// Returns `true` if the access token is present and unexpired.
    #[must_use]
    pub fn is_access_token_valid(&self) -> bool {
        self.is_access_token_valid_at(Utc::now())
    }

    /// Returns the instant the access token stops being valid.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        let issued_at = self.issued_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Duration::try_seconds(self.expires_in)
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .unwrap_or(if self.expires_in < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }
}

fn mask(token: Option<&String>) -> &'static str {
    if token.is_some() {
        "Some(*****)"
    } else {
        "None"
    }
}

impl fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialState")
            .field("access_token", &mask(self.access_token.as_ref()))
            .field("refresh_token", &mask(self.refresh_token.as_ref()))
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .field("is_guest", &self.is_guest)
            .field("link_account_name", &self.link_account_name)
            .finish_non_exhaustive()
    }
}

/// Shared, thread-safe holder of the process credential.
///
/// Reads are free for admission checks; writes happen only when a credential
/// grant completes or on logout. Callers outside the crate cannot write it:
///
/// ```compile_fail
/// use request_gate::CredentialStore;
///
/// let store = CredentialStore::new(None);
/// store.clear();
/// ```
#[derive(Debug, Default)]
pub struct CredentialStore {
    state: RwLock<CredentialState>,
    login: RwLock<Option<LoginCredentials>>,
}

impl CredentialStore {
    /// Creates an empty (logged out) store with an optional cached login.
    #[must_use]
    pub fn new(login: Option<LoginCredentials>) -> Self {
        Self {
            state: RwLock::new(CredentialState::default()),
            login: RwLock::new(login),
        }
    }

    /// Returns a copy of the current credential.
    #[must_use]
    pub fn snapshot(&self) -> CredentialState {
        self.state.read().clone()
    }

    /// Returns `true` if a refresh token is present.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.state.read().has_refresh_token()
    }

    /// Returns `true` if the access token is present and unexpired.
    #[must_use]
    pub fn has_access_token(&self) -> bool {
        self.state.read().is_access_token_valid()
    }

    /// Returns the current access token, valid or not.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.state.read().access_token.clone()
    }

    /// Returns the current refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.state.read().refresh_token.clone()
    }

    /// Replaces the whole credential, e.g. with one restored from disk.
    pub(crate) fn replace(&self, state: CredentialState) {
        *self.state.write() = state;
    }

    /// Stores a token endpoint response issued at `now` and returns the new state.
    ///
    /// A response without a refresh token keeps the previous refresh token.
    pub(crate) fn store(&self, response: &TokenResponse, now: DateTime<Utc>) -> CredentialState {
        let mut state = self.state.write();
        state.access_token = Some(response.access_token.clone());
        state.external_access_token = Some(response.access_token.clone());
        if let Some(refresh_token) = &response.refresh_token {
            state.refresh_token = Some(refresh_token.clone());
        }
        state.expires_in = response.expires_in;
        state.issued_at = Some(now);
        state.is_guest = response.is_guest;
        state.clone()
    }

    /// Sets the name shown on the account-linking screen.
    pub fn set_link_account_name(&self, name: impl Into<String>) {
        self.state.write().link_account_name = Some(name.into());
    }

    /// Clears the credential. The cached login survives.
    pub(crate) fn clear(&self) {
        *self.state.write() = CredentialState::default();
    }

    /// Returns the cached login, if any.
    #[must_use]
    pub fn login(&self) -> Option<LoginCredentials> {
        self.login.read().clone()
    }

    /// Caches the login used for the next bootstrap.
    pub(crate) fn remember_login(&self, login: LoginCredentials) {
        *self.login.write() = Some(login);
    }
}

// Verify the store is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CredentialStore>();
};
