//! The request gate.
//!
//! [`RequestGate`] admits authenticated requests, defers them while a
//! credential is being acquired, replays them in order afterwards, routes
//! every outcome, and carries out the actions servers attach to errors.
//!
//! # Overview
//!
//! - [`RequestGate`]: The shared orchestration handle
//! - [`RequestGateBuilder`]: Wires the gate to its collaborators
//! - [`PendingAction`] / [`ApiErrorBody`]: Server-driven actions on error bodies
//! - [`DismissHandle`]: Lets a presenter report that an action was dismissed
//!
//! # Example
//!
//! ```rust,no_run
//! use request_gate::{
//!     ApiUrl, ChannelListener, ClientId, ClientSecret, GateConfig, HttpMethod,
//!     LifecycleEvent, RequestDescriptor, RequestGate,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GateConfig::builder()
//!     .token_url(ApiUrl::new("https://api.example.com/oauth/token")?)
//!     .client_id(ClientId::new("mobile-app")?)
//!     .client_secret(ClientSecret::new("secret")?)
//!     .build()?;
//! let gate = RequestGate::builder(config).build()?;
//! gate.login_with_password("jane", "hunter2").await?;
//!
//! let (listener, mut events) = ChannelListener::new();
//! let request = RequestDescriptor::builder(HttpMethod::Get, "https://api.example.com/loads")
//!     .listener(listener)
//!     .build();
//! gate.submit(request)?;
//!
//! while let Some((_, event)) = events.recv().await {
//!     if let LifecycleEvent::Completed(body) = event {
//!         println!("{body:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod actions;
mod classifier;
mod scheduler;
mod sequencer;
mod tokens;

pub use actions::{ActionKind, ApiErrorBody, PendingAction};
pub use classifier::resolve_redirect;
pub use sequencer::{DismissHandle, PendingActionEntry};
pub use tokens::CredentialFuture;

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::auth::{AuthError, CredentialState, CredentialStore, TokenGrant};
use crate::clients::{
    InvalidRequestError, RequestDescriptor, RequestId, ReqwestTransport, Transport,
};
use crate::config::GateConfig;
use crate::error::ConfigError;
use crate::lifecycle::Emitter;
use crate::presentation::{
    AlwaysConnected, ConnectivityProbe, Diagnostics, HeadlessPresenter, Presenter,
    TracingDiagnostics,
};
use scheduler::SchedulerState;
use sequencer::UiQueue;

pub(crate) struct GateInner {
    config: GateConfig,
    credentials: CredentialStore,
    transport: Arc<dyn Transport>,
    presenter: Arc<dyn Presenter>,
    connectivity: Arc<dyn ConnectivityProbe>,
    emitter: Emitter,
    runtime: Handle,
    state: Mutex<SchedulerState>,
    ui: Mutex<UiQueue>,
}

/// Shared handle to the request gate. Clones share all state.
///
/// # Thread Safety
///
/// `RequestGate` is `Send + Sync`. Submission never blocks on I/O; outcomes
/// arrive through each request's listener.
#[derive(Clone)]
pub struct RequestGate {
    inner: Arc<GateInner>,
}

// Verify RequestGate is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RequestGate>();
};

impl RequestGate {
    /// Creates a builder for a gate using `config`.
    #[must_use]
    pub fn builder(config: GateConfig) -> RequestGateBuilder {
        RequestGateBuilder::new(config)
    }

    /// Submits an authenticated request.
    ///
    /// `Started` fires immediately. The request is dispatched now if the
    /// credential is valid and nothing is waiting; otherwise it is deferred
    /// and a credential grant is started or joined.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError`] if the descriptor fails validation. The
    /// rejection is reported to diagnostics and no lifecycle events fire.
    pub fn submit(&self, request: RequestDescriptor) -> Result<RequestId, InvalidRequestError> {
        self.inner.submit(request)
    }

    /// Submits a request that needs no credential.
    ///
    /// When the device is offline the request fails without being sent.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError`] if the descriptor fails validation.
    pub fn submit_unauthenticated(
        &self,
        request: RequestDescriptor,
    ) -> Result<RequestId, InvalidRequestError> {
        self.inner.submit_unauthenticated(request)
    }

    /// Cancels every request tagged `tag`; returns how many were removed.
    ///
    /// In-flight requests get `Aborted` and `Finally`. Deferred requests are
    /// dropped without further events.
    pub fn cancel(&self, tag: &str) -> usize {
        self.inner.cancel(tag)
    }

    /// Aborts every in-flight and deferred request with `Aborted` and
    /// `Finally`, and drops display actions that have not been shown yet.
    pub fn abort_all(&self) {
        self.inner.abort_all();
    }

    /// Aborts everything, clears the credential and navigates to sign-in.
    ///
    /// The cached login survives. A grant in flight is discarded.
    pub fn logout(&self) {
        self.inner.logout();
    }

    /// Refreshes the credential, joining a grant already in flight.
    ///
    /// The future resolves with the stored credential. Deferred requests are
    /// replayed or failed whether or not the future is awaited.
    pub fn refresh(
        &self,
    ) -> impl Future<Output = Result<CredentialState, AuthError>> + Send + 'static {
        settle(self.inner.join_or_start(|gate| {
            gate.credentials
                .refresh_token()
                .map(|refresh_token| TokenGrant::RefreshToken { refresh_token })
                .ok_or(AuthError::NoCredentials)
        }))
    }

    /// Logs in with a username and password. On success the login is cached
    /// for later bootstraps.
    ///
    /// Joins the grant in flight, if any, instead of starting a new one.
    pub fn login_with_password(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> impl Future<Output = Result<CredentialState, AuthError>> + Send + 'static {
        let grant = TokenGrant::Password {
            username: username.into(),
            password: password.into(),
        };
        settle(self.inner.join_or_start(move |_| Ok(grant)))
    }

    /// Logs in with a ticket from an external identity provider.
    ///
    /// Joins the grant in flight, if any, instead of starting a new one.
    pub fn login_with_external_grant(
        &self,
        provider: impl Into<String>,
        ticket: impl Into<String>,
    ) -> impl Future<Output = Result<CredentialState, AuthError>> + Send + 'static {
        let grant = TokenGrant::ExternalGrant {
            provider: provider.into(),
            ticket: ticket.into(),
        };
        settle(self.inner.join_or_start(move |_| Ok(grant)))
    }

    /// Returns the credential store.
    ///
    /// Only the gate writes the credential; seed it with
    /// [`RequestGateBuilder::credentials`].
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// Returns how many requests wait for a credential.
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.inner.deferred_count()
    }

    /// Returns how many requests are on the wire.
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.inner.in_flight_count()
    }

    /// Returns how many display actions are showing or waiting.
    #[must_use]
    pub fn pending_display_len(&self) -> usize {
        self.inner.waiting_display_count()
    }

    /// Returns `true` while a credential grant is in flight.
    #[must_use]
    pub fn is_acquiring_credentials(&self) -> bool {
        self.inner.is_acquiring_credentials()
    }
}

fn settle(
    op: Result<CredentialFuture, AuthError>,
) -> impl Future<Output = Result<CredentialState, AuthError>> + Send + 'static {
    async move {
        match op {
            Ok(op) => op.await,
            Err(error) => Err(error),
        }
    }
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("config", &self.inner.config)
            .field("credentials", &self.inner.credentials)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestGate`].
///
/// # Defaults
///
/// - `transport`: [`ReqwestTransport`]
/// - `presenter`: [`HeadlessPresenter`]
/// - `connectivity`: [`AlwaysConnected`]
/// - `diagnostics`: [`TracingDiagnostics`]
/// - `runtime`: the current tokio runtime
pub struct RequestGateBuilder {
    config: GateConfig,
    credentials: Option<CredentialState>,
    transport: Option<Arc<dyn Transport>>,
    presenter: Option<Arc<dyn Presenter>>,
    connectivity: Option<Arc<dyn ConnectivityProbe>>,
    diagnostics: Option<Arc<dyn Diagnostics>>,
    runtime: Option<Handle>,
}

impl RequestGateBuilder {
    fn new(config: GateConfig) -> Self {
        Self {
            config,
            credentials: None,
            transport: None,
            presenter: None,
            connectivity: None,
            diagnostics: None,
            runtime: None,
        }
    }

    /// Seeds the credential store, e.g. with a credential restored from disk.
    #[must_use]
    pub fn credentials(mut self, credentials: CredentialState) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the presenter.
    #[must_use]
    pub fn presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Sets the connectivity probe.
    #[must_use]
    pub fn connectivity(mut self, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Sets the diagnostics sink.
    #[must_use]
    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Sets the runtime wire attempts and grants are spawned on.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the gate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRuntime`] if no runtime was set and none
    /// is current, or [`ConfigError::HttpClient`] if the default transport
    /// cannot be created.
    pub fn build(self) -> Result<RequestGate, ConfigError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?,
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };

        let credentials = CredentialStore::new(self.config.login().cloned());
        if let Some(state) = self.credentials {
            credentials.replace(state);
        }

        let inner = GateInner {
            credentials,
            transport,
            presenter: self.presenter.unwrap_or_else(|| Arc::new(HeadlessPresenter)),
            connectivity: self.connectivity.unwrap_or_else(|| Arc::new(AlwaysConnected)),
            emitter: Emitter::new(self.diagnostics.unwrap_or_else(|| Arc::new(TracingDiagnostics))),
            runtime,
            state: Mutex::new(SchedulerState::default()),
            ui: Mutex::new(UiQueue::default()),
            config: self.config,
        };

        Ok(RequestGate {
            inner: Arc::new(inner),
        })
    }
}

impl std::fmt::Debug for RequestGateBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiUrl, ClientId, ClientSecret};

    fn config() -> GateConfig {
        GateConfig::builder()
            .token_url(ApiUrl::new("https://auth.example.com/token").unwrap())
            .client_id(ClientId::new("app").unwrap())
            .client_secret(ClientSecret::new("secret").unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = RequestGate::builder(config()).build();
        assert!(matches!(result, Err(ConfigError::MissingRuntime)));
    }

    #[tokio::test]
    async fn test_build_inside_runtime_starts_empty() {
        let gate = RequestGate::builder(config()).build().unwrap();
        assert_eq!(gate.deferred_len(), 0);
        assert_eq!(gate.in_flight_len(), 0);
        assert_eq!(gate.pending_display_len(), 0);
        assert!(!gate.is_acquiring_credentials());
        assert!(!gate.credentials().has_refresh_token());
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails_fast() {
        let gate = RequestGate::builder(config()).build().unwrap();
        let result = gate.refresh().await;
        assert_eq!(result, Err(AuthError::NoCredentials));
        assert!(!gate.is_acquiring_credentials());
    }

    #[tokio::test]
    async fn test_seeded_credentials_are_used() {
        let state = CredentialState {
            access_token: Some("at".to_string()),
            refresh_token: Some("rt".to_string()),
            issued_at: Some(chrono::Utc::now()),
            expires_in: 3600,
            ..CredentialState::default()
        };
        let gate = RequestGate::builder(config()).credentials(state).build().unwrap();
        assert!(gate.credentials().has_access_token());
        assert!(gate.credentials().has_refresh_token());
    }
}
