//! # Request Gate
//!
//! An orchestration layer for authenticated HTTP requests made by a client
//! application against a token-protected API.
//!
//! ## Overview
//!
//! This crate provides:
//! - Type-safe configuration via [`GateConfig`] and [`GateConfigBuilder`]
//! - A credential store with refresh and password grants against an OAuth token endpoint
//! - Single-flight credential acquisition: concurrent requests share one grant
//! - Deferral and in-order replay of requests that wait for a credential
//! - Lifecycle events per request via [`RequestListener`] (`Started`, `Completed`,
//!   `Error`, `Aborted`, `Finally`, `UiDone`)
//! - Server-driven actions on error responses (display, logout, refresh, account linking)
//! - One-at-a-time presentation of display actions with duplicate collapsing
//! - Cancel-by-tag, abort-all and logout
//!
//! ## Quick Start
//!
//! ```rust
//! use request_gate::{ApiUrl, ClientId, ClientSecret, GateConfig};
//!
//! let config = GateConfig::builder()
//!     .token_url(ApiUrl::new("https://api.example.com/oauth/token").unwrap())
//!     .client_id(ClientId::new("mobile-app").unwrap())
//!     .client_secret(ClientSecret::new("secret").unwrap())
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_redirects(), 5);
//! ```
//!
//! ## Sending Requests
//!
//! ```rust,no_run
//! use request_gate::{Callbacks, GateConfig, HttpMethod, RequestDescriptor, RequestGate};
//!
//! # async fn run(config: GateConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let gate = RequestGate::builder(config).build()?;
//!
//! let listener = Callbacks::new()
//!     .on_completed(|id, body| {
//!         println!("{id} completed: {body:?}");
//!         Ok(())
//!     })
//!     .on_error(|id, error| {
//!         eprintln!("{id} failed: {error}");
//!         Ok(())
//!     });
//!
//! let request = RequestDescriptor::builder(HttpMethod::Get, "https://api.example.com/loads")
//!     .cancel_tag("loads")
//!     .listener(listener)
//!     .build();
//! gate.submit(request)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Presentation
//!
//! The gate never draws anything itself. A [`Presenter`] shows display
//! actions, navigates to sign-in, account linking or the service-down
//! screen, and shows error notices. Without one, [`HeadlessPresenter`]
//! logs and settles display actions immediately.
//!
//! ## Thread Safety
//!
//! [`RequestGate`] is `Send + Sync` and cheap to clone. Wire attempts and
//! credential grants run as tasks on a tokio runtime.

pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod presentation;

// Re-export public types at crate root for convenience
pub use auth::{
    AuthError, CredentialState, CredentialStore, LoginCredentials, TokenGrant, TokenResponse,
};
pub use config::{ApiUrl, ClientId, ClientSecret, GateConfig, GateConfigBuilder};
pub use error::ConfigError;

// Re-export request and transport types
pub use clients::{
    ApiOptions, HttpMethod, InvalidRequestError, RequestDescriptor, RequestDescriptorBuilder,
    RequestError, RequestId, ReqwestTransport, ResponseBody, ResponseShape, RetryPolicy, Transport,
    TransportError, TransportRequest, TransportResponse,
};

// Re-export orchestration types
pub use gate::{
    ActionKind, ApiErrorBody, DismissHandle, PendingAction, RequestGate, RequestGateBuilder,
};
pub use lifecycle::{
    Callbacks, ChannelListener, EventKind, LifecycleEvent, ListenerError, NoopListener,
    RequestListener,
};
pub use presentation::{
    AlwaysConnected, ConnectivityProbe, Diagnostic, Diagnostics, ErrorKind, HeadlessPresenter,
    Presenter, Screen, TracingDiagnostics,
};
