//! Seams between the gate and the host application.
//!
//! The gate never draws anything itself. Everything user-visible goes
//! through a [`Presenter`]; connectivity checks go through a
//! [`ConnectivityProbe`]; listener failures and rejected submissions are
//! reported to [`Diagnostics`].
//!
//! Defaults are provided for headless use: [`HeadlessPresenter`],
//! [`AlwaysConnected`] and [`TracingDiagnostics`].

use std::fmt;

use crate::clients::RequestId;
use crate::gate::{DismissHandle, PendingAction};

/// Screens the gate may navigate to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    /// The sign-in screen, after logout.
    SignIn,
    /// The account-linking screen.
    LinkAccount {
        /// Token from the last credential grant.
        external_token: Option<String>,
        /// Display name of the account to link.
        display_name: Option<String>,
    },
    /// The service-outage screen, after a 503.
    ServiceDown,
}

/// Kinds of error notice the gate asks the host to show.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The device is offline.
    NoConnectivity,
    /// The device is online but the request got no response.
    NetworkError,
    /// The server answered with something unreadable.
    TechnicalDifficulty,
    /// The server rejected the request and did not ask to display anything.
    ApiFailure,
}

/// Host UI callbacks.
///
/// Calls are never made while the gate holds an internal lock, so a
/// presenter may call back into the gate (e.g. dismiss synchronously).
pub trait Presenter: Send + Sync {
    /// Shows `action` to the user.
    ///
    /// Returns `false` if no presentation context is available; the action is
    /// then treated as dismissed. When returning `true`, the presenter must
    /// eventually call [`DismissHandle::dismiss`].
    fn present(&self, action: &PendingAction, dismiss: DismissHandle) -> bool;

    /// Navigates to `screen`.
    fn navigate_to(&self, screen: Screen);

    /// Shows an error notice.
    fn show_error(&self, kind: ErrorKind);
}

/// [`Presenter`] for hosts without UI. Nothing is shown; navigation and
/// error notices are logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessPresenter;

impl Presenter for HeadlessPresenter {
    fn present(&self, action: &PendingAction, _dismiss: DismissHandle) -> bool {
        tracing::debug!(action = %action.name, "no presentation context; dropping action");
        false
    }

    fn navigate_to(&self, screen: Screen) {
        tracing::info!(screen = ?screen, "navigation requested");
    }

    fn show_error(&self, kind: ErrorKind) {
        tracing::info!(kind = ?kind, "error notice requested");
    }
}

/// Reports whether the device is online.
pub trait ConnectivityProbe: Send + Sync {
    /// Returns `true` if a network is available.
    fn is_connected(&self) -> bool;
}

/// [`ConnectivityProbe`] that always reports a connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysConnected;

impl ConnectivityProbe for AlwaysConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// A problem worth reporting to crash/diagnostic tooling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// The request involved, if any.
    pub request_id: Option<RequestId>,
    /// The request URL, if any.
    pub url: Option<String>,
    /// The request cancel tag, if any.
    pub cancel_tag: Option<String>,
    /// Where the problem happened.
    pub context: &'static str,
    /// What happened.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)?;
        if let Some(url) = &self.url {
            write!(f, " (url: {url})")?;
        }
        if let Some(tag) = &self.cancel_tag {
            write!(f, " (tag: {tag})")?;
        }
        Ok(())
    }
}

/// Sink for [`Diagnostic`]s.
pub trait Diagnostics: Send + Sync {
    /// Records `diagnostic`.
    fn report(&self, diagnostic: &Diagnostic);
}

/// [`Diagnostics`] that logs at warn level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, diagnostic: &Diagnostic) {
        tracing::warn!(
            request_id = ?diagnostic.request_id,
            url = ?diagnostic.url,
            cancel_tag = ?diagnostic.cancel_tag,
            context = diagnostic.context,
            "{}",
            diagnostic.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display_includes_url_and_tag() {
        let diagnostic = Diagnostic {
            request_id: None,
            url: Some("https://api.example.com/loads".to_string()),
            cancel_tag: Some("search".to_string()),
            context: "listener",
            message: "boom".to_string(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "listener: boom (url: https://api.example.com/loads) (tag: search)"
        );
    }

    #[test]
    fn test_always_connected() {
        assert!(AlwaysConnected.is_connected());
    }
}
