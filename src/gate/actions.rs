//! Server-driven pending actions.
//!
//! A structured error body may carry a list of actions. They are resolved in
//! order against the requests the error applies to:
//!
//! | Action         | Effect                                                     |
//! |----------------|------------------------------------------------------------|
//! | `Display`      | queue the action for the presenter                         |
//! | `Logout`       | abort everything, clear credentials, go to sign-in         |
//! | `RefreshToken` | re-defer the request and refresh the credential            |
//! | `LinkAccount`  | abort everything, go to the account-linking screen         |
//!
//! Unless a `Logout`, `RefreshToken` or `LinkAccount` took ownership of the
//! outcome, every request then ends with `Error` and `Finally`. `Display`
//! actions are only queued for requests that end that way.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clients::{ApiOptions, RequestDescriptor, RequestError};
use crate::gate::sequencer::PendingActionEntry;
use crate::gate::GateInner;
use crate::lifecycle::LifecycleEvent;
use crate::presentation::{ErrorKind, Screen};

/// Kinds of action the gate understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Show the action to the user.
    Display,
    /// Force a logout.
    Logout,
    /// Refresh the credential and replay the request.
    RefreshToken,
    /// Send the user to the account-linking screen.
    LinkAccount,
}

impl ActionKind {
    /// Maps an action name to its kind.
    ///
    /// `display` and `logout` match case-insensitively; `RefreshToken` and
    /// `LinkAccount` must match exactly. Unknown names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("display") {
            Some(Self::Display)
        } else if name.eq_ignore_ascii_case("logout") {
            Some(Self::Logout)
        } else if name == "RefreshToken" {
            Some(Self::RefreshToken)
        } else if name == "LinkAccount" {
            Some(Self::LinkAccount)
        } else {
            None
        }
    }
}

/// A server-issued action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Action name, e.g. `Display` or `RefreshToken`.
    #[serde(default)]
    pub name: String,
    /// Text shown to the user.
    #[serde(default)]
    pub message: Option<String>,
    /// Link payloads, passed through to the presenter.
    #[serde(default)]
    pub links: Option<Vec<serde_json::Value>>,
}

impl PendingAction {
    /// Returns the action's kind, or `None` for unknown names.
    #[must_use]
    pub fn kind(&self) -> Option<ActionKind> {
        ActionKind::from_name(&self.name)
    }

    /// Coarse equality used to collapse duplicate prompts: same name, same
    /// message and the same number of links (both absent counts as equal).
    #[must_use]
    pub fn is_similar_to(&self, other: &Self) -> bool {
        self.name == other.name
            && self.message == other.message
            && match (&self.links, &other.links) {
                (None, None) => true,
                (Some(a), Some(b)) => a.len() == b.len(),
                _ => false,
            }
    }
}

/// A structured API error body.
///
/// # Example
///
/// ```rust
/// use request_gate::gate::{ActionKind, ApiErrorBody};
///
/// let body: ApiErrorBody = serde_json::from_str(
///     r#"{"message":"Please update","actions":[{"name":"Display","message":"Please update"}]}"#,
/// ).unwrap();
/// assert_eq!(body.actions[0].kind(), Some(ActionKind::Display));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Actions to resolve, in order.
    #[serde(default)]
    pub actions: Vec<PendingAction>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// OAuth error code.
    #[serde(default)]
    pub error: Option<String>,
    /// OAuth error description.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ApiErrorBody {
    /// Returns the most descriptive text in the body.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.error_description.as_deref())
            .or(self.error.as_deref())
    }
}

impl GateInner {
    /// Resolves `actions` against `targets`, the requests `error` applies to.
    pub(crate) fn resolve_actions(
        self: &Arc<Self>,
        targets: Vec<RequestDescriptor>,
        error: RequestError,
        actions: &[PendingAction],
    ) {
        let mut fire_default = true;
        let mut displays = Vec::new();

        for action in actions {
            match action.kind() {
                Some(ActionKind::Display) => displays.push(action),
                Some(ActionKind::Logout) => {
                    self.logout();
                    if fire_default {
                        for target in &targets {
                            self.emitter.aborted(target);
                        }
                    }
                    fire_default = false;
                }
                Some(ActionKind::RefreshToken) => {
                    fire_default = false;
                    self.redefer_for_refresh(&targets);
                }
                Some(ActionKind::LinkAccount) => {
                    if fire_default {
                        for target in &targets {
                            self.emitter.aborted(target);
                        }
                    }
                    fire_default = false;
                    self.abort_all();
                    let credentials = self.credentials.snapshot();
                    self.presenter.navigate_to(Screen::LinkAccount {
                        external_token: credentials.external_access_token,
                        display_name: credentials.link_account_name,
                    });
                }
                None => {
                    tracing::debug!(action = %action.name, "ignoring unknown action");
                }
            }
        }

        if fire_default {
            let mut displayed = HashSet::new();
            for action in displays {
                for target in &targets {
                    self.enqueue_display(PendingActionEntry::new(target.clone(), action.clone()));
                    displayed.insert(target.id());
                }
            }

            let mut notify = false;
            for target in &targets {
                self.emitter.failed(target, error.clone());
                if !displayed.contains(&target.id()) {
                    self.emitter.emit(target, &LifecycleEvent::UiDone);
                    notify |= !target.options().contains(ApiOptions::SILENT_API_FAILURE);
                }
            }
            if notify {
                self.presenter.show_error(ErrorKind::ApiFailure);
            }
        } else if !displays.is_empty() {
            tracing::debug!(count = displays.len(), "dropping display actions of settled requests");
        }

        self.advance_ui();
    }

    /// Puts `targets` back in the deferred queue and starts a credential
    /// refresh. Requests past the logon attempt limit fail instead.
    fn redefer_for_refresh(self: &Arc<Self>, targets: &[RequestDescriptor]) {
        let max = self.config.max_logon_attempts();
        let mut exhausted = Vec::new();
        {
            let mut state = self.state.lock();
            for target in targets {
                if target.logon_attempts >= max {
                    exhausted.push(target);
                    continue;
                }
                let mut target = target.clone();
                target.logon_attempts += 1;
                tracing::debug!(
                    request_id = %target.id(),
                    attempt = target.logon_attempts,
                    "re-deferring request for credential refresh"
                );
                state.deferred.push_back(target);
            }
        }

        for target in exhausted {
            tracing::warn!(request_id = %target.id(), max, "logon attempts exhausted");
            self.conclude_with_error(target, RequestError::LogonAttemptsExceeded { max });
        }

        if !self.state.lock().deferred.is_empty() {
            self.ensure_credentials();
        }
    }
}
