//! Shared fixtures for the integration tests.
//!
//! - [`ScriptedTransport`]: an in-memory transport answering from per-URL scripts
//! - [`RecordingPresenter`]: records everything the gate asks the host UI to do
//! - [`collect_until`]: drains a [`ChannelListener`] receiver up to an event kind

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use request_gate::{
    ApiUrl, ClientId, ClientSecret, ConnectivityProbe, CredentialState, DismissHandle, ErrorKind,
    EventKind, GateConfig, LifecycleEvent, LoginCredentials, PendingAction, Presenter, RequestGate,
    RequestId, Screen, Transport, TransportError, TransportRequest, TransportResponse,
};
use tokio::sync::{mpsc, Notify};

pub const TOKEN_URL: &str = "https://auth.example.com/oauth/token";
pub const API: &str = "https://api.example.com";

/// Builds a config for the test token endpoint.
pub fn config(login: Option<(&str, &str)>) -> GateConfig {
    let mut builder = GateConfig::builder()
        .token_url(ApiUrl::new(TOKEN_URL).unwrap())
        .client_id(ClientId::new("mobile-app").unwrap())
        .client_secret(ClientSecret::new("s3cret").unwrap());
    if let Some((username, password)) = login {
        builder = builder.login(LoginCredentials::new(username, password));
    }
    builder.build().unwrap()
}

/// A credential that is valid for the next hour.
pub fn valid_credentials(access_token: &str) -> CredentialState {
    CredentialState {
        access_token: Some(access_token.to_string()),
        refresh_token: Some("refresh-1".to_string()),
        issued_at: Some(chrono::Utc::now()),
        expires_in: 3600,
        ..CredentialState::default()
    }
}

/// A credential whose access token has expired but can be refreshed.
pub fn expired_credentials() -> CredentialState {
    CredentialState {
        access_token: Some("stale".to_string()),
        refresh_token: Some("refresh-1".to_string()),
        issued_at: Some(chrono::Utc::now() - chrono::Duration::hours(2)),
        expires_in: 3600,
        ..CredentialState::default()
    }
}

pub fn json(status: u16, body: serde_json::Value) -> TransportResponse {
    TransportResponse::new(status, HashMap::new(), body.to_string())
        .with_header("Content-Type", "application/json; charset=utf-8")
}

pub fn token_response(access_token: &str) -> TransportResponse {
    json(
        200,
        serde_json::json!({
            "access_token": access_token,
            "refresh_token": "refresh-2",
            "expires_in": 3600,
        }),
    )
}

pub fn redirect(location: &str) -> TransportResponse {
    TransportResponse::new(302, HashMap::new(), "").with_header("Location", location)
}

enum Reply {
    Respond(TransportResponse),
    Fail(TransportError),
    Hold(Arc<Notify>, TransportResponse),
}

/// Transport that answers each URL from a queue of scripted replies.
///
/// Unscripted URLs fail with a connect error.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    log: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, url: &str, reply: Reply) {
        self.replies
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn respond(&self, url: &str, response: TransportResponse) {
        self.push(url, Reply::Respond(response));
    }

    pub fn fail(&self, url: &str, error: TransportError) {
        self.push(url, Reply::Fail(error));
    }

    /// Scripts a reply that is only returned once the returned `Notify` fires.
    pub fn hold(&self, url: &str, response: TransportResponse) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(url, Reply::Hold(Arc::clone(&gate), response));
        gate
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.log.lock().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<TransportRequest> {
        self.log
            .lock()
            .iter()
            .filter(|request| request.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.log.lock().push(request.clone());
        let reply = self
            .replies
            .lock()
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Hold(gate, response)) => {
                gate.notified().await;
                Ok(response)
            }
            None => Err(TransportError::Connect(format!("unscripted url {}", request.url))),
        }
    }
}

/// Presenter that records calls. `present` keeps the dismiss handle unless
/// the presenter was created headless.
#[derive(Default)]
pub struct RecordingPresenter {
    headless: bool,
    pub presented: Mutex<Vec<PendingAction>>,
    pub handles: Mutex<VecDeque<DismissHandle>>,
    pub screens: Mutex<Vec<Screen>>,
    pub errors: Mutex<Vec<ErrorKind>>,
}

impl RecordingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn headless() -> Arc<Self> {
        Arc::new(Self {
            headless: true,
            ..Self::default()
        })
    }

    /// Dismisses the action currently on screen.
    pub fn dismiss_current(&self) {
        let handle = self.handles.lock().pop_front();
        if let Some(handle) = handle {
            handle.dismiss();
        }
    }

    pub fn screens(&self) -> Vec<Screen> {
        self.screens.lock().clone()
    }

    pub fn errors(&self) -> Vec<ErrorKind> {
        self.errors.lock().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn present(&self, action: &PendingAction, dismiss: DismissHandle) -> bool {
        self.presented.lock().push(action.clone());
        if self.headless {
            return false;
        }
        self.handles.lock().push_back(dismiss);
        true
    }

    fn navigate_to(&self, screen: Screen) {
        self.screens.lock().push(screen);
    }

    fn show_error(&self, kind: ErrorKind) {
        self.errors.lock().push(kind);
    }
}

/// Connectivity probe that always reports offline.
#[derive(Default)]
pub struct Offline;

impl ConnectivityProbe for Offline {
    fn is_connected(&self) -> bool {
        false
    }
}

/// Builds a gate wired to `transport` and `presenter`.
pub fn gate(
    config: GateConfig,
    credentials: Option<CredentialState>,
    transport: &Arc<ScriptedTransport>,
    presenter: &Arc<RecordingPresenter>,
) -> RequestGate {
    let mut builder = RequestGate::builder(config)
        .transport(Arc::clone(transport) as Arc<dyn Transport>)
        .presenter(Arc::clone(presenter) as Arc<dyn Presenter>);
    if let Some(credentials) = credentials {
        builder = builder.credentials(credentials);
    }
    builder.build().unwrap()
}

/// Receives events until one of `kind` arrives (inclusive).
pub async fn collect_until(
    rx: &mut mpsc::UnboundedReceiver<(RequestId, LifecycleEvent)>,
    kind: EventKind,
) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    loop {
        let (_, event) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for lifecycle event")
            .expect("listener channel closed");
        let done = event.kind() == kind;
        events.push(event);
        if done {
            return events;
        }
    }
}

pub fn kinds(events: &[LifecycleEvent]) -> Vec<EventKind> {
    events.iter().map(LifecycleEvent::kind).collect()
}

/// Yields until `condition` holds, failing after five seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
