//! Integration tests for credential acquisition.
//!
//! These tests verify single-flight refresh and login, in-order replay of
//! deferred requests, bootstrap without credentials, and logout while a
//! grant is in flight.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use parking_lot::Mutex;
use request_gate::{
    AuthError, Callbacks, ChannelListener, EventKind, HttpMethod, LifecycleEvent, RequestDescriptor,
    RequestError, Screen, TransportError,
};
use serde_json::json;

fn get(path: &str, listener: ChannelListener) -> RequestDescriptor {
    RequestDescriptor::builder(HttpMethod::Get, format!("{API}{path}"))
        .listener(listener)
        .build()
}

// ============================================================================
// Single-flight refresh
// ============================================================================

#[tokio::test]
async fn test_concurrent_submits_share_one_refresh_and_replay_in_order() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    let release = transport.hold(TOKEN_URL, token_response("fresh"));
    for i in 0..3 {
        transport.respond(&format!("{API}/loads/{i}"), json(200, json!({ "load": i })));
    }
    let gate = gate(config(None), Some(expired_credentials()), &transport, &presenter);

    let mut receivers = Vec::new();
    for i in 0..3 {
        let (listener, rx) = ChannelListener::new();
        gate.submit(get(&format!("/loads/{i}"), listener)).unwrap();
        receivers.push(rx);
    }

    wait_for(|| transport.requests().len() == 1).await;
    assert!(gate.is_acquiring_credentials());
    assert_eq!(gate.deferred_len(), 3);
    assert_eq!(gate.in_flight_len(), 0);

    release.notify_one();

    for (i, rx) in receivers.iter_mut().enumerate() {
        let events = collect_until(rx, EventKind::Finally).await;
        assert_eq!(
            kinds(&events),
            vec![EventKind::Started, EventKind::Completed, EventKind::Finally]
        );
        assert_eq!(
            events[1],
            LifecycleEvent::Completed(request_gate::ResponseBody::Json(json!({ "load": i })))
        );
    }

    let sent = transport.requests();
    assert_eq!(sent.len(), 4);
    assert_eq!(transport.requests_to(TOKEN_URL).len(), 1);
    assert!(sent[0]
        .body
        .as_deref()
        .unwrap()
        .contains("grant_type=refresh_token&refresh_token=refresh-1"));

    let replayed: Vec<&str> = sent[1..].iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        replayed,
        vec![
            "https://api.example.com/loads/0",
            "https://api.example.com/loads/1",
            "https://api.example.com/loads/2",
        ]
    );
    for request in &sent[1..] {
        assert_eq!(request.header("Authorization"), Some("bearer fresh"));
    }

    assert!(!gate.is_acquiring_credentials());
    assert_eq!(gate.credentials().refresh_token().as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_refresh_calls_join_the_grant_in_flight() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    let release = transport.hold(TOKEN_URL, token_response("fresh"));
    let gate = gate(config(None), Some(expired_credentials()), &transport, &presenter);

    let first = gate.refresh();
    let second = gate.refresh();
    assert!(gate.is_acquiring_credentials());

    release.notify_one();
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap().access_token.as_deref(), Some("fresh"));
    assert_eq!(second.unwrap().access_token.as_deref(), Some("fresh"));
    assert_eq!(transport.requests_to(TOKEN_URL).len(), 1);
}

#[tokio::test]
async fn test_refresh_stays_pending_until_token_endpoint_answers() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    let release = transport.hold(TOKEN_URL, token_response("fresh"));
    let gate = gate(config(None), Some(expired_credentials()), &transport, &presenter);

    let mut refresh = tokio_test::task::spawn(gate.refresh());
    tokio_test::assert_pending!(refresh.poll());

    release.notify_one();
    wait_for(|| !gate.is_acquiring_credentials()).await;

    assert!(refresh.is_woken());
    let state = tokio_test::assert_ready_ok!(refresh.poll());
    assert_eq!(state.access_token.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_refresh_sends_basic_authorization_and_form_body() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    transport.respond(TOKEN_URL, token_response("fresh"));
    let gate = gate(config(None), Some(expired_credentials()), &transport, &presenter);

    gate.refresh().await.unwrap();

    let request = &transport.requests_to(TOKEN_URL)[0];
    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(
        request.header("Content-Type"),
        Some(request_gate::auth::FORM_CONTENT_TYPE)
    );
    assert!(request.header("Authorization").unwrap().starts_with("Basic "));
}

#[tokio::test]
async fn test_refresh_without_refresh_token_in_response_keeps_old_one() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    transport.respond(
        TOKEN_URL,
        json(200, json!({ "access_token": "fresh", "expires_in": 60 })),
    );
    let gate = gate(config(None), Some(expired_credentials()), &transport, &presenter);

    let state = gate.refresh().await.unwrap();

    assert_eq!(state.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(state.external_access_token.as_deref(), Some("fresh"));
    assert!(state.is_access_token_valid());
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_password_login_caches_login() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    transport.respond(TOKEN_URL, token_response("first"));
    let gate = gate(config(None), None, &transport, &presenter);

    let state = gate.login_with_password("jane", "p@ss").await.unwrap();

    assert_eq!(state.access_token.as_deref(), Some("first"));
    let body = transport.requests()[0].body.clone().unwrap();
    assert_eq!(body, "grant_type=password&username=jane&password=p%40ss");
    assert_eq!(gate.credentials().login().unwrap().username(), "jane");
}

#[tokio::test]
async fn test_external_grant_login() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    transport.respond(TOKEN_URL, token_response("linked"));
    let gate = gate(config(None), None, &transport, &presenter);

    let state = gate
        .login_with_external_grant("partner", "ticket-123")
        .await
        .unwrap();

    assert_eq!(state.external_access_token.as_deref(), Some("linked"));
    let body = transport.requests()[0].body.clone().unwrap();
    assert!(body.starts_with("grant_type=external_grant"));
    assert!(body.contains("external_provider=partner"));
    assert!(body.contains("ticket=ticket-123"));
    assert!(body.ends_with("ticket_type=token"));
}

#[tokio::test]
async fn test_rejected_login_returns_structured_error() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    transport.respond(
        TOKEN_URL,
        json(
            400,
            json!({ "error": "invalid_grant", "error_description": "Bad credentials" }),
        ),
    );
    let gate = gate(config(None), None, &transport, &presenter);

    let result = gate.login_with_password("jane", "wrong").await;

    match result {
        Err(AuthError::Rejected { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body.description(), Some("Bad credentials"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(gate.credentials().login().is_none());
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn test_bootstrap_uses_cached_login() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    transport.respond(TOKEN_URL, token_response("boot"));
    transport.respond(&format!("{API}/me"), json(200, json!({ "id": 7 })));
    let gate = gate(config(Some(("jane", "pw"))), None, &transport, &presenter);

    let (listener, mut rx) = ChannelListener::new();
    gate.submit(get("/me", listener)).unwrap();
    let events = collect_until(&mut rx, EventKind::Finally).await;

    assert_eq!(
        kinds(&events),
        vec![EventKind::Started, EventKind::Completed, EventKind::Finally]
    );
    let sent = transport.requests();
    assert!(sent[0].body.as_deref().unwrap().starts_with("grant_type=password"));
    assert_eq!(sent[1].header("Authorization"), Some("bearer boot"));
}

#[tokio::test]
async fn test_bootstrap_without_credentials_sends_user_to_sign_in() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    let gate = gate(config(None), None, &transport, &presenter);

    let (listener, mut rx) = ChannelListener::new();
    gate.submit(get("/me", listener)).unwrap();
    let events = collect_until(&mut rx, EventKind::UiDone).await;

    assert_eq!(
        events,
        vec![
            LifecycleEvent::Started,
            LifecycleEvent::Error(RequestError::Auth(AuthError::NoCredentials)),
            LifecycleEvent::Finally,
            LifecycleEvent::UiDone,
        ]
    );
    assert_eq!(presenter.screens(), vec![Screen::SignIn]);
    assert!(transport.requests().is_empty());
    assert_eq!(gate.deferred_len(), 0);
}

#[tokio::test]
async fn test_refresh_network_failure_fails_every_deferred_request_once() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    transport.fail(TOKEN_URL, TransportError::Timeout("token endpoint".to_string()));
    let gate = gate(config(None), Some(expired_credentials()), &transport, &presenter);

    let (first, mut first_rx) = ChannelListener::new();
    let (second, mut second_rx) = ChannelListener::new();
    gate.submit(get("/a", first)).unwrap();
    gate.submit(get("/b", second)).unwrap();

    for rx in [&mut first_rx, &mut second_rx] {
        let events = collect_until(rx, EventKind::UiDone).await;
        assert!(matches!(
            events[1],
            LifecycleEvent::Error(RequestError::Auth(AuthError::Network(
                TransportError::Timeout(_)
            )))
        ));
        assert_eq!(events[2], LifecycleEvent::Finally);
    }
    assert_eq!(presenter.errors(), vec![request_gate::ErrorKind::NetworkError]);
    assert!(!gate.is_acquiring_credentials());
}

#[tokio::test]
async fn test_refresh_outage_aborts_deferred_and_shows_service_down() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    transport.respond(TOKEN_URL, json(503, json!({})));
    let gate = gate(config(None), Some(expired_credentials()), &transport, &presenter);

    let (listener, mut rx) = ChannelListener::new();
    gate.submit(get("/a", listener)).unwrap();
    let events = collect_until(&mut rx, EventKind::Finally).await;

    assert_eq!(
        kinds(&events),
        vec![EventKind::Started, EventKind::Aborted, EventKind::Finally]
    );
    assert_eq!(presenter.screens(), vec![Screen::ServiceDown]);
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test]
async fn test_logout_discards_grant_in_flight() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    let release = transport.hold(TOKEN_URL, token_response("too-late"));
    let gate = gate(
        config(Some(("jane", "pw"))),
        Some(expired_credentials()),
        &transport,
        &presenter,
    );

    let (listener, mut rx) = ChannelListener::new();
    gate.submit(get("/a", listener)).unwrap();
    wait_for(|| transport.requests().len() == 1).await;

    gate.logout();

    let events = collect_until(&mut rx, EventKind::Finally).await;
    assert_eq!(
        kinds(&events),
        vec![EventKind::Started, EventKind::Aborted, EventKind::Finally]
    );
    assert_eq!(presenter.screens(), vec![Screen::SignIn]);
    assert!(!gate.is_acquiring_credentials());

    release.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!gate.credentials().has_access_token());
    assert!(!gate.credentials().has_refresh_token());
    assert_eq!(gate.credentials().login().unwrap().username(), "jane");
    assert_eq!(transport.requests().len(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_request_resubmitted_during_logout_does_not_restore_session() {
    let transport = ScriptedTransport::new();
    let presenter = RecordingPresenter::new();
    let release = transport.hold(TOKEN_URL, token_response("stale-grant"));
    transport.respond(TOKEN_URL, token_response("post-logout"));
    let gate = gate(config(None), Some(expired_credentials()), &transport, &presenter);

    let (next_listener, mut next_rx) = ChannelListener::new();
    let next = Arc::new(Mutex::new(Some(get("/next", next_listener))));
    let resubmit_gate = gate.clone();
    let listener = Callbacks::new().on_finally(move |_| {
        if let Some(request) = next.lock().take() {
            resubmit_gate.submit(request)?;
        }
        Ok(())
    });
    let first = RequestDescriptor::builder(HttpMethod::Get, format!("{API}/first"))
        .listener(listener)
        .build();
    gate.submit(first).unwrap();
    wait_for(|| transport.requests().len() == 1).await;

    gate.logout();

    let events = collect_until(&mut next_rx, EventKind::UiDone).await;
    assert_eq!(
        events,
        vec![
            LifecycleEvent::Started,
            LifecycleEvent::Error(RequestError::Auth(AuthError::NoCredentials)),
            LifecycleEvent::Finally,
            LifecycleEvent::UiDone,
        ]
    );

    release.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(transport.requests_to(TOKEN_URL).len(), 1);
    assert!(transport.requests_to(&format!("{API}/next")).is_empty());
    assert!(!gate.credentials().has_refresh_token());
    assert!(gate.credentials().access_token().is_none());
    assert!(presenter.screens().iter().all(|screen| *screen == Screen::SignIn));
}
