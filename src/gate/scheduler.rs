//! Admission, dispatch and outcome routing.
//!
//! A request is owned by exactly one of:
//!
//! - the deferred queue, while it waits for a credential
//! - the in-flight set, while its wire attempt runs
//! - the routing step, once its outcome has been taken from the in-flight set
//!
//! Routing removes the request from the in-flight set first; an outcome for
//! a request that is no longer there (canceled, aborted) is dropped.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tokio::task::AbortHandle;

use crate::clients::{
    ApiOptions, InvalidRequestError, RequestDescriptor, RequestError, RequestId, TransportError,
};
use crate::gate::classifier::{classify, resolve_redirect, Outcome};
use crate::gate::tokens::CredentialFuture;
use crate::gate::GateInner;
use crate::lifecycle::LifecycleEvent;
use crate::presentation::{ErrorKind, Screen};

#[derive(Default)]
pub(crate) struct SchedulerState {
    pub(crate) deferred: VecDeque<RequestDescriptor>,
    pub(crate) in_flight: BTreeMap<RequestId, InFlight>,
    pub(crate) credential_op: Option<CredentialFuture>,
    /// Bumped on logout; grants from an older epoch are discarded.
    pub(crate) epoch: u64,
}

pub(crate) struct InFlight {
    descriptor: RequestDescriptor,
    abort: AbortHandle,
}

impl GateInner {
    /// Admits an authenticated request.
    pub(crate) fn submit(
        self: &Arc<Self>,
        mut descriptor: RequestDescriptor,
    ) -> Result<RequestId, InvalidRequestError> {
        self.verify(&descriptor)?;
        let id = descriptor.id();
        self.cancel_predecessors(&descriptor, true);
        self.emitter.emit(&descriptor, &LifecycleEvent::Started);

        let needs_credentials = {
            let mut state = self.state.lock();
            let credentials = self.credentials.snapshot();
            descriptor.authorize(credentials.access_token.as_deref());

            if !state.deferred.is_empty() {
                tracing::debug!(request_id = %id, "deferring behind waiting requests");
                state.deferred.push_back(descriptor);
                false
            } else if !credentials.has_refresh_token() || !credentials.is_access_token_valid() {
                tracing::debug!(
                    request_id = %id,
                    logged_in = credentials.has_refresh_token(),
                    "deferring until a credential is available"
                );
                state.deferred.push_back(descriptor);
                true
            } else {
                self.dispatch_locked(&mut state, descriptor);
                false
            }
        };

        if needs_credentials {
            self.ensure_credentials();
        }
        Ok(id)
    }

    /// Admits a request that needs no credential, e.g. a connectivity check.
    pub(crate) fn submit_unauthenticated(
        self: &Arc<Self>,
        descriptor: RequestDescriptor,
    ) -> Result<RequestId, InvalidRequestError> {
        self.verify(&descriptor)?;
        let id = descriptor.id();

        if !self.connectivity.is_connected() {
            self.emitter.emit(&descriptor, &LifecycleEvent::Started);
            tracing::debug!(request_id = %id, "offline; failing request without sending");
            self.emitter.failed(
                &descriptor,
                RequestError::Network(TransportError::Connect("no network connection".to_string())),
            );
            if !descriptor.options().contains(ApiOptions::SILENT_NETWORK_FAILURE) {
                self.presenter.show_error(ErrorKind::NoConnectivity);
            }
            self.emitter.emit(&descriptor, &LifecycleEvent::UiDone);
            return Ok(id);
        }

        self.cancel_predecessors(&descriptor, false);
        self.emitter.emit(&descriptor, &LifecycleEvent::Started);
        let mut state = self.state.lock();
        self.dispatch_locked(&mut state, descriptor);
        Ok(id)
    }

    fn verify(&self, descriptor: &RequestDescriptor) -> Result<(), InvalidRequestError> {
        descriptor.verify().map_err(|error| {
            self.emitter
                .report(descriptor, "submit", format!("rejected request: {error}"));
            error
        })
    }

    fn cancel_predecessors(&self, descriptor: &RequestDescriptor, include_deferred: bool) {
        if descriptor.options().contains(ApiOptions::CANCEL_ALL_PREVIOUS) {
            if let Some(tag) = descriptor.cancel_tag() {
                self.cancel_matching(tag, include_deferred);
            }
        }
    }

    /// Starts the wire attempt for `descriptor` and tracks it as in flight.
    ///
    /// The caller holds the state lock, so the attempt cannot be routed
    /// before it is tracked.
    pub(crate) fn dispatch_locked(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        descriptor: RequestDescriptor,
    ) {
        let id = descriptor.id();
        let request = descriptor.to_transport_request(self.config.retry_policy());
        let options = descriptor.options();
        let shape = descriptor.shape();
        tracing::debug!(
            request_id = %id,
            method = %request.method,
            url = %request.url,
            "dispatching request"
        );

        let this = Arc::clone(self);
        let task = self.runtime.spawn(async move {
            let result = this.transport.send(request).await;
            let outcome = classify(result, options, shape);
            this.route(id, outcome);
        });

        state.in_flight.insert(
            id,
            InFlight {
                descriptor,
                abort: task.abort_handle(),
            },
        );
    }

    fn route(self: &Arc<Self>, id: RequestId, outcome: Outcome) {
        let Some(InFlight { descriptor, .. }) = self.state.lock().in_flight.remove(&id) else {
            tracing::debug!(request_id = %id, "dropping outcome of untracked request");
            return;
        };

        match outcome {
            Outcome::Completed { status, body } => {
                tracing::debug!(request_id = %id, status, "request completed");
                self.emitter.emit(&descriptor, &LifecycleEvent::Completed(body));
                self.emitter.emit(&descriptor, &LifecycleEvent::Finally);
            }
            Outcome::Malformed { status, reason } => {
                tracing::warn!(
                    request_id = %id,
                    status,
                    reason = %reason,
                    "response did not match expected shape"
                );
                self.conclude_with_error(&descriptor, RequestError::Parse { reason });
            }
            Outcome::Network(error) => self.network_failure(&descriptor, error),
            Outcome::Redirect { location, .. } => self.follow_redirect(descriptor, &location),
            Outcome::ServiceOutage => {
                self.emitter.aborted(&descriptor);
                self.service_outage();
            }
            Outcome::Api { status, body } => {
                tracing::debug!(
                    request_id = %id,
                    status,
                    actions = body.actions.len(),
                    "structured API error"
                );
                let actions = body.actions.clone();
                let error = RequestError::Api { status, body };
                self.resolve_actions(vec![descriptor], error, &actions);
            }
            Outcome::Unparseable { status } => {
                tracing::warn!(request_id = %id, status, "unreadable error response");
                self.conclude_with_error(&descriptor, RequestError::Unparseable { status });
                if !descriptor.options().contains(ApiOptions::SILENT_NETWORK_FAILURE) {
                    self.presenter.show_error(ErrorKind::TechnicalDifficulty);
                }
            }
        }
    }

    fn network_failure(&self, descriptor: &RequestDescriptor, error: TransportError) {
        tracing::error!(
            request_id = %descriptor.id(),
            url = %descriptor.url,
            error = %error,
            "request got no response"
        );
        self.emitter
            .report(descriptor, "transport", format!("fatal network error: {error}"));
        self.emitter.failed(descriptor, RequestError::Network(error));
        if !descriptor.options().contains(ApiOptions::SILENT_NETWORK_FAILURE) {
            self.show_network_error();
        }
        self.emitter.emit(descriptor, &LifecycleEvent::UiDone);
    }

    fn follow_redirect(self: &Arc<Self>, mut descriptor: RequestDescriptor, location: &str) {
        descriptor.redirects += 1;
        let max = self.config.max_redirects();
        if descriptor.redirects > max {
            tracing::warn!(request_id = %descriptor.id(), max, "too many redirects");
            self.conclude_with_error(&descriptor, RequestError::TooManyRedirects { max });
            if !descriptor.options().contains(ApiOptions::SILENT_NETWORK_FAILURE) {
                self.presenter.show_error(ErrorKind::TechnicalDifficulty);
            }
            return;
        }

        let Some(url) = resolve_redirect(&descriptor.url, location) else {
            self.conclude_with_error(
                &descriptor,
                RequestError::InvalidRedirect {
                    location: location.to_string(),
                },
            );
            return;
        };

        tracing::debug!(
            request_id = %descriptor.id(),
            from = %descriptor.url,
            to = %url,
            "following redirect"
        );
        descriptor.url = url;
        let mut state = self.state.lock();
        self.dispatch_locked(&mut state, descriptor);
    }

    /// Emits `Error`, `Finally` and `UiDone`.
    pub(crate) fn conclude_with_error(&self, descriptor: &RequestDescriptor, error: RequestError) {
        self.emitter.failed(descriptor, error);
        self.emitter.emit(descriptor, &LifecycleEvent::UiDone);
    }

    pub(crate) fn show_network_error(&self) {
        if self.connectivity.is_connected() {
            self.presenter.show_error(ErrorKind::NetworkError);
        } else {
            self.presenter.show_error(ErrorKind::NoConnectivity);
        }
    }

    /// Cancels every request tagged `tag` and returns how many were removed.
    ///
    /// In-flight requests get `Aborted` and `Finally`; deferred ones are
    /// dropped without events.
    pub(crate) fn cancel(&self, tag: &str) -> usize {
        self.cancel_matching(tag, true)
    }

    fn cancel_matching(&self, tag: &str, include_deferred: bool) -> usize {
        let (canceled, dropped) = {
            let mut state = self.state.lock();
            let before = state.deferred.len();
            if include_deferred {
                state.deferred.retain(|descriptor| !descriptor.has_tag(tag));
            }
            let dropped = before - state.deferred.len();

            let ids: Vec<RequestId> = state
                .in_flight
                .iter()
                .filter(|(_, in_flight)| in_flight.descriptor.has_tag(tag))
                .map(|(id, _)| *id)
                .collect();
            let canceled: Vec<InFlight> = ids
                .iter()
                .filter_map(|id| state.in_flight.remove(id))
                .collect();
            (canceled, dropped)
        };

        for in_flight in &canceled {
            in_flight.abort.abort();
            self.emitter.aborted(&in_flight.descriptor);
        }

        tracing::debug!(
            tag,
            in_flight = canceled.len(),
            deferred = dropped,
            "canceled requests by tag"
        );
        canceled.len() + dropped
    }

    /// Aborts every tracked and deferred request and drops waiting display actions.
    pub(crate) fn abort_all(&self) {
        self.clear_waiting_displays();
        let (in_flight, deferred) = {
            let mut state = self.state.lock();
            let in_flight = std::mem::take(&mut state.in_flight);
            let deferred: Vec<_> = state.deferred.drain(..).collect();
            (in_flight, deferred)
        };

        tracing::info!(
            in_flight = in_flight.len(),
            deferred = deferred.len(),
            "aborting all requests"
        );
        for in_flight in in_flight.into_values() {
            in_flight.abort.abort();
            self.emitter.aborted(&in_flight.descriptor);
        }
        for descriptor in &deferred {
            self.emitter.aborted(descriptor);
        }
    }

    /// Clears the credential, aborts everything and navigates to sign-in.
    ///
    /// The credential is cleared under the state lock before any listener
    /// runs, so a request submitted from an `Aborted` or `Finally` callback
    /// cannot refresh the old session.
    pub(crate) fn logout(&self) {
        {
            let mut state = self.state.lock();
            self.credentials.clear();
            state.credential_op = None;
            state.epoch += 1;
        }
        self.abort_all();
        tracing::info!("logged out");
        self.presenter.navigate_to(Screen::SignIn);
    }

    pub(crate) fn service_outage(&self) {
        tracing::warn!("service outage reported; aborting all requests");
        self.abort_all();
        self.presenter.navigate_to(Screen::ServiceDown);
    }

    pub(crate) fn deferred_count(&self) -> usize {
        self.state.lock().deferred.len()
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub(crate) fn is_acquiring_credentials(&self) -> bool {
        self.state.lock().credential_op.is_some()
    }
}
