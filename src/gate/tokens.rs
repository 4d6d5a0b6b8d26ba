//! Single-flight credential acquisition.
//!
//! At most one token grant is outstanding at a time. Callers that need a
//! credential while a grant is running join it instead of starting another.
//! A driver task awaits every grant and, on completion, either replays the
//! deferred queue or fails it.
//!
//! Logout bumps the session epoch; a grant started before the logout neither
//! stores its credential nor touches the queue.

use std::sync::Arc;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;

use crate::auth::{
    token_request, AuthError, CredentialState, LoginCredentials, TokenGrant, TokenResponse,
};
use crate::clients::{ApiOptions, RequestError, ResponseShape};
use crate::gate::classifier::{classify, resolve_redirect, Outcome};
use crate::gate::scheduler::SchedulerState;
use crate::gate::GateInner;
use crate::presentation::{ErrorKind, Screen};

/// A credential grant that any number of callers may await.
pub type CredentialFuture = Shared<BoxFuture<'static, Result<CredentialState, AuthError>>>;

impl GateInner {
    /// Joins the running grant, or starts the one the current credential calls for.
    ///
    /// With a refresh token that is a refresh grant; without one it is a
    /// password grant using the cached login. With neither, the deferred
    /// queue fails and the user is sent to sign-in.
    pub(crate) fn ensure_credentials(self: &Arc<Self>) {
        let result = self.join_or_start(|gate| {
            if let Some(refresh_token) = gate.credentials.refresh_token() {
                return Ok(TokenGrant::RefreshToken { refresh_token });
            }
            gate.credentials
                .login()
                .map(|login| TokenGrant::Password {
                    username: login.username().to_string(),
                    password: login.password().to_string(),
                })
                .ok_or(AuthError::NoCredentials)
        });

        if let Err(error) = result {
            let epoch = self.state.lock().epoch;
            self.fail_deferred(error, epoch);
        }
    }

    /// Returns the running grant, or starts one built by `grant`.
    pub(crate) fn join_or_start(
        self: &Arc<Self>,
        grant: impl FnOnce(&Self) -> Result<TokenGrant, AuthError>,
    ) -> Result<CredentialFuture, AuthError> {
        let mut state = self.state.lock();
        if let Some(op) = &state.credential_op {
            tracing::debug!("joining credential grant in flight");
            return Ok(op.clone());
        }
        let grant = grant(self)?;
        Ok(self.start_grant_locked(&mut state, grant))
    }

    fn start_grant_locked(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        grant: TokenGrant,
    ) -> CredentialFuture {
        tracing::info!(grant_type = grant.grant_type(), "starting credential grant");
        let epoch = state.epoch;

        let this = Arc::clone(self);
        let op: CredentialFuture = async move { this.acquire(grant, epoch).await }
            .boxed()
            .shared();
        state.credential_op = Some(op.clone());

        let driver = op.clone();
        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = driver.await;
            this.finish_grant(result, epoch);
        });

        op
    }

    async fn acquire(
        self: Arc<Self>,
        grant: TokenGrant,
        epoch: u64,
    ) -> Result<CredentialState, AuthError> {
        let mut request = token_request(&self.config, &grant);
        let mut redirects = 0;

        loop {
            let result = self.transport.send(request.clone()).await;
            match classify(result, ApiOptions::empty(), ResponseShape::Json) {
                Outcome::Completed { status, body } => {
                    let response = body
                        .as_json()
                        .and_then(|value| TokenResponse::deserialize(value).ok())
                        .ok_or(AuthError::Unparseable { status })?;
                    return self.store_grant(&grant, &response, epoch);
                }
                Outcome::Redirect { status, location } => {
                    redirects += 1;
                    let max = self.config.max_redirects();
                    if redirects > max {
                        return Err(AuthError::TooManyRedirects { max });
                    }
                    request.url = resolve_redirect(&request.url, &location)
                        .ok_or(AuthError::Unparseable { status })?;
                    tracing::debug!(url = %request.url, "following token endpoint redirect");
                }
                Outcome::Network(error) => return Err(AuthError::Network(error)),
                Outcome::ServiceOutage => return Err(AuthError::ServiceOutage),
                Outcome::Api { status, body } => return Err(AuthError::Rejected { status, body }),
                Outcome::Malformed { status, .. } | Outcome::Unparseable { status } => {
                    return Err(AuthError::Unparseable { status });
                }
            }
        }
    }

    fn store_grant(
        &self,
        grant: &TokenGrant,
        response: &TokenResponse,
        epoch: u64,
    ) -> Result<CredentialState, AuthError> {
        let state = self.state.lock();
        if state.epoch != epoch {
            return Err(AuthError::Canceled);
        }
        let stored = self.credentials.store(response, Utc::now());
        if let TokenGrant::Password { username, password } = grant {
            self.credentials
                .remember_login(LoginCredentials::new(username.as_str(), password.as_str()));
        }
        drop(state);

        tracing::info!(
            grant_type = grant.grant_type(),
            expires_in = response.expires_in,
            is_guest = response.is_guest,
            "credential stored"
        );
        Ok(stored)
    }

    fn finish_grant(self: &Arc<Self>, result: Result<CredentialState, AuthError>, epoch: u64) {
        match result {
            Ok(_) => self.resume_deferred(epoch),
            Err(AuthError::Canceled) => {
                tracing::debug!("credential grant superseded by logout");
            }
            Err(error) => self.fail_deferred(error, epoch),
        }
    }

    /// Replays the deferred queue in FIFO order with the new credential.
    fn resume_deferred(self: &Arc<Self>, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return;
        }
        state.credential_op = None;

        let access_token = self.credentials.access_token();
        let deferred: Vec<_> = state.deferred.drain(..).collect();
        tracing::info!(count = deferred.len(), "replaying deferred requests");
        for mut descriptor in deferred {
            descriptor.reauthorize(access_token.as_deref());
            self.dispatch_locked(&mut state, descriptor);
        }
    }

    /// Ends the running grant with `error` and settles every deferred request.
    fn fail_deferred(self: &Arc<Self>, error: AuthError, epoch: u64) {
        let targets: Vec<_> = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return;
            }
            state.credential_op = None;
            state.deferred.drain(..).collect()
        };
        tracing::warn!(error = %error, waiting = targets.len(), "credential grant failed");

        match &error {
            AuthError::ServiceOutage => {
                for target in &targets {
                    self.emitter.aborted(target);
                }
                self.service_outage();
            }
            AuthError::Rejected { body, .. } => {
                let actions = body.actions.clone();
                self.resolve_actions(targets, RequestError::Auth(error), &actions);
            }
            AuthError::NoCredentials => {
                for target in &targets {
                    self.conclude_with_error(target, RequestError::Auth(error.clone()));
                }
                self.presenter.navigate_to(Screen::SignIn);
            }
            AuthError::Network(_) => {
                let notify = targets
                    .iter()
                    .any(|t| !t.options().contains(ApiOptions::SILENT_NETWORK_FAILURE));
                for target in &targets {
                    self.conclude_with_error(target, RequestError::Auth(error.clone()));
                }
                if notify {
                    self.show_network_error();
                }
            }
            AuthError::Unparseable { .. }
            | AuthError::TooManyRedirects { .. }
            | AuthError::Canceled => {
                let notify = targets
                    .iter()
                    .any(|t| !t.options().contains(ApiOptions::SILENT_NETWORK_FAILURE));
                for target in &targets {
                    self.conclude_with_error(target, RequestError::Auth(error.clone()));
                }
                if notify {
                    self.presenter.show_error(ErrorKind::TechnicalDifficulty);
                }
            }
        }
    }
}
