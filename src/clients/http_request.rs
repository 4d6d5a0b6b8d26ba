//! Request types for the request gate.
//!
//! This module provides [`RequestDescriptor`], the caller-facing description
//! of one logical request, its builder, and [`TransportRequest`], the
//! per-attempt wire request handed to a [`Transport`](crate::clients::Transport).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Url;

use crate::clients::errors::InvalidRequestError;
use crate::lifecycle::{NoopListener, RequestListener};

/// Name of the header carrying the credential.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Content type used for request bodies that do not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// HTTP methods supported by the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// HTTP GET method.
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP PATCH method.
    Patch,
    /// HTTP DELETE method.
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Patch => write!(f, "PATCH"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

bitflags! {
    /// Per-request behavior switches.
    ///
    /// # Example
    ///
    /// ```rust
    /// use request_gate::ApiOptions;
    ///
    /// let options = ApiOptions::CANCEL_ALL_PREVIOUS | ApiOptions::SILENT_NETWORK_FAILURE;
    /// assert!(options.contains(ApiOptions::CANCEL_ALL_PREVIOUS));
    /// assert!(!options.contains(ApiOptions::NO_503_HANDLING));
    /// ```
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ApiOptions: u32 {
        /// Cancel in-flight and deferred requests sharing this request's cancel tag.
        const CANCEL_ALL_PREVIOUS = 1 << 0;
        /// Do not show a UI error for API failures.
        const SILENT_API_FAILURE = 1 << 1;
        /// Do not show a UI error for network failures.
        const SILENT_NETWORK_FAILURE = 1 << 2;
        /// Treat 503 as an ordinary error response instead of a service outage.
        const NO_503_HANDLING = 1 << 3;
    }
}

/// Timeout and retry settings for a single request.
///
/// Retries cover attempts that produced no HTTP response at all. A response of
/// any status is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    timeout: Option<Duration>,
    max_retries: u32,
}

impl RetryPolicy {
    /// Creates a policy. `None` disables the per-attempt timeout.
    #[must_use]
    pub const fn new(timeout: Option<Duration>, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
        }
    }

    /// The default policy: a 15 second timeout and no retries.
    #[must_use]
    pub const fn standard() -> Self {
        Self::new(Some(Duration::from_secs(15)), 0)
    }

    /// The policy for image downloads: no timeout and 3 retries.
    #[must_use]
    pub const fn image() -> Self {
        Self::new(None, 3)
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns how many times a failed attempt is retried.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// How a successful response body is decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseShape {
    /// The body is ignored.
    Empty,
    /// The body is delivered as text.
    Text,
    /// The body must be JSON and is delivered as a [`serde_json::Value`].
    #[default]
    Json,
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a logical request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One logical request and everything the gate needs to route its outcome.
///
/// A descriptor is exclusively owned by exactly one of the deferred queue,
/// the in-flight set or the resolution step at any time. Cloning it produces
/// a second handle to the same request (same id, same listener) for event
/// delivery only.
///
/// # Example
///
/// ```rust
/// use request_gate::{ApiOptions, HttpMethod, RequestDescriptor, ResponseShape};
/// use serde_json::json;
///
/// let request = RequestDescriptor::builder(HttpMethod::Post, "https://api.example.com/loads")
///     .json_body(&json!({"origin": "Memphis"}))
///     .cancel_tag("load-search")
///     .options(ApiOptions::CANCEL_ALL_PREVIOUS)
///     .shape(ResponseShape::Json)
///     .build();
///
/// assert!(request.verify().is_ok());
/// ```
#[derive(Clone)]
pub struct RequestDescriptor {
    id: RequestId,
    pub(crate) method: HttpMethod,
    pub(crate) url: String,
    pub(crate) body: Option<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) cancel_tag: Option<String>,
    pub(crate) options: ApiOptions,
    pub(crate) shape: ResponseShape,
    pub(crate) retry_policy: Option<RetryPolicy>,
    pub(crate) listener: Arc<dyn RequestListener>,
    pub(crate) logon_attempts: u32,
    pub(crate) redirects: u32,
}

impl RequestDescriptor {
    /// Creates a new builder for a request to an absolute `url`.
    #[must_use]
    pub fn builder(method: HttpMethod, url: impl Into<String>) -> RequestDescriptorBuilder {
        RequestDescriptorBuilder::new(method, url)
    }

    /// Returns the request id.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the current URL. Redirects rewrite it.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the request body.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Returns the cancel tag.
    #[must_use]
    pub fn cancel_tag(&self) -> Option<&str> {
        self.cancel_tag.as_deref()
    }

    /// Returns the behavior switches.
    #[must_use]
    pub const fn options(&self) -> ApiOptions {
        self.options
    }

    /// Returns how the success body is decoded.
    #[must_use]
    pub const fn shape(&self) -> ResponseShape {
        self.shape
    }

    /// Returns how many forced re-authentications this request went through.
    #[must_use]
    pub const fn logon_attempts(&self) -> u32 {
        self.logon_attempts
    }

    pub(crate) fn listener(&self) -> &dyn RequestListener {
        self.listener.as_ref()
    }

    pub(crate) fn has_tag(&self, tag: &str) -> bool {
        self.cancel_tag.as_deref() == Some(tag)
    }

    /// Validates the request before it is admitted.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError`] if:
    /// - the URL is not an absolute `http`/`https` URL
    /// - a header name or value is not valid HTTP
    pub fn verify(&self) -> Result<(), InvalidRequestError> {
        let url = Url::parse(&self.url).map_err(|_| InvalidRequestError::InvalidUrl {
            url: self.url.clone(),
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(InvalidRequestError::InvalidUrl {
                url: self.url.clone(),
            });
        }

        for (name, value) in &self.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err()
                || HeaderValue::from_str(value).is_err()
            {
                return Err(InvalidRequestError::InvalidHeader { name: name.clone() });
            }
        }

        Ok(())
    }

    /// Sets the bearer credential header.
    pub(crate) fn authorize(&mut self, access_token: Option<&str>) {
        self.headers.insert(
            AUTHORIZATION_HEADER.to_string(),
            format!("bearer {}", access_token.unwrap_or_default()),
        );
    }

    /// Re-applies the bearer credential if the request carries one.
    pub(crate) fn reauthorize(&mut self, access_token: Option<&str>) {
        if self
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(AUTHORIZATION_HEADER))
        {
            self.headers
                .retain(|name, _| !name.eq_ignore_ascii_case(AUTHORIZATION_HEADER));
            self.authorize(access_token);
        }
    }

    /// Builds the wire request for the next attempt.
    pub(crate) fn to_transport_request(&self, default_policy: RetryPolicy) -> TransportRequest {
        let mut headers = self.headers.clone();
        if self.body.is_some() {
            headers.insert(
                "Content-Type".to_string(),
                self.content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            );
        }

        TransportRequest {
            method: self.method,
            url: self.url.clone(),
            headers,
            body: self.body.clone(),
            retry_policy: self.retry_policy.unwrap_or(default_policy),
        }
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("cancel_tag", &self.cancel_tag)
            .field("options", &self.options)
            .field("shape", &self.shape)
            .field("logon_attempts", &self.logon_attempts)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing [`RequestDescriptor`] instances.
pub struct RequestDescriptorBuilder {
    method: HttpMethod,
    url: String,
    body: Option<String>,
    content_type: Option<String>,
    headers: HashMap<String, String>,
    cancel_tag: Option<String>,
    options: ApiOptions,
    shape: ResponseShape,
    retry_policy: Option<RetryPolicy>,
    listener: Option<Arc<dyn RequestListener>>,
}

impl RequestDescriptorBuilder {
    fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            content_type: None,
            headers: HashMap::new(),
            cancel_tag: None,
            options: ApiOptions::empty(),
            shape: ResponseShape::default(),
            retry_policy: None,
            listener: None,
        }
    }

    /// Sets a raw request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON request body.
    #[must_use]
    pub fn json_body(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Sets the body content type. Defaults to [`DEFAULT_CONTENT_TYPE`].
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Adds a single header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the tag used for bulk cancellation.
    #[must_use]
    pub fn cancel_tag(mut self, tag: impl Into<String>) -> Self {
        self.cancel_tag = Some(tag.into());
        self
    }

    /// Sets the behavior switches.
    #[must_use]
    pub const fn options(mut self, options: ApiOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets how the success body is decoded. Defaults to JSON.
    #[must_use]
    pub const fn shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    /// Overrides the gate's default retry policy for this request.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the listener receiving this request's lifecycle events.
    #[must_use]
    pub fn listener(mut self, listener: impl RequestListener + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Sets a shared listener receiving this request's lifecycle events.
    #[must_use]
    pub fn shared_listener(mut self, listener: Arc<dyn RequestListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Builds the descriptor and assigns it a fresh [`RequestId`].
    ///
    /// Validation happens on submission; see [`RequestDescriptor::verify`].
    #[must_use]
    pub fn build(self) -> RequestDescriptor {
        RequestDescriptor {
            id: RequestId::next(),
            method: self.method,
            url: self.url,
            body: self.body,
            content_type: self.content_type,
            headers: self.headers,
            cancel_tag: self.cancel_tag,
            options: self.options,
            shape: self.shape,
            retry_policy: self.retry_policy,
            listener: self.listener.unwrap_or_else(|| Arc::new(NoopListener)),
            logon_attempts: 0,
            redirects: 0,
        }
    }
}

impl fmt::Debug for RequestDescriptorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptorBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// A single wire attempt handed to a [`Transport`](crate::clients::Transport).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportRequest {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The absolute URL.
    pub url: String,
    /// Request headers, `Content-Type` included when there is a body.
    pub headers: HashMap<String, String>,
    /// The request body.
    pub body: Option<String>,
    /// Timeout and retry settings.
    pub retry_policy: RetryPolicy,
}

impl TransportRequest {
    /// Returns the value of a header, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

// Verify descriptors can cross task boundaries
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RequestDescriptor>();
    assert_send_sync::<TransportRequest>();
};
