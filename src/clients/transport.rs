//! The wire seam of the request gate.
//!
//! [`Transport`] sends one [`TransportRequest`] and returns the raw
//! [`TransportResponse`]. The gate never follows redirects or interprets
//! statuses here; that is the classifier's job.
//!
//! [`ReqwestTransport`] is the production implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;

use crate::clients::errors::TransportError;
use crate::clients::http_request::{HttpMethod, TransportRequest};
use crate::clients::http_response::TransportResponse;
use crate::config::GateConfig;
use crate::error::ConfigError;

/// Fixed wait between retries of a failed attempt, in milliseconds.
pub const RETRY_WAIT_MILLIS: u64 = 500;

/// Library version from Cargo.toml.
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sends wire requests.
///
/// Implementations must not follow redirects: 3xx responses are returned as-is.
/// An `Err` means no HTTP response was received.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the raw response.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
///
/// - Redirects are never followed
/// - The request's [`RetryPolicy`](crate::clients::RetryPolicy) sets the
///   per-attempt timeout and how often an attempt without a response is retried
/// - A `User-Agent` and `Accept: application/json` are sent by default
///
/// # Thread Safety
///
/// `ReqwestTransport` is `Send + Sync` and cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    default_headers: HashMap<String, String>,
}

// Verify ReqwestTransport is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ReqwestTransport>();
};

impl ReqwestTransport {
    /// Creates a transport using `config`'s user agent prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be initialized.
    pub fn new(config: &GateConfig) -> Result<Self, ConfigError> {
        let user_agent_prefix = config
            .user_agent_prefix()
            .map_or(String::new(), |prefix| format!("{prefix} | "));
        let rust_version = env!("CARGO_PKG_RUST_VERSION");
        let user_agent =
            format!("{user_agent_prefix}Request Gate v{LIBRARY_VERSION} | Rust {rust_version}");

        let mut default_headers = HashMap::new();
        default_headers.insert("User-Agent".to_string(), user_agent);
        default_headers.insert("Accept".to_string(), "application/json".to_string());

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .redirect(Policy::none())
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            default_headers,
        })
    }

    /// Returns the headers sent with every request unless overridden.
    #[must_use]
    pub const fn default_headers(&self) -> &HashMap<String, String> {
        &self.default_headers
    }

    async fn attempt(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Patch => self.client.patch(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };

        for (key, value) in &self.default_headers {
            if request.header(key).is_none() {
                builder = builder.header(key, value);
            }
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(timeout) = request.retry_policy.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let res = builder.send().await?;

        let status = res.status().as_u16();
        let headers = Self::parse_response_headers(res.headers());
        let body = res.text().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    fn parse_response_headers(
        headers: &reqwest::header::HeaderMap,
    ) -> HashMap<String, Vec<String>> {
        let mut result: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in headers {
            let key = name.as_str().to_lowercase();
            let value = value.to_str().unwrap_or_default().to_string();
            result.entry(key).or_default().push(value);
        }
        result
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut retries: u32 = 0;
        loop {
            match self.attempt(&request).await {
                Ok(response) => return Ok(response),
                Err(error) if retries < request.retry_policy.max_retries() => {
                    retries += 1;
                    tracing::debug!(
                        url = %request.url,
                        retry = retries,
                        error = %error,
                        "retrying request after transport failure"
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_WAIT_MILLIS)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
