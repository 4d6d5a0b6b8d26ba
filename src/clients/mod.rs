//! HTTP types for the request gate.
//!
//! This module provides the request and response layer underneath
//! [`RequestGate`](crate::RequestGate): the caller-facing request
//! descriptor, the wire request/response pair, and the transport seam.
//!
//! # Overview
//!
//! - [`RequestDescriptor`]: One logical request plus its routing metadata
//! - [`ApiOptions`]: Per-request behavior switches
//! - [`RetryPolicy`]: Per-attempt timeout and retry count
//! - [`ResponseShape`]: How a success body is decoded
//! - [`Transport`]: Sends one [`TransportRequest`] and returns a [`TransportResponse`]
//! - [`ReqwestTransport`]: The production transport
//!
//! # Retry Behavior
//!
//! Only attempts that produced no HTTP response are retried, up to
//! [`RetryPolicy::max_retries`] times. The default policy has a 15 second
//! timeout and no retries. Redirects are never followed by the transport.

mod errors;
mod http_request;
mod http_response;
mod transport;

pub use errors::{InvalidRequestError, RequestError, TransportError};
pub use http_request::{
    ApiOptions, HttpMethod, RequestDescriptor, RequestDescriptorBuilder, RequestId,
    ResponseShape, RetryPolicy, TransportRequest, AUTHORIZATION_HEADER, DEFAULT_CONTENT_TYPE,
};
pub use http_response::{parse_body, ResponseBody, TransportResponse};
pub use transport::{ReqwestTransport, Transport, LIBRARY_VERSION, RETRY_WAIT_MILLIS};
