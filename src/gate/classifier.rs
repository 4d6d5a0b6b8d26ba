//! Outcome classification.
//!
//! [`classify`] is a pure function of one wire attempt's result. It runs on
//! the worker task that performed the attempt; routing the [`Outcome`]
//! happens afterwards on the coordination path.
//!
//! Precedence:
//!
//! 1. no response: [`Outcome::Network`]
//! 2. 2xx: [`Outcome::Completed`], or [`Outcome::Malformed`] if the body does not fit the shape
//! 3. 301/302/303 with a `Location`: [`Outcome::Redirect`]
//! 4. 503 unless `NO_503_HANDLING`: [`Outcome::ServiceOutage`]
//! 5. JSON error body: [`Outcome::Api`]
//! 6. anything else: [`Outcome::Unparseable`]

use reqwest::Url;

use crate::clients::{
    parse_body, ApiOptions, ResponseBody, ResponseShape, TransportError, TransportResponse,
};
use crate::gate::actions::ApiErrorBody;

/// The classified result of one wire attempt.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Outcome {
    Completed { status: u16, body: ResponseBody },
    Malformed { status: u16, reason: String },
    Network(TransportError),
    Redirect { status: u16, location: String },
    ServiceOutage,
    Api { status: u16, body: ApiErrorBody },
    Unparseable { status: u16 },
}

pub(crate) fn classify(
    result: Result<TransportResponse, TransportError>,
    options: ApiOptions,
    shape: ResponseShape,
) -> Outcome {
    let response = match result {
        Ok(response) => response,
        Err(error) => return Outcome::Network(error),
    };
    let status = response.status;

    if response.is_success() {
        return match parse_body(shape, &response) {
            Ok(body) => Outcome::Completed { status, body },
            Err(reason) => Outcome::Malformed { status, reason },
        };
    }

    if matches!(status, 301..=303) {
        if let Some(location) = response.location() {
            return Outcome::Redirect {
                status,
                location: location.to_string(),
            };
        }
    }

    if status == 503 && !options.contains(ApiOptions::NO_503_HANDLING) {
        return Outcome::ServiceOutage;
    }

    if response.is_json() {
        if let Ok(body) = serde_json::from_str::<ApiErrorBody>(&response.body) {
            return Outcome::Api { status, body };
        }
    }

    Outcome::Unparseable { status }
}

/// Resolves a `Location` header against the URL that produced it.
///
/// Absolute locations are used as-is; relative ones are resolved per RFC 3986.
///
/// Returns `None` if either URL cannot be parsed.
///
/// # Example
///
/// ```rust
/// use request_gate::gate::resolve_redirect;
///
/// let next = resolve_redirect("https://api.example.com/v1/loads?page=2", "/v2/loads").unwrap();
/// assert_eq!(next, "https://api.example.com/v2/loads");
/// ```
#[must_use]
pub fn resolve_redirect(origin: &str, location: &str) -> Option<String> {
    let origin = Url::parse(origin).ok()?;
    origin.join(location).ok().map(String::from)
}
