//! Response types for the request gate.
//!
//! [`TransportResponse`] is the raw answer to one wire attempt;
//! [`ResponseBody`] is a successful body decoded by [`ResponseShape`].

use std::collections::HashMap;

use crate::clients::http_request::ResponseShape;

/// The raw HTTP response to one wire attempt.
///
/// Header names are stored lowercased.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers keyed by lowercased name.
    pub headers: HashMap<String, Vec<String>>,
    /// Response body text.
    pub body: String,
}

impl TransportResponse {
    /// Creates a response. Header names are lowercased.
    #[must_use]
    pub fn new(
        status: u16,
        headers: HashMap<String, Vec<String>>,
        body: impl Into<String>,
    ) -> Self {
        let headers = headers
            .into_iter()
            .fold(HashMap::new(), |mut acc: HashMap<String, Vec<String>>, (key, values)| {
                acc.entry(key.to_lowercase()).or_default().extend(values);
                acc
            });
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Adds a header value.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// Returns `true` for a 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns the first value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns the `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns `true` if the `Content-Type` is JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("application/json")
        })
    }

    /// Returns the `Location` header.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }
}

/// A successful response body, decoded per [`ResponseShape`].
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    /// The body was ignored.
    Empty,
    /// The body as text.
    Text(String),
    /// The body as JSON.
    Json(serde_json::Value),
}

impl ResponseBody {
    /// Returns the JSON value, if this is a JSON body.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the text, if this is a text body.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Decodes a successful response body.
///
/// # Errors
///
/// For [`ResponseShape::Json`], returns a reason if the content type is not
/// JSON or the body does not parse.
pub fn parse_body(
    shape: ResponseShape,
    response: &TransportResponse,
) -> Result<ResponseBody, String> {
    match shape {
        ResponseShape::Empty => Ok(ResponseBody::Empty),
        ResponseShape::Text => Ok(ResponseBody::Text(response.body.clone())),
        ResponseShape::Json => {
            if !response.is_json() {
                return Err(format!(
                    "expected a JSON response but the content type is {}",
                    response.content_type().unwrap_or("missing")
                ));
            }
            serde_json::from_str(&response.body)
                .map(ResponseBody::Json)
                .map_err(|e| format!("invalid JSON body: {e}"))
        }
    }
}
