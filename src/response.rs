//! Outgoing HTTP response type.
//!
//! Handlers never build responses themselves. They return a value and the
//! engine renders it with the route's status and [`ContentType`]; failures
//! are always rendered as JSON.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde_json::Value;

use crate::error::RequestError;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Response type declared on a route.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ContentType {
    Html, // text/html; charset=utf-8
    #[default]
    Json, // application/json
    Text, // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
}

impl Response {
    /// Renders `value` as `content_type`.
    ///
    /// JSON serializes the value. Text and HTML send a string value verbatim
    /// and anything else as its JSON text.
    pub fn render(status: StatusCode, content_type: ContentType, value: &Value) -> Result<Self, RequestError> {
        let body = match (content_type, value) {
            (ContentType::Json, value) => serde_json::to_vec(value)?,
            (_, Value::String(s)) => s.clone().into_bytes(),
            (_, value) => value.to_string().into_bytes(),
        };
        Ok(Self::bytes_raw(status, content_type.as_str(), body))
    }

    /// A JSON response. Serializing a `Value` cannot fail.
    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self::bytes_raw(status, ContentType::Json.as_str(), value.to_string().into_bytes())
    }

    fn bytes_raw(status: StatusCode, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            body: Bytes::from(body),
        }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body parsed back as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(Full::new(self.body)).unwrap_or_else(|_| {
            let mut fallback = http::Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}
