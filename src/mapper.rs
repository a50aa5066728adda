//! Failure classification.
//!
//! Every [`RequestError`] becomes a [`MappedError`] with a numeric status and
//! a non-empty message. Classification runs in priority order: custom
//! payloads, then status-coded domain and validation errors, then
//! everything else as a 500 with a generic message.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, warn};

use crate::error::{FieldError, RequestError};

pub const DEFAULT_GENERIC_MESSAGE: &str = "Internal Server Error";

/// Error-mapping knobs, set per application.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Message sent for unexpected failures.
    pub generic_error_message: String,
    /// Also send the internal diagnostic of unexpected failures.
    pub expose_internal_errors: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            generic_error_message: DEFAULT_GENERIC_MESSAGE.to_owned(),
            expose_internal_errors: false,
        }
    }
}

/// The uniform shape of a failed request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedError {
    pub message: String,
    pub status_code: u16,
    /// The payload is the body, returned without the `{error, statusCode}` wrapper.
    pub custom: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
    #[serde(skip)]
    pub payload: Option<Map<String, Value>>,
    /// Internal diagnostic. Kept for logs and traces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal: Option<String>,
}

impl MappedError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// The response body for this failure.
    pub fn body(&self, expose_internal: bool) -> Value {
        if self.custom {
            let mut body = self.payload.clone().unwrap_or_default();
            body.insert("statusCode".to_owned(), json!(self.status_code));
            return Value::Object(body);
        }

        let mut body = Map::new();
        body.insert("error".to_owned(), json!(self.message));
        body.insert("statusCode".to_owned(), json!(self.status_code));
        if let Some(details) = &self.details {
            body.insert("details".to_owned(), json!(details));
        }
        if expose_internal {
            if let Some(internal) = &self.internal {
                body.insert("internal".to_owned(), json!(internal));
            }
        }
        Value::Object(body)
    }
}

/// Turns request failures into [`MappedError`]s and logs them.
#[derive(Clone, Debug, Default)]
pub struct ErrorMapper {
    settings: Settings,
}

impl ErrorMapper {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// `route` is only used to label the log line.
    pub fn map(&self, failure: &RequestError, route: &str) -> MappedError {
        match failure {
            RequestError::Custom { status, payload } => {
                warn!(route, status = status.as_u16(), "custom failure");
                MappedError {
                    message: non_empty(payload.get("message").and_then(Value::as_str).unwrap_or(""), *status),
                    status_code: status.as_u16(),
                    custom: true,
                    details: None,
                    payload: Some(payload.clone()),
                    internal: None,
                }
            }
            RequestError::Domain { status, message } => {
                warn!(route, status = status.as_u16(), %message, "request failed");
                MappedError {
                    message: non_empty(message, *status),
                    status_code: status.as_u16(),
                    custom: false,
                    details: None,
                    payload: None,
                    internal: None,
                }
            }
            RequestError::Validation { message, details } => {
                let status = StatusCode::UNPROCESSABLE_ENTITY;
                warn!(route, %message, fields = details.len(), "validation failed");
                MappedError {
                    message: non_empty(message, status),
                    status_code: status.as_u16(),
                    custom: false,
                    details: Some(details.clone()),
                    payload: None,
                    internal: None,
                }
            }
            RequestError::Unexpected { internal } => {
                error!(route, %internal, "unexpected failure");
                MappedError {
                    message: non_empty(&self.settings.generic_error_message, StatusCode::INTERNAL_SERVER_ERROR),
                    status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    custom: false,
                    details: None,
                    payload: None,
                    internal: Some(internal.clone()),
                }
            }
        }
    }

    /// [`map`](Self::map), then [`MappedError::body`] with this mapper's settings.
    pub fn respond(&self, failure: &RequestError, route: &str) -> (MappedError, Value) {
        let mapped = self.map(failure, route);
        let body = mapped.body(self.settings.expose_internal_errors);
        (mapped, body)
    }
}

fn non_empty(message: &str, status: StatusCode) -> String {
    if !message.trim().is_empty() {
        return message.to_owned();
    }
    status.canonical_reason().unwrap_or(DEFAULT_GENERIC_MESSAGE).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> ErrorMapper {
        ErrorMapper::default()
    }

    #[test]
    fn custom_payload_is_returned_verbatim() {
        let payload = json!({"code": "E42", "hint": "retry"}).as_object().cloned().unwrap();
        let (mapped, body) = mapper().respond(&RequestError::custom(StatusCode::CONFLICT, payload), "r");
        assert!(mapped.custom);
        assert_eq!(body, json!({"code": "E42", "hint": "retry", "statusCode": 409}));
        assert!(!mapped.message.is_empty());
    }

    #[test]
    fn domain_errors_keep_status_and_message() {
        let (mapped, body) = mapper().respond(&RequestError::domain(StatusCode::NOT_FOUND, "no such user"), "r");
        assert_eq!(mapped.status_code, 404);
        assert_eq!(body, json!({"error": "no such user", "statusCode": 404}));
    }

    #[test]
    fn empty_domain_message_falls_back_to_reason() {
        let mapped = mapper().map(&RequestError::domain(StatusCode::FORBIDDEN, ""), "r");
        assert_eq!(mapped.message, "Forbidden");
    }

    #[test]
    fn validation_is_422_with_details() {
        let failure = RequestError::validation("bad input", vec![FieldError::new("email", "is required")]);
        let (mapped, body) = mapper().respond(&failure, "r");
        assert_eq!(mapped.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["details"], json!([{"field": "email", "message": "is required"}]));
    }

    #[test]
    fn unexpected_hides_internals_by_default() {
        let failure = RequestError::unexpected("db exploded at 10.0.0.3");
        let (mapped, body) = mapper().respond(&failure, "r");
        assert_eq!(body, json!({"error": DEFAULT_GENERIC_MESSAGE, "statusCode": 500}));
        assert_eq!(mapped.internal.as_deref(), Some("db exploded at 10.0.0.3"));
    }

    #[test]
    fn unexpected_message_and_exposure_are_configurable() {
        let m = ErrorMapper::new(Settings {
            generic_error_message: "Something went wrong".into(),
            expose_internal_errors: true,
        });
        let (_, body) = m.respond(&RequestError::unexpected("stack"), "r");
        assert_eq!(body, json!({"error": "Something went wrong", "statusCode": 500, "internal": "stack"}));
    }
}
