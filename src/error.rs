//! Error types.
//!
//! Two families live here and they never mix:
//!
//! - [`Error`]: infrastructure and registration failures. Returned while the
//!   application is being assembled (bad routes, bad middleware, missing
//!   dependencies) or while the transport binds its socket. These abort
//!   startup.
//! - [`RequestError`]: per-request failures raised by validators,
//!   middleware and handlers. These never escape the dispatch engine: they
//!   are mapped to a status code and a body by the
//!   [`ErrorMapper`](crate::mapper::ErrorMapper).

use std::any::Any;
use std::fmt;

use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// The error type returned by waypost's fallible setup operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    /// A route or controller declaration cannot be registered.
    #[error("invalid route declaration: {0}")]
    InvalidRouteDeclaration(String),

    /// A middleware reference could not be turned into a middleware instance.
    #[error("invalid middleware: {0}")]
    InvalidMiddleware(String),

    /// No entry is bound to the token.
    #[error("unregistered dependency `{0}`")]
    UnregisteredDependency(String),

    /// The token is bound, but to a value of another type.
    #[error("dependency `{token}` is not a `{expected}`")]
    DependencyType {
        token: String,
        expected: &'static str,
    },

    /// A constructor consumed more dependencies than it declared.
    #[error("`{target}` consumed undeclared dependency #{index}")]
    UndeclaredDependency {
        target: &'static str,
        index: usize,
    },
}

// ── Per-request failures ──────────────────────────────────────────────────────

/// One field-level validation problem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// A failure raised while serving one request.
///
/// Like `anyhow::Error`, this type does not implement [`std::error::Error`],
/// which lets every standard error convert into it with `?`. Such errors land
/// in [`RequestError::Unexpected`] and are answered with a 500.
///
/// ```rust
/// use http::StatusCode;
/// use waypost::RequestError;
///
/// fn load(id: &str) -> Result<u32, RequestError> {
///     let id: u32 = id.parse()?; // ParseIntError -> Unexpected
///     if id == 0 {
///         return Err(RequestError::domain(StatusCode::NOT_FOUND, "no such user"));
///     }
///     Ok(id)
/// }
/// # assert!(load("7").is_ok());
/// ```
pub enum RequestError {
    /// Input rejected by a validator. Answered with 422.
    Validation {
        message: String,
        details: Vec<FieldError>,
    },
    /// An application error with its own status. The message is sent as-is.
    Domain { status: StatusCode, message: String },
    /// An application-controlled payload, returned verbatim with `statusCode`.
    Custom {
        status: StatusCode,
        payload: Map<String, Value>,
    },
    /// Anything else. `internal` is a diagnostic and is not sent to clients
    /// unless the application opts in.
    Unexpected { internal: String },
}

impl RequestError {
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::Validation { message: message.into(), details }
    }

    pub fn domain(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Domain { status, message: message.into() }
    }

    pub fn custom(status: StatusCode, payload: Map<String, Value>) -> Self {
        Self::Custom { status, payload }
    }

    pub fn unexpected(internal: impl Into<String>) -> Self {
        Self::Unexpected { internal: internal.into() }
    }

    /// Wraps a panic payload caught with `catch_unwind`.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::Unexpected { internal: format!("panicked: {message}") }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message, details } => {
                write!(f, "validation failed: {message} ({} field errors)", details.len())
            }
            Self::Domain { status, message } => write!(f, "{status}: {message}"),
            Self::Custom { status, .. } => write!(f, "{status}: custom payload"),
            Self::Unexpected { internal } => write!(f, "unexpected: {internal}"),
        }
    }
}

impl fmt::Debug for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> From<E> for RequestError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(e: E) -> Self {
        let mut internal = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            internal.push_str(": ");
            internal.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Unexpected { internal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_errors_become_unexpected() {
        fn parse(s: &str) -> Result<i32, RequestError> {
            Ok(s.parse::<i32>()?)
        }
        match parse("nope") {
            Err(RequestError::Unexpected { internal }) => {
                assert!(internal.contains("invalid digit"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn setup_errors_become_unexpected_too() {
        let err: RequestError = Error::UnregisteredDependency("Mailer".into()).into();
        assert!(matches!(err, RequestError::Unexpected { ref internal } if internal.contains("Mailer")));
    }
}
