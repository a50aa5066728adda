//! Pre-handler validation of the merged input.
//!
//! A validator receives `data` after normalization and either returns it
//! (possibly transformed) or rejects it with field-level details. Rejections
//! are answered with `422 Unprocessable Entity`.

use serde_json::{Map, Value};

use crate::error::{FieldError, RequestError};

/// Checks, and may rewrite, a request's data.
pub trait Validator: Send + Sync + 'static {
    fn validate(&self, data: Map<String, Value>) -> Result<Map<String, Value>, RequestError>;
}

impl<F> Validator for F
where
    F: Fn(Map<String, Value>) -> Result<Map<String, Value>, RequestError> + Send + Sync + 'static,
{
    fn validate(&self, data: Map<String, Value>) -> Result<Map<String, Value>, RequestError> {
        self(data)
    }
}

/// Rejects data where any of the named fields is missing, `null` or `""`.
#[derive(Clone, Debug)]
pub struct Required(Vec<String>);

impl Required {
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl Validator for Required {
    fn validate(&self, data: Map<String, Value>) -> Result<Map<String, Value>, RequestError> {
        let details: Vec<FieldError> = self.0.iter()
            .filter(|name| match data.get(name.as_str()) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            })
            .map(|name| FieldError::new(name.as_str(), "is required"))
            .collect();

        if details.is_empty() {
            Ok(data)
        } else {
            Err(RequestError::validation("missing required fields", details))
        }
    }
}
