//! Normalized request handed to validators, middleware and handlers.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{FieldError, RequestError};

/// A normalized request.
///
/// `data` holds the declared input fields, already coerced and merged.
/// `context` starts empty and accumulates whatever the middleware chain
/// returns; by the time a handler sees the request both are settled.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub(crate) data: Map<String, Value>,
    pub(crate) context: Map<String, Value>,
    pub(crate) headers: Map<String, Value>,
}

impl Request {
    pub(crate) fn new(data: Map<String, Value>, headers: Map<String, Value>) -> Self {
        Self { data, context: Map::new(), headers }
    }

    pub fn data(&self) -> &Map<String, Value> { &self.data }
    pub fn context(&self) -> &Map<String, Value> { &self.context }

    /// All request headers, not only the declared ones.
    pub fn headers(&self) -> &Map<String, Value> { &self.headers }

    /// A field from `data`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// A key written by middleware.
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_str())
    }

    /// Deserializes `data` into `T`. A shape mismatch is a 422.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| RequestError::validation("invalid request data", vec![FieldError::new("data", e.to_string())]))
    }
}
