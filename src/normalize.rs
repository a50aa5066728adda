//! Request normalization.
//!
//! Turns the raw pieces a transport hands over (headers, path params, query,
//! body) into one [`Request`] whose `data` holds the declared, coerced
//! fields. Later sources win on key collision:
//!
//! ```text
//! headers  <  params  <  query  <  body
//! ```

use serde_json::{Map, Value};

use crate::field::FieldSpec;
use crate::request::Request;

/// Raw transport input for one request.
#[derive(Clone, Debug, Default)]
pub struct RawInput {
    pub headers: Map<String, Value>,
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Value,
}

/// How the body is filtered through its field spec.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BodyFilter {
    /// Only the declared body fields survive.
    Restrict,
    /// The whole body is kept; declared fields are coerced in place.
    #[default]
    None,
}

/// Field specs for every input source of a route.
#[derive(Clone, Debug, Default)]
pub struct InputSpec {
    pub params: FieldSpec,
    pub query: FieldSpec,
    pub headers: FieldSpec,
    pub body: FieldSpec,
    pub body_filter: BodyFilter,
}

/// Rewrites top-level `parent[child]` keys into nested objects.
///
/// Keys sharing a parent merge into one object. Anything that is not an
/// object, and any key not of that exact shape, is left alone, so running
/// this twice changes nothing.
pub fn normalize_body(body: Value) -> Value {
    let Value::Object(fields) = body else { return body };

    let mut out = Map::with_capacity(fields.len());
    for (key, value) in fields {
        match split_bracket(&key) {
            Some((parent, child)) => {
                let slot = out
                    .entry(parent.to_owned())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(nested) = slot {
                    nested.insert(child.to_owned(), value);
                }
            }
            None => match out.get_mut(&key) {
                // `user[name]` seen before a plain `user` object: merge.
                Some(Value::Object(existing)) if value.is_object() => {
                    if let Value::Object(incoming) = value {
                        existing.extend(incoming);
                    }
                }
                _ => {
                    out.insert(key, value);
                }
            },
        }
    }
    Value::Object(out)
}

fn split_bracket(key: &str) -> Option<(&str, &str)> {
    let inner = key.strip_suffix(']')?;
    let (parent, child) = inner.split_once('[')?;
    let valid = !parent.is_empty() && !child.is_empty() && !child.contains(['[', ']']);
    valid.then_some((parent, child))
}

/// Normalizes `raw` against `spec`.
pub fn map(raw: RawInput, spec: &InputSpec) -> Request {
    let headers = spec.headers.extract_ignore_case(&raw.headers);
    let params = spec.params.extract(&raw.params);
    let query = spec.query.extract(&raw.query);

    let body = match normalize_body(raw.body) {
        Value::Object(body) => {
            let declared = spec.body.extract(&body);
            match spec.body_filter {
                BodyFilter::Restrict => declared,
                BodyFilter::None => {
                    let mut merged = body;
                    merged.extend(declared);
                    merged
                }
            }
        }
        _ => Map::new(),
    };

    let mut data = headers;
    data.extend(params);
    data.extend(query);
    data.extend(body);

    Request::new(data, raw.headers)
}
