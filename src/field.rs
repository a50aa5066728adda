//! Field specs: which transport fields to extract, and how to coerce them.
//!
//! A field is declared as `"name|type"`. Transport values arrive as strings
//! (headers, path params, query), so the type decides what the handler sees:
//!
//! | type      | coercion                                                   |
//! |-----------|------------------------------------------------------------|
//! | `string`  | stringified                                                |
//! | `integer` | non-digits stripped, then parsed; `0` when nothing is left |
//! | `number`  | leading numeric prefix as a float; `null` when there is none |
//! | `boolean` | `"true"` is `true`, anything else `false`                  |
//! | none      | passed through untouched                                   |

use serde_json::{Map, Number, Value};

/// Target type of a field.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    #[default]
    Passthrough,
}

impl FieldType {
    /// Unknown names fall back to passthrough.
    fn from_name(name: &str) -> Self {
        match name.trim() {
            "string"  => Self::String,
            "integer" => Self::Integer,
            "number"  => Self::Number,
            "boolean" => Self::Boolean,
            _         => Self::Passthrough,
        }
    }

    pub fn coerce(self, value: &Value) -> Value {
        match self {
            Self::Passthrough => value.clone(),
            Self::String => Value::String(stringify(value)),
            Self::Boolean => Value::Bool(match value {
                Value::Bool(b) => *b,
                Value::String(s) => s == "true",
                _ => false,
            }),
            Self::Integer => {
                let digits: String = stringify(value).chars().filter(char::is_ascii_digit).collect();
                match digits.parse::<u64>() {
                    Ok(n) => Value::from(n),
                    Err(_) if digits.is_empty() => Value::from(0),
                    // wider than u64: keep the magnitude as a float
                    Err(_) => digits
                        .parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .map_or(Value::from(0), Value::Number),
                }
            }
            Self::Number => match value {
                Value::Number(n) => Value::Number(n.clone()),
                other => leading_float(&stringify(other))
                    .and_then(Number::from_f64)
                    .map_or(Value::Null, Value::Number),
            },
        }
    }
}

/// Parses the longest numeric prefix of `s`, so `"12abc"` is `12.0`.
fn leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let end = s
        .find(|c: char| !matches!(c, '0'..='9' | '+' | '-' | '.' | 'e' | 'E'))
        .unwrap_or(s.len());
    (1..=end).rev().find_map(|i| s[..i].parse::<f64>().ok())
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One declared field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
}

impl Field {
    /// Parses `"name|type"`. A name without a suffix is passthrough.
    pub fn parse(decl: &str) -> Self {
        match decl.split_once('|') {
            Some((name, ty)) => Self { name: name.trim().to_owned(), ty: FieldType::from_name(ty) },
            None => Self { name: decl.trim().to_owned(), ty: FieldType::Passthrough },
        }
    }
}

/// An ordered list of declared fields.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldSpec(Vec<Field>);

impl FieldSpec {
    pub fn new<I, S>(decls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(decls.into_iter().map(|d| Field::parse(d.as_ref())).collect())
    }

    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies the declared fields out of `source`, coerced. Fields missing
    /// from `source` are left out rather than defaulted.
    pub fn extract(&self, source: &Map<String, Value>) -> Map<String, Value> {
        self.0
            .iter()
            .filter_map(|f| source.get(&f.name).map(|v| (f.name.clone(), f.ty.coerce(v))))
            .collect()
    }

    /// Like [`extract`](Self::extract), matching names case-insensitively.
    /// Output keys keep the declared spelling.
    pub(crate) fn extract_ignore_case(&self, source: &Map<String, Value>) -> Map<String, Value> {
        self.0
            .iter()
            .filter_map(|f| {
                source
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(&f.name))
                    .map(|(_, v)| (f.name.clone(), f.ty.coerce(v)))
            })
            .collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for FieldSpec {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
