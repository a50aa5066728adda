//! Per-request trace records.
//!
//! A [`Tracer`] attached to a controller or a route receives one
//! [`TraceRecord`] after every request it served, successful or not.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::info;

use crate::engine::Stage;
use crate::mapper::MappedError;
use crate::middleware::ExecutionRecord;

/// Everything known about one finished request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    #[serde(serialize_with = "as_epoch_millis")]
    pub requested_at: SystemTime,
    #[serde(rename = "elapsedMs", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub route: String,
    pub method: String,
    pub status_code: u16,
    pub middlewares: Vec<ExecutionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MappedError>,
    /// The stage the request was in when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<Stage>,
    pub headers: Map<String, Value>,
}

/// Receives trace records. Called on the request's task after the response
/// is built, so keep it cheap or hand the record off.
pub trait Tracer: Send + Sync + 'static {
    fn trace(&self, record: &TraceRecord);
}

impl<F> Tracer for F
where
    F: Fn(&TraceRecord) + Send + Sync + 'static,
{
    fn trace(&self, record: &TraceRecord) {
        self(record)
    }
}

/// Emits every record as a structured `tracing` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn trace(&self, record: &TraceRecord) {
        let json = serde_json::to_string(record).unwrap_or_default();
        info!(
            target: "waypost::trace",
            route = %record.route,
            method = %record.method,
            status = record.status_code,
            elapsed_ms = millis(&record.elapsed),
            record = %json,
            "request traced"
        );
    }
}

fn millis(d: &Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

pub(crate) fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(millis(d))
}

fn as_epoch_millis<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    let millis = t.duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    s.serialize_u64(u64::try_from(millis).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn records_serialize_in_camel_case() {
        let record = TraceRecord {
            requested_at: UNIX_EPOCH + Duration::from_millis(1_500),
            elapsed: Duration::from_millis(3),
            route: "/users/{id}".into(),
            method: "GET".into(),
            status_code: 200,
            middlewares: vec![ExecutionRecord {
                middleware: "auth".into(),
                elapsed: Duration::from_millis(1),
                error: None,
            }],
            error: None,
            failed_at: None,
            headers: Map::new(),
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["requestedAt"], json!(1500));
        assert_eq!(v["elapsedMs"], json!(3.0));
        assert_eq!(v["statusCode"], json!(200));
        assert_eq!(v["middlewares"][0], json!({"middleware": "auth", "elapsedMs": 1.0}));
        assert!(v.get("error").is_none());
    }
}
