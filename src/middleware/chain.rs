//! Sequential, fail-fast middleware execution.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, warn};

use super::Middleware;
use crate::error::RequestError;
use crate::request::Request;
use crate::trace::as_millis;

/// What happened when one middleware ran. Only used for tracing.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub middleware: String,
    #[serde(rename = "elapsedMs", serialize_with = "as_millis")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs `chain` against `req` one middleware at a time.
///
/// Each returned object is merged into `req.context`, overriding existing
/// keys. The first failure is recorded and returned; the rest of the chain
/// does not run and context merged so far is kept. A panicking middleware
/// counts as a failure.
pub async fn execute(
    chain: &[Arc<dyn Middleware>],
    req: &mut Request,
    records: &mut Vec<ExecutionRecord>,
) -> Result<(), RequestError> {
    for middleware in chain {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(middleware.execute(req))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RequestError::from_panic(panic)));
        let elapsed = started.elapsed();

        match outcome {
            Ok(partial) => {
                debug!(middleware = middleware.name(), ?elapsed, keys = partial.len(), "middleware ran");
                req.context.extend(partial);
                records.push(ExecutionRecord {
                    middleware: middleware.name().to_owned(),
                    elapsed,
                    error: None,
                });
            }
            Err(e) => {
                warn!(middleware = middleware.name(), ?elapsed, error = %e, "middleware aborted the chain");
                records.push(ExecutionRecord {
                    middleware: middleware.name().to_owned(),
                    elapsed,
                    error: Some(e.to_string()),
                });
                return Err(e);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use http::StatusCode;
    use serde_json::{Map, Value, json};

    use super::*;

    struct Writes(Value, Arc<AtomicUsize>);

    #[async_trait]
    impl Middleware for Writes {
        async fn execute(&self, _req: &Request) -> Result<Map<String, Value>, RequestError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0.as_object().cloned().unwrap_or_default())
        }

        fn name(&self) -> &str { "writes" }
    }

    struct Fails;

    #[async_trait]
    impl Middleware for Fails {
        async fn execute(&self, _req: &Request) -> Result<Map<String, Value>, RequestError> {
            Err(RequestError::domain(StatusCode::FORBIDDEN, "nope"))
        }

        fn name(&self) -> &str { "fails" }
    }

    struct ReadsAuth;

    #[async_trait]
    impl Middleware for ReadsAuth {
        async fn execute(&self, req: &Request) -> Result<Map<String, Value>, RequestError> {
            let id = req.context_value("auth").and_then(|a| a.get("id")).cloned().unwrap_or(Value::Null);
            Ok(Map::from_iter([("seen".to_owned(), id)]))
        }
    }

    struct Panics;

    #[async_trait]
    impl Middleware for Panics {
        async fn execute(&self, _req: &Request) -> Result<Map<String, Value>, RequestError> {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn later_middleware_sees_earlier_context_and_overrides() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Writes(json!({"auth": {"id": 123}, "role": "user"}), calls.clone())),
            Arc::new(ReadsAuth),
            Arc::new(Writes(json!({"role": "admin"}), calls.clone())),
        ];
        let mut req = Request::default();
        let mut records = Vec::new();

        execute(&chain, &mut req, &mut records).await.unwrap();

        assert_eq!(req.context_value("seen"), Some(&json!(123)));
        assert_eq!(req.context_value("role"), Some(&json!("admin")));
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.error.is_none()));
    }

    #[tokio::test]
    async fn failure_stops_the_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Writes(json!({"a": 1}), calls.clone())),
            Arc::new(Fails),
            Arc::new(Writes(json!({"b": 2}), calls.clone())),
        ];
        let mut req = Request::default();
        let mut records = Vec::new();

        let err = execute(&chain, &mut req, &mut records).await.unwrap_err();

        assert!(matches!(err, RequestError::Domain { status: StatusCode::FORBIDDEN, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].middleware, "fails");
        assert!(records[1].error.is_some());
        // no rollback
        assert_eq!(req.context_value("a"), Some(&json!(1)));
        assert_eq!(req.context_value("b"), None);
    }

    #[tokio::test]
    async fn panics_are_recorded_as_failures() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(Panics)];
        let mut req = Request::default();
        let mut records = Vec::new();

        let err = execute(&chain, &mut req, &mut records).await.unwrap_err();

        assert!(matches!(err, RequestError::Unexpected { ref internal } if internal.contains("boom")));
        assert_eq!(records.len(), 1);
    }
}
