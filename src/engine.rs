//! The dispatch engine.
//!
//! [`App`] is the compiled form of a [`Registry`]: every controller built,
//! every middleware reference resolved, every path in the radix tree. Once
//! built it is read-only and shared across requests.
//!
//! Each request walks the same stages, in order, one at a time:
//!
//! ```text
//! Received → Normalized → Validated → MiddlewareRun → Handled → Responded
//!                └────────────┴────────────┴─────────────┴──→ Failed
//! ```
//!
//! A failure at any stage goes through the [`ErrorMapper`] and becomes the
//! response. Nothing a handler or middleware does, panics included, escapes
//! [`App::dispatch`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use futures::FutureExt;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::container::{Container, Injectable};
use crate::error::{Error, RequestError};
use crate::handler::BoxedHandler;
use crate::mapper::{ErrorMapper, MappedError, Settings};
use crate::method::Method;
use crate::middleware::{ExecutionRecord, Middleware, chain};
use crate::normalize::{self, RawInput};
use crate::registry::{Controller, Registry};
use crate::response::Response;
use crate::route::RouteDescriptor;
use crate::router::Router;
use crate::trace::{TraceRecord, Tracer};
use crate::validator::Validator;

/// Where a request is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Received,
    Normalized,
    Validated,
    MiddlewareRun,
    Handled,
    Responded,
    Failed,
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// One fully resolved route.
pub struct Endpoint {
    descriptor: RouteDescriptor,
    middleware: Vec<Arc<dyn Middleware>>,
    validator: Option<Arc<dyn Validator>>,
    tracer: Option<Arc<dyn Tracer>>,
    handler: BoxedHandler,
}

impl Endpoint {
    pub fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    async fn run(&self, raw: RawInput, mapper: &ErrorMapper) -> Response {
        let requested_at = SystemTime::now();
        let started = Instant::now();
        let headers = raw.headers.clone();
        let mut records = Vec::new();
        let mut stage = Stage::Received;

        let outcome = match self.process(raw, &mut stage, &mut records).await {
            Ok(value) => Response::render(self.descriptor.status, self.descriptor.response, &value),
            Err(failure) => Err(failure),
        };

        let (response, error, failed_at) = match outcome {
            Ok(response) => {
                stage = Stage::Responded;
                (response, None, None)
            }
            Err(failure) => {
                let failed_at = stage;
                stage = Stage::Failed;
                let (mapped, body) = mapper.respond(&failure, &self.descriptor.path);
                (Response::json(mapped.status(), &body), Some(mapped), Some(failed_at))
            }
        };
        debug!(route = %self.descriptor.path, ?stage, status = response.status.as_u16(), "request finished");

        if let Some(tracer) = &self.tracer {
            let record = TraceRecord {
                requested_at,
                elapsed: started.elapsed(),
                route: self.descriptor.path.clone(),
                method: self.descriptor.method.to_string(),
                status_code: response.status.as_u16(),
                middlewares: records,
                error,
                failed_at,
                headers,
            };
            // the response is already built and still goes out
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| tracer.trace(&record))) {
                error!(route = %self.descriptor.path, error = %RequestError::from_panic(panic), "tracer panicked");
            }
        }
        response
    }

    /// Runs the stages up to `Handled`. `stage` is left at the last stage
    /// reached, which is where a failure happened.
    async fn process(
        &self,
        raw: RawInput,
        stage: &mut Stage,
        records: &mut Vec<ExecutionRecord>,
    ) -> Result<Value, RequestError> {
        let mut req = normalize::map(raw, &self.descriptor.input);
        *stage = Stage::Normalized;

        if let Some(validator) = &self.validator {
            let data = std::mem::take(&mut req.data);
            req.data = std::panic::catch_unwind(AssertUnwindSafe(|| validator.validate(data)))
                .unwrap_or_else(|panic| Err(RequestError::from_panic(panic)))?;
        }
        *stage = Stage::Validated;

        chain::execute(&self.middleware, &mut req, records).await?;
        *stage = Stage::MiddlewareRun;

        let value = AssertUnwindSafe(self.handler.call(req))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RequestError::from_panic(panic)))?;
        *stage = Stage::Handled;
        Ok(value)
    }
}

// ── App ──────────────────────────────────────────────────────────────────────

/// A built application: routes resolved, ready to dispatch.
pub struct App {
    router: Router,
    endpoints: Vec<Arc<Endpoint>>,
    mapper: ErrorMapper,
}

impl App {
    pub fn builder(container: Container) -> AppBuilder {
        AppBuilder {
            container,
            registry: Registry::new(),
            settings: Settings::default(),
            error: None,
        }
    }

    /// Compiles `registry`, building controllers and middleware through
    /// `container`.
    pub fn build(container: &Container, registry: &Registry, settings: Settings) -> Result<Self, Error> {
        let mut router = Router::default();
        let mut endpoints = Vec::new();

        for controller in registry.controllers(container)? {
            let name = controller.name();
            for route in controller.routes {
                let middleware = route.middleware.iter()
                    .map(|m| m.resolve(container))
                    .collect::<Result<Vec<_>, _>>()?;
                let endpoint = Arc::new(Endpoint {
                    descriptor: route.descriptor,
                    middleware,
                    validator: route.validator,
                    tracer: route.tracer,
                    handler: route.handler,
                });
                router.insert(endpoint.descriptor.method, &endpoint.descriptor.path, Arc::clone(&endpoint))?;
                info!(
                    controller = name,
                    method = %endpoint.descriptor.method,
                    path = %endpoint.descriptor.path,
                    handler = endpoint.descriptor.handler,
                    middleware = endpoint.middleware.len(),
                    "route mapped"
                );
                endpoints.push(endpoint);
            }
        }

        Ok(Self { router, endpoints, mapper: ErrorMapper::new(settings) })
    }

    /// Every mapped route, in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.endpoints.iter().map(|e| e.descriptor())
    }

    /// Routes and serves one request. Path params come from the route match
    /// and replace any in `raw.params`.
    pub async fn dispatch(&self, method: Method, path: &str, mut raw: RawInput) -> Response {
        match self.router.lookup(method, path) {
            Some((endpoint, params)) => {
                raw.params = params;
                endpoint.run(raw, &self.mapper).await
            }
            None if self.router.knows(path) => {
                self.reject(&RequestError::domain(StatusCode::METHOD_NOT_ALLOWED, ""), path)
            }
            None => self.reject(&RequestError::domain(StatusCode::NOT_FOUND, ""), path),
        }
    }

    /// Renders a failure that happened outside any route, such as an
    /// unreadable body.
    pub fn reject(&self, failure: &RequestError, path: &str) -> Response {
        let (mapped, body): (MappedError, Value) = self.mapper.respond(failure, path);
        Response::json(mapped.status(), &body)
    }
}

/// Fluent construction of an [`App`].
pub struct AppBuilder {
    container: Container,
    registry: Registry,
    settings: Settings,
    error: Option<Error>,
}

impl AppBuilder {
    /// Adds a controller. Declaration errors are reported by
    /// [`build`](Self::build).
    pub fn controller<C: Injectable + Send + Sync + 'static>(mut self, controller: Controller<C>) -> Self {
        if let Err(e) = self.registry.register(controller) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn generic_error_message(mut self, message: impl Into<String>) -> Self {
        self.settings.generic_error_message = message.into();
        self
    }

    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.settings.expose_internal_errors = expose;
        self
    }

    pub fn build(self) -> Result<App, Error> {
        if let Some(e) = self.error {
            return Err(e);
        }
        App::build(&self.container, &self.registry, self.settings)
    }
}
