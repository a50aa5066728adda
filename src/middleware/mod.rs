//! Middleware layer.
//!
//! A middleware looks at the normalized request before the handler runs and
//! returns a partial context object. The chain merges every returned object
//! into `request.context`, in declaration order, so later middleware can read
//! what earlier ones wrote. Returning an error aborts the chain.
//!
//! Routes reference middleware through [`MiddlewareRef`]. Every reference is
//! turned into an instance once, when the application is built, never per
//! request.

use std::any::type_name;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::container::{Container, Injectable};
use crate::error::{Error, RequestError};
use crate::request::Request;

pub mod chain;

pub use chain::ExecutionRecord;

/// A step run before the handler.
///
/// ```rust
/// use async_trait::async_trait;
/// use http::StatusCode;
/// use serde_json::{json, Map, Value};
/// use waypost::{Middleware, Request, RequestError};
///
/// struct Auth;
///
/// #[async_trait]
/// impl Middleware for Auth {
///     async fn execute(&self, req: &Request) -> Result<Map<String, Value>, RequestError> {
///         match req.header("authorization") {
///             Some(_) => Ok(json!({"auth": {"id": 123}}).as_object().cloned().unwrap_or_default()),
///             None => Err(RequestError::domain(StatusCode::UNAUTHORIZED, "missing credentials")),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn execute(&self, req: &Request) -> Result<Map<String, Value>, RequestError>;

    /// Name used in execution records.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

type Build = Arc<dyn Fn(&Container) -> Result<Arc<dyn Middleware>, Error> + Send + Sync>;
type Make = Arc<dyn Fn() -> Arc<dyn Middleware> + Send + Sync>;

/// How a route refers to a middleware.
#[derive(Clone)]
pub enum MiddlewareRef {
    /// A type built by the container, once per route.
    Injected { name: &'static str, build: Build },
    /// A ready instance, shared as-is.
    Instance(Arc<dyn Middleware>),
    /// A zero-argument factory, called once per route.
    Factory(Make),
    /// An `Arc<dyn Middleware>` bound to a token in the container.
    Named(String),
}

impl MiddlewareRef {
    pub fn injected<M: Middleware + Injectable>() -> Self {
        Self::Injected {
            name: type_name::<M>(),
            build: Arc::new(|c: &Container| -> Result<Arc<dyn Middleware>, Error> {
                Ok(Arc::new(c.build::<M>()?) as Arc<dyn Middleware>)
            }),
        }
    }

    pub fn instance(middleware: impl Middleware) -> Self {
        Self::Instance(Arc::new(middleware))
    }

    pub fn factory<M, F>(make: F) -> Self
    where
        M: Middleware,
        F: Fn() -> M + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(move || Arc::new(make()) as Arc<dyn Middleware>))
    }

    pub fn named(token: impl Into<String>) -> Self {
        Self::Named(token.into())
    }

    pub(crate) fn resolve(&self, container: &Container) -> Result<Arc<dyn Middleware>, Error> {
        match self {
            Self::Injected { name, build } => build(container).map_err(|e| match e {
                Error::UnregisteredDependency(_) => e,
                other => Error::InvalidMiddleware(format!("{name}: {other}")),
            }),
            Self::Instance(middleware) => Ok(Arc::clone(middleware)),
            Self::Factory(make) => Ok(make()),
            Self::Named(token) => match container.resolve::<Arc<dyn Middleware>>(token) {
                Ok(middleware) => Ok(Arc::clone(middleware.as_ref())),
                Err(Error::DependencyType { token, .. }) => Err(Error::InvalidMiddleware(format!(
                    "`{token}` is bound to something that is not a middleware"
                ))),
                Err(e) => Err(e),
            },
        }
    }
}

impl std::fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Injected { name, .. } => f.debug_tuple("Injected").field(name).finish(),
            Self::Instance(m) => f.debug_tuple("Instance").field(&m.name()).finish(),
            Self::Factory(_) => f.write_str("Factory"),
            Self::Named(token) => f.debug_tuple("Named").field(token).finish(),
        }
    }
}

/// Binds `middleware` to `token` so routes can use [`MiddlewareRef::Named`].
pub fn register(container: &Container, token: impl Into<String>, middleware: impl Middleware) {
    container.register(token, Arc::new(middleware) as Arc<dyn Middleware>);
}
