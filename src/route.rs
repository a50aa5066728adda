//! Route declarations.
//!
//! A [`Route`] is the registration-time description of one endpoint: method,
//! path, success status, response type, input field specs, and the
//! middleware, validator and tracer attached to it.
//!
//! ```rust
//! use std::sync::Arc;
//! use http::StatusCode;
//! use waypost::{BodyFilter, Request, RequestError, Route};
//!
//! struct Users;
//!
//! impl Users {
//!     async fn update(self: Arc<Self>, req: Request) -> Result<serde_json::Value, RequestError> {
//!         Ok(serde_json::Value::Object(req.data().clone()))
//!     }
//! }
//!
//! let route = Route::put("/:id", Users::update)
//!     .status(StatusCode::OK)
//!     .params(["id|integer"])
//!     .body(["name|string", "email|string"])
//!     .body_filter(BodyFilter::Restrict);
//! assert_eq!(route.descriptor().path(), "/:id");
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;

use crate::field::FieldSpec;
use crate::handler::Handler;
use crate::method::Method;
use crate::middleware::MiddlewareRef;
use crate::normalize::{BodyFilter, InputSpec};
use crate::response::ContentType;
use crate::trace::Tracer;
use crate::validator::Validator;

/// The immutable, inspectable part of a route.
#[derive(Clone, Debug)]
pub struct RouteDescriptor {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) status: StatusCode,
    pub(crate) response: ContentType,
    pub(crate) input: InputSpec,
    pub(crate) handler: &'static str,
}

impl RouteDescriptor {
    pub fn method(&self) -> Method { self.method }
    /// Route path; the full path once the route is part of an [`App`](crate::App).
    pub fn path(&self) -> &str { &self.path }
    pub fn status(&self) -> StatusCode { self.status }
    pub fn response(&self) -> ContentType { self.response }
    pub fn input(&self) -> &InputSpec { &self.input }
    /// Name of the controller method serving the route.
    pub fn handler(&self) -> &'static str { self.handler }
}

/// One endpoint of a controller `C`.
pub struct Route<C> {
    pub(crate) descriptor: RouteDescriptor,
    pub(crate) middleware: Vec<MiddlewareRef>,
    pub(crate) validator: Option<Arc<dyn Validator>>,
    pub(crate) tracer: Option<Arc<dyn Tracer>>,
    pub(crate) handler: Arc<dyn Handler<C>>,
}

impl<C> Route<C> {
    pub fn new<H: Handler<C>>(method: Method, path: &str, handler: H) -> Self {
        Self {
            descriptor: RouteDescriptor {
                method,
                path: path.to_owned(),
                status: StatusCode::OK,
                response: ContentType::Json,
                input: InputSpec::default(),
                handler: type_name::<H>(),
            },
            middleware: Vec::new(),
            validator: None,
            tracer: None,
            handler: Arc::new(handler),
        }
    }

    pub fn get<H: Handler<C>>(path: &str, handler: H) -> Self { Self::new(Method::Get, path, handler) }
    pub fn post<H: Handler<C>>(path: &str, handler: H) -> Self { Self::new(Method::Post, path, handler) }
    pub fn put<H: Handler<C>>(path: &str, handler: H) -> Self { Self::new(Method::Put, path, handler) }
    pub fn patch<H: Handler<C>>(path: &str, handler: H) -> Self { Self::new(Method::Patch, path, handler) }
    pub fn delete<H: Handler<C>>(path: &str, handler: H) -> Self { Self::new(Method::Delete, path, handler) }

    /// Success status. Defaults to `200 OK`.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.descriptor.status = status;
        self
    }

    /// Response type. Defaults to JSON.
    pub fn response(mut self, content_type: ContentType) -> Self {
        self.descriptor.response = content_type;
        self
    }

    pub fn params<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, fields: I) -> Self {
        self.descriptor.input.params = FieldSpec::new(fields);
        self
    }

    pub fn query<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, fields: I) -> Self {
        self.descriptor.input.query = FieldSpec::new(fields);
        self
    }

    pub fn headers<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, fields: I) -> Self {
        self.descriptor.input.headers = FieldSpec::new(fields);
        self
    }

    pub fn body<I: IntoIterator<Item = S>, S: AsRef<str>>(mut self, fields: I) -> Self {
        self.descriptor.input.body = FieldSpec::new(fields);
        self
    }

    pub fn body_filter(mut self, filter: BodyFilter) -> Self {
        self.descriptor.input.body_filter = filter;
        self
    }

    /// Appends a middleware. Middleware run in the order they are added.
    pub fn middleware(mut self, middleware: MiddlewareRef) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn validator(mut self, validator: impl Validator) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Traces this route, overriding any controller tracer.
    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    pub fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }
}

impl<C> fmt::Debug for Route<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("descriptor", &self.descriptor)
            .field("middleware", &self.middleware)
            .field("validator", &self.validator.is_some())
            .field("tracer", &self.tracer.is_some())
            .finish()
    }
}
