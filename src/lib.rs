//! # waypost
//!
//! Declarative HTTP request dispatch for Rust services.
//!
//! You declare routes on controllers: method, path, success status, which
//! input fields to take from headers, path, query and body (and how to coerce
//! them), plus middleware and a validator. waypost turns those declarations
//! into live request handling:
//!
//! ```text
//! transport → normalize → validate → middleware chain → handler → response
//!                 └──────────┴──────────────┴─────────────┴──→ error mapper
//! ```
//!
//! Controllers and middleware are built by a token-keyed dependency
//! [`Container`], once, when the [`App`] is built. Nothing is constructed per
//! request.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use serde_json::{json, Value};
//! use waypost::{
//!     App, Container, Controller, Dependencies, Error, Injectable, Request,
//!     RequestError, Route, Server,
//! };
//!
//! struct Users;
//!
//! impl Injectable for Users {
//!     fn construct(_: Dependencies<'_>) -> Result<Self, Error> {
//!         Ok(Users)
//!     }
//! }
//!
//! impl Users {
//!     async fn show(self: Arc<Self>, req: Request) -> Result<Value, RequestError> {
//!         Ok(json!({ "id": req.get("id") }))
//!     }
//!
//!     async fn create(self: Arc<Self>, req: Request) -> Result<Value, RequestError> {
//!         Ok(Value::Object(req.data().clone()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let app = App::builder(Container::new())
//!         .controller(
//!             Controller::new("/users")
//!                 .route(Route::get("/:id", Users::show).params(["id|integer"]))
//!                 .route(Route::post("/", Users::create).status(StatusCode::CREATED)),
//!         )
//!         .build()?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod engine;
mod error;
mod handler;
mod mapper;
mod method;
mod registry;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod container;
pub mod field;
pub mod middleware;
pub mod normalize;
pub mod trace;
pub mod validator;

pub use container::{Container, Dependencies, Injectable, Lazy};
pub use engine::{App, AppBuilder, Endpoint, Stage};
pub use error::{Error, FieldError, RequestError};
pub use field::{FieldSpec, FieldType};
pub use handler::Handler;
pub use mapper::{ErrorMapper, MappedError, Settings};
pub use method::Method;
pub use middleware::{ExecutionRecord, Middleware, MiddlewareRef};
pub use normalize::{BodyFilter, InputSpec, RawInput};
pub use registry::{Controller, Registry, ResolvedController};
pub use request::Request;
pub use response::{ContentType, Response};
pub use route::{Route, RouteDescriptor};
pub use server::{Server, ServerHandle};
pub use trace::{LogTracer, TraceRecord, Tracer};
pub use validator::{Required, Validator};
