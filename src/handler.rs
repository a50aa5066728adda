//! Handler trait and type erasure.
//!
//! # How controller methods are stored
//!
//! A route points at a method of a controller type `C`. The engine needs to
//! keep routes of *different* controllers in one table, so each method is
//! bound to its controller instance and hidden behind a trait object:
//!
//! ```text
//! async fn create(self: Arc<Self>, req: Request) -> Result<T, RequestError>
//!        ↓ Route::post("/", Users::create)
//! Arc<dyn Handler<Users>>                    ← blanket impl below
//!        ↓ controller built by the Container
//! Arc::new(Bound { controller, handler })    ← stored as BoxedHandler
//!        ↓
//! handler.call(req) at request time          ← one vtable dispatch
//! ```
//!
//! The return value is serialized to a `serde_json::Value` right away; the
//! engine renders it with the route's status and content type.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::RequestError;
use crate::request::Request;

/// A heap-allocated, type-erased handler future.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// public `Handler` trait.
#[doc(hidden)]
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<Value, RequestError>> + Send + 'static>>;

/// Implemented for every valid controller method.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the shape:
///
/// ```text
/// async fn name(self: Arc<Self>, req: Request) -> Result<impl Serialize, RequestError>
/// ```
///
/// The trait is sealed so the blanket impl is the only one.
pub trait Handler<C>: private::Sealed<C> + Send + Sync + 'static {
    #[doc(hidden)]
    fn call(&self, controller: Arc<C>, req: Request) -> BoxFuture;
}

mod private {
    pub trait Sealed<C> {}
}

impl<C, F, Fut, R> private::Sealed<C> for F
where
    F: Fn(Arc<C>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, RequestError>> + Send + 'static,
    R: Serialize,
{
}

impl<C, F, Fut, R> Handler<C> for F
where
    F: Fn(Arc<C>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, RequestError>> + Send + 'static,
    R: Serialize,
{
    fn call(&self, controller: Arc<C>, req: Request) -> BoxFuture {
        let fut = (self)(controller, req);
        Box::pin(async move {
            let value = fut.await?;
            Ok(serde_json::to_value(value)?)
        })
    }
}

// ── Bound handlers ────────────────────────────────────────────────────────────

/// A controller method bound to its controller instance.
pub(crate) trait ErasedHandler: Send + Sync {
    fn call(&self, req: Request) -> BoxFuture;
}

pub(crate) type BoxedHandler = Arc<dyn ErasedHandler>;

struct Bound<C> {
    controller: Arc<C>,
    handler: Arc<dyn Handler<C>>,
}

impl<C: Send + Sync + 'static> ErasedHandler for Bound<C> {
    fn call(&self, req: Request) -> BoxFuture {
        self.handler.call(Arc::clone(&self.controller), req)
    }
}

pub(crate) fn bind<C: Send + Sync + 'static>(controller: Arc<C>, handler: Arc<dyn Handler<C>>) -> BoxedHandler {
    Arc::new(Bound { controller, handler })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter {
        greeting: String,
    }

    impl Greeter {
        async fn greet(self: Arc<Self>, req: Request) -> Result<String, RequestError> {
            let name = req.get("name").and_then(Value::as_str).unwrap_or("stranger");
            Ok(format!("{} {name}", self.greeting))
        }
    }

    #[tokio::test]
    async fn bound_methods_see_their_controller() {
        let controller = Arc::new(Greeter { greeting: "hello".into() });
        let method: Arc<dyn Handler<Greeter>> = Arc::new(Greeter::greet);
        let handler = bind(controller, method);

        let mut req = Request::default();
        req.data.insert("name".into(), Value::from("ana"));

        assert_eq!(handler.call(req).await.unwrap(), Value::from("hello ana"));
    }
}
