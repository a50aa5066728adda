//! Controllers and the route metadata store.
//!
//! A [`Controller`] groups routes under a base path and names the type whose
//! methods serve them. The [`Registry`] collects controllers during startup;
//! [`Registry::controllers`] builds each controller through the
//! [`Container`] and binds its routes to the instance.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::container::{Container, Injectable};
use crate::error::Error;
use crate::handler::{self, BoxedHandler};
use crate::middleware::MiddlewareRef;
use crate::route::{Route, RouteDescriptor};
use crate::router;
use crate::trace::Tracer;
use crate::validator::Validator;

/// Routes served by methods of `C`, mounted under a base path.
pub struct Controller<C> {
    base_path: String,
    routes: Vec<Route<C>>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl<C: Injectable + Send + Sync + 'static> Controller<C> {
    pub fn new(base_path: &str) -> Self {
        Self { base_path: base_path.to_owned(), routes: Vec::new(), tracer: None }
    }

    pub fn route(mut self, route: Route<C>) -> Self {
        self.routes.push(route);
        self
    }

    /// Traces every route of this controller that has no tracer of its own.
    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter().map(Route::descriptor)
    }
}

impl<C> fmt::Debug for Controller<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("type", &type_name::<C>())
            .field("base_path", &self.base_path)
            .field("routes", &self.routes)
            .finish()
    }
}

// ── Resolved controllers ──────────────────────────────────────────────────────

/// A controller built by the container, with its routes bound to it.
pub struct ResolvedController {
    pub(crate) name: &'static str,
    pub(crate) base_path: String,
    pub(crate) routes: Vec<ResolvedRoute>,
}

impl ResolvedController {
    pub fn name(&self) -> &'static str { self.name }
    pub fn base_path(&self) -> &str { &self.base_path }

    pub fn routes(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter().map(|r| &r.descriptor)
    }
}

/// A route whose handler is bound to a controller instance. The descriptor
/// path is already joined with the base path.
pub(crate) struct ResolvedRoute {
    pub(crate) descriptor: RouteDescriptor,
    pub(crate) middleware: Vec<MiddlewareRef>,
    pub(crate) validator: Option<Arc<dyn Validator>>,
    pub(crate) tracer: Option<Arc<dyn Tracer>>,
    pub(crate) handler: BoxedHandler,
}

trait ErasedController: Send + Sync {
    fn base_path(&self) -> &str;
    fn resolve(&self, container: &Container) -> Result<ResolvedController, Error>;
}

impl<C: Injectable + Send + Sync + 'static> ErasedController for Controller<C> {
    fn base_path(&self) -> &str {
        &self.base_path
    }

    fn resolve(&self, container: &Container) -> Result<ResolvedController, Error> {
        let instance = Arc::new(container.build::<C>()?);
        let routes = self.routes.iter()
            .map(|route| {
                let mut descriptor = route.descriptor.clone();
                descriptor.path = router::join(&self.base_path, &route.descriptor.path);
                ResolvedRoute {
                    descriptor,
                    middleware: route.middleware.clone(),
                    validator: route.validator.clone(),
                    tracer: route.tracer.clone().or_else(|| self.tracer.clone()),
                    handler: handler::bind(Arc::clone(&instance), Arc::clone(&route.handler)),
                }
            })
            .collect();
        Ok(ResolvedController { name: type_name::<C>(), base_path: self.base_path.clone(), routes })
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// The route metadata store.
///
/// Filled once before serving. It holds declarations only; no controller is
/// constructed until [`controllers`](Self::controllers) is called.
#[derive(Default)]
pub struct Registry {
    controllers: Vec<Box<dyn ErasedController>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a controller. An empty base path is rejected.
    pub fn register<C: Injectable + Send + Sync + 'static>(&mut self, controller: Controller<C>) -> Result<(), Error> {
        if controller.base_path.trim().is_empty() {
            return Err(Error::InvalidRouteDeclaration(format!(
                "controller `{}` has an empty base path",
                type_name::<C>()
            )));
        }
        debug!(controller = type_name::<C>(), base_path = %controller.base_path, routes = controller.routes.len(), "controller registered");
        self.controllers.push(Box::new(controller));
        Ok(())
    }

    /// Builds every registered controller through `container`.
    pub fn controllers(&self, container: &Container) -> Result<Vec<ResolvedController>, Error> {
        self.controllers.iter().map(|c| c.resolve(container)).collect()
    }

    pub fn base_paths(&self) -> impl Iterator<Item = &str> {
        self.controllers.iter().map(|c| c.base_path())
    }

    /// Forgets every controller. The container is untouched.
    pub fn flush(&mut self) {
        self.controllers.clear();
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.base_paths()).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::container::Dependencies;
    use crate::error::RequestError;
    use crate::request::Request;

    struct Repo;

    struct Users {
        _repo: Arc<Repo>,
    }

    impl Injectable for Users {
        const DEPENDENCIES: &'static [&'static str] = &["UserRepository"];

        fn construct(mut deps: Dependencies<'_>) -> Result<Self, Error> {
            Ok(Self { _repo: deps.next()? })
        }
    }

    impl Users {
        async fn show(self: Arc<Self>, _req: Request) -> Result<Value, RequestError> {
            Ok(Value::Null)
        }
    }

    fn users() -> Controller<Users> {
        Controller::new("/users").route(Route::get("/:id", Users::show))
    }

    #[test]
    fn empty_base_path_is_rejected() {
        let mut registry = Registry::new();
        let err = registry.register(Controller::<Users>::new("  ")).unwrap_err();
        assert!(matches!(err, Error::InvalidRouteDeclaration(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn controllers_are_built_through_the_container() {
        let mut registry = Registry::new();
        registry.register(users()).unwrap();

        let container = Container::new();
        assert!(matches!(
            registry.controllers(&container),
            Err(Error::UnregisteredDependency(ref t)) if t == "UserRepository"
        ));

        container.register("UserRepository", Repo);
        let resolved = registry.controllers(&container).unwrap();
        assert_eq!(resolved.len(), 1);
        let paths: Vec<_> = resolved[0].routes().map(|r| r.path().to_owned()).collect();
        assert_eq!(paths, ["/users/{id}"]);
    }

    #[test]
    fn flush_keeps_the_container() {
        let container = Container::new();
        container.register("UserRepository", Repo);

        let mut registry = Registry::new();
        registry.register(users()).unwrap();
        registry.flush();

        assert!(registry.is_empty());
        assert!(container.has("UserRepository"));
    }
}
