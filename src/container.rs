//! Token-keyed dependency container.
//!
//! Services are bound to string tokens and resolved by token. Types that
//! need services at construction implement [`Injectable`]: they declare
//! their tokens in parameter order and the container hands them the
//! resolved values.
//!
//! ```rust
//! use std::sync::Arc;
//! use waypost::{Container, Dependencies, Error, Injectable};
//!
//! struct Repo;
//! struct Users { repo: Arc<Repo> }
//!
//! impl Injectable for Users {
//!     const DEPENDENCIES: &'static [&'static str] = &["UserRepository"];
//!
//!     fn construct(mut deps: Dependencies<'_>) -> Result<Self, Error> {
//!         Ok(Self { repo: deps.next()? })
//!     }
//! }
//!
//! let container = Container::new();
//! assert!(container.build::<Users>().is_err());
//!
//! container.register("UserRepository", Repo);
//! assert!(container.build::<Users>().is_ok());
//! ```
//!
//! The container is an explicit value rather than a global: clone it (cheap,
//! `Arc` inside) into whatever needs it and [`clear`](Container::clear) it
//! between tests.

use std::any::{Any, type_name};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::Error;

type Shared = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Container) -> Result<Shared, Error> + Send + Sync>;

#[derive(Clone)]
enum Entry {
    Instance(Shared),
    Factory(Factory),
}

/// A registry of services keyed by token.
#[derive(Clone, Default)]
pub struct Container {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` to `token`, replacing any previous binding.
    pub fn register<T: Any + Send + Sync>(&self, token: impl Into<String>, value: T) {
        self.register_arc(token, Arc::new(value));
    }

    /// Binds an already shared value to `token`.
    pub fn register_arc<T: Any + Send + Sync>(&self, token: impl Into<String>, value: Arc<T>) {
        self.insert(token.into(), Entry::Instance(value));
    }

    /// Binds a factory to `token`. It runs on every [`resolve`](Self::resolve)
    /// and may resolve other tokens from the container it receives.
    pub fn register_factory<T, F>(&self, token: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        let factory: Factory =
            Arc::new(move |c: &Container| factory(c).map(|v| Arc::new(v) as Shared));
        self.insert(token.into(), Entry::Factory(factory));
    }

    fn insert(&self, token: String, entry: Entry) {
        debug!(%token, "dependency registered");
        self.entries.write().insert(token, entry);
    }

    pub fn has(&self, token: &str) -> bool {
        self.entries.read().contains_key(token)
    }

    /// Unbinds `token`. Returns whether it was bound.
    pub fn remove(&self, token: &str) -> bool {
        self.entries.write().remove(token).is_some()
    }

    /// Unbinds every token.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Resolves `token` to a value of type `T`.
    pub fn resolve<T: Any + Send + Sync>(&self, token: &str) -> Result<Arc<T>, Error> {
        self.resolve_any(token)?
            .downcast::<T>()
            .map_err(|_| Error::DependencyType { token: token.to_owned(), expected: type_name::<T>() })
    }

    fn resolve_any(&self, token: &str) -> Result<Shared, Error> {
        // Clone the entry out so factories can re-enter the container.
        let entry = self
            .entries
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| Error::UnregisteredDependency(token.to_owned()))?;
        match entry {
            Entry::Instance(value) => Ok(value),
            Entry::Factory(factory) => factory(self),
        }
    }

    /// Constructs a `T`, resolving its declared dependencies in order.
    ///
    /// Fails with [`Error::UnregisteredDependency`] naming the first token
    /// that is not bound; the constructor is not called in that case.
    pub fn build<T: Injectable>(&self) -> Result<T, Error> {
        let resolved = T::DEPENDENCIES
            .iter()
            .map(|&token| self.resolve_any(token).map(|value| (token, value)))
            .collect::<Result<VecDeque<_>, _>>()?;
        T::construct(Dependencies {
            container: self,
            target: type_name::<T>(),
            resolved,
            consumed: 0,
        })
    }

    /// A handle that resolves `token` on first access instead of now.
    pub fn lazy<T: Any + Send + Sync>(&self, token: impl Into<String>) -> Lazy<T> {
        Lazy {
            container: self.clone(),
            token: token.into(),
            value: Mutex::new(None),
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut tokens: Vec<&String> = entries.keys().collect();
        tokens.sort();
        f.debug_struct("Container").field("tokens", &tokens).finish()
    }
}

// ── Constructor injection ─────────────────────────────────────────────────────

/// A type the container can construct.
pub trait Injectable: Sized {
    /// Tokens consumed by [`construct`](Self::construct), in the order it
    /// calls [`Dependencies::next`].
    const DEPENDENCIES: &'static [&'static str] = &[];

    fn construct(deps: Dependencies<'_>) -> Result<Self, Error>;
}

/// The resolved constructor arguments handed to [`Injectable::construct`].
pub struct Dependencies<'a> {
    container: &'a Container,
    target: &'static str,
    resolved: VecDeque<(&'static str, Shared)>,
    consumed: usize,
}

impl Dependencies<'_> {
    /// Takes the next declared dependency.
    pub fn next<T: Any + Send + Sync>(&mut self) -> Result<Arc<T>, Error> {
        let (token, value) = self.resolved.pop_front().ok_or(Error::UndeclaredDependency {
            target: self.target,
            index: self.consumed,
        })?;
        self.consumed += 1;
        value
            .downcast::<T>()
            .map_err(|_| Error::DependencyType { token: token.to_owned(), expected: type_name::<T>() })
    }

    /// A late-bound dependency, resolved when first used.
    pub fn lazy<T: Any + Send + Sync>(&self, token: impl Into<String>) -> Lazy<T> {
        self.container.lazy(token)
    }

    pub fn container(&self) -> &Container {
        self.container
    }
}

// ── Lazy injection ────────────────────────────────────────────────────────────

/// A dependency resolved on first [`get`](Lazy::get).
///
/// Binding never fails; a missing token surfaces as
/// [`Error::UnregisteredDependency`] at access time. Once resolved the value
/// is cached for the lifetime of the handle.
pub struct Lazy<T> {
    container: Container,
    token: String,
    value: Mutex<Option<Arc<T>>>,
}

impl<T: Any + Send + Sync> Lazy<T> {
    pub fn get(&self) -> Result<Arc<T>, Error> {
        let mut slot = self.value.lock();
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = self.container.resolve::<T>(&self.token)?;
        *slot = Some(Arc::clone(&value));
        Ok(value)
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy").field("token", &self.token).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock(u64);
    struct Mailer {
        sender: String,
    }

    struct Signup {
        clock: Arc<Clock>,
        mailer: Arc<Mailer>,
    }

    impl Injectable for Signup {
        const DEPENDENCIES: &'static [&'static str] = &["Clock", "Mailer"];

        fn construct(mut deps: Dependencies<'_>) -> Result<Self, Error> {
            Ok(Self { clock: deps.next()?, mailer: deps.next()? })
        }
    }

    #[test]
    fn resolve_unregistered_fails() {
        let c = Container::new();
        match c.resolve::<Clock>("Clock") {
            Err(Error::UnregisteredDependency(token)) => assert_eq!(token, "Clock"),
            other => panic!("expected UnregisteredDependency, got {:?}", other.err()),
        }
    }

    #[test]
    fn register_overwrites_and_remove_unbinds() {
        let c = Container::new();
        c.register("Clock", Clock(1));
        c.register("Clock", Clock(2));
        assert_eq!(c.resolve::<Clock>("Clock").unwrap().0, 2);

        assert!(c.remove("Clock"));
        assert!(!c.has("Clock"));
        assert!(!c.remove("Clock"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let c = Container::new();
        c.register("Clock", 5u8);
        assert!(matches!(
            c.resolve::<Clock>("Clock"),
            Err(Error::DependencyType { ref token, .. }) if token == "Clock"
        ));
    }

    #[test]
    fn build_injects_in_declaration_order() {
        let c = Container::new();
        c.register("Clock", Clock(42));
        c.register("Mailer", Mailer { sender: "noreply".into() });

        let signup = c.build::<Signup>().unwrap();
        assert_eq!(signup.clock.0, 42);
        assert_eq!(signup.mailer.sender, "noreply");
    }

    #[test]
    fn build_names_the_missing_token() {
        let c = Container::new();
        c.register("Clock", Clock(42));
        match c.build::<Signup>() {
            Err(Error::UnregisteredDependency(token)) => assert_eq!(token, "Mailer"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("build should fail"),
        }
    }

    #[test]
    fn factories_run_per_resolve_and_see_the_container() {
        let c = Container::new();
        c.register("Sender", String::from("ops"));
        c.register_factory("Mailer", |c: &Container| {
            Ok(Mailer { sender: c.resolve::<String>("Sender")?.to_string() })
        });

        let a = c.resolve::<Mailer>("Mailer").unwrap();
        let b = c.resolve::<Mailer>("Mailer").unwrap();
        assert_eq!(a.sender, "ops");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn lazy_fails_at_access_not_at_bind() {
        let c = Container::new();
        let mailer = c.lazy::<Mailer>("Mailer");
        assert!(matches!(mailer.get(), Err(Error::UnregisteredDependency(_))));

        c.register("Mailer", Mailer { sender: "late".into() });
        assert_eq!(mailer.get().unwrap().sender, "late");

        // cached after the first successful access
        c.clear();
        assert_eq!(mailer.get().unwrap().sender, "late");
    }

    #[test]
    fn consuming_past_the_declaration_fails() {
        struct Greedy;
        impl Injectable for Greedy {
            fn construct(mut deps: Dependencies<'_>) -> Result<Self, Error> {
                deps.next::<Clock>()?;
                Ok(Self)
            }
        }
        assert!(matches!(
            Container::new().build::<Greedy>(),
            Err(Error::UndeclaredDependency { index: 0, .. })
        ));
    }
}
