//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The tree is filled once
//! when the [`App`](crate::App) is built and only read while serving.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::engine::Endpoint;
use crate::error::Error;
use crate::method::Method;

#[derive(Default)]
pub(crate) struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Endpoint>>>,
}

impl Router {
    pub(crate) fn insert(&mut self, method: Method, path: &str, endpoint: Arc<Endpoint>) -> Result<(), Error> {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, endpoint)
            .map_err(|e| Error::InvalidRouteDeclaration(format!("{method} {path}: {e}")))
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Option<(Arc<Endpoint>, Map<String, Value>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(trim_trailing_slash(path)).ok()?;
        let endpoint = Arc::clone(matched.value);
        // matched against the raw path, so `/` inside a param stays `%2F`
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), Value::String(percent_decode_str(v).decode_utf8_lossy().into_owned())))
            .collect();
        Some((endpoint, params))
    }

    /// Whether any method serves `path`. Used to tell 405 from 404.
    pub(crate) fn knows(&self, path: &str) -> bool {
        let path = trim_trailing_slash(path);
        self.routes.values().any(|tree| tree.at(path).is_ok())
    }
}

/// `/users/` matches `/users`. The root path is left alone.
fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

/// Joins a controller base path and a route path into a matchit pattern.
///
/// `:name` segments become `{name}`; `{name}` segments are kept.
pub(crate) fn join(base: &str, path: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let path = path.trim().trim_matches('/');

    let mut joined = String::with_capacity(base.len() + path.len() + 2);
    if !base.starts_with('/') {
        joined.push('/');
    }
    joined.push_str(base);
    if !path.is_empty() {
        if !joined.ends_with('/') {
            joined.push('/');
        }
        joined.push_str(path);
    }
    if joined.is_empty() {
        joined.push('/');
    }

    joined
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{name}}}"),
            _ => segment.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
