//! Per-request context — type-safe state injection and request extensions.
//!
//! ## Planned Features
//!
//! - Type-erased extension map for handler state
//! - Path parameter extraction (from router matches)
//! - Authenticated user principal injection
//! - Request-scoped dependency injection
//!
//!


use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;

/// Type-erased request extensions map — used to inject per-request state
/// into handlers without requiring handlers to know about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        return Self {
            map: HashMap::new(),
        };
    }

    /// Insert a value into the extensions map
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a value from the extensions map
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get a mutable reference to a value from the extensions map
    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove a value from the extensions map
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Path parameters extracted from the matched route
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Create a new empty parameters map
    pub fn new() -> Self {
        return Self {
            map: HashMap::new(),
        };
    }

    /// Build a `PathParams` directly from a captured map, as produced by the
    /// router's match against the patricia trie.
    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    /// Returns an iterator over the captured `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns `true` if no parameters were captured.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Borrows the underlying map, for callers that need to hand the same
    /// parameters to something other than a `Context` (e.g. mirroring them
    /// onto the `Request`).
    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.map
    }

    /// Insert a value into the parameters map
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// Get a value from the parameters map
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|value| value.as_str())
    }

    /// Get a mutable reference to a value from the parameters map
    pub fn get_mut(&mut self, key: &str) -> Option<&mut str> {
        self.map.get_mut(key).map(|value| value.as_mut())
    }

    /// Remove a value from the parameters map
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }
}

/// Per-request context — type-safe state injection and request extensions.
pub struct Context {
    request: Request,
    params: PathParams,
    extensions: Extensions,
}

impl Context {
    /// Create a new context from a request, with no captured path parameters.
    pub fn new(request: Request) -> Self {
        return Self {
            request,
            params: PathParams::new(),
            extensions: Extensions::new(),
        };
    }

    /// Create a context from a request and the path parameters the router
    /// captured while matching it. Also mirrors `params` onto the request
    /// itself (via `Request::set_path_params`) so handlers that only hold a
    /// borrowed `&Request` can still see them.
    pub fn with_params(mut request: Request, params: PathParams) -> Self {
        request.set_path_params(params.as_map().clone());
        Self {
            request,
            params,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns a mutable reference to the extensions map, for middleware that
    /// injects request-scoped state (an authenticated principal, a request
    /// id) for downstream handlers to read.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Installs the path parameters a route match captured, mirroring them
    /// onto the underlying request. Called by the dispatcher once routing
    /// resolves a handler — a freshly-built `Context` has no params yet
    /// because matching happens after middleware pre-phases have already
    /// been handed the context.
    pub fn apply_route_match(&mut self, params: PathParams) {
        self.request.set_path_params(params.as_map().clone());
        self.params = params;
    }

    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self.request.body();
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[test]
    fn extensions_round_trip() {
        let mut ext = Extensions::new();
        ext.insert(42u32);
        assert_eq!(ext.get::<u32>(), Some(&42));
        assert_eq!(ext.get::<String>(), None);
    }

    #[test]
    fn with_params_mirrors_onto_request() {
        let mut params = PathParams::new();
        params.insert("id".to_string(), "42".to_string());
        let ctx = Context::with_params(make_request("/users/42"), params);
        assert_eq!(ctx.params().get("id"), Some("42"));
        assert_eq!(ctx.request().path_params().get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn new_context_has_no_params() {
        let ctx = Context::new(make_request("/"));
        assert!(ctx.params().is_empty());
    }
}
