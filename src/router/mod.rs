//! Request routing — the hybrid static/dynamic matcher.
//!
//! [`Router`] owns a [`static_trie::StaticTrie`] for fully-static patterns, a
//! [`patricia::PatriciaMatcher`] for everything else, a [`cache::LookupCache`]
//! sitting in front of both, and a side table mapping each issued
//! [`HandlerId`] back to the handler that was registered under it.
//!
//! A lookup tries, in order: the cache, the static trie, the patricia
//! matcher, then any mounted sub-routers whose prefix is a segment-aligned
//! prefix of the path. The static trie always wins over the patricia matcher
//! when both would match the same path.

pub mod cache;
pub mod patricia;
pub mod pattern;
pub mod static_trie;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use crate::context::Context;
use crate::error::DispatchError;
use crate::metrics::Metrics;
use crate::{Method, Response};

use cache::LookupCache;
use patricia::{PatriciaMatch, PatriciaMatcher};
use pattern::{RoutePattern, RouteSegment};
use static_trie::{StaticMatch, StaticTrie};

/// Opaque, monotonically-issued identifier for one registration. Ids are
/// never reused, even after a pattern is re-registered (the prior id simply
/// drops out of the handler table).
pub type HandlerId = u64;

/// Type-erased, heap-allocated async handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Type-erased synchronous handler — a plain function from `Context` to
/// `Response` with no `.await` of its own.
pub type SyncHandler = Arc<dyn Fn(Context) -> Response + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this via the blanket impl below, so
/// `Router::register` accepts `impl IntoHandler` directly.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// The value stored per `HandlerId`: either an async handler, or a plain
/// synchronous closure lifted to the same calling convention at invocation
/// time via `std::future::ready`. Keeping the tag rather than always boxing
/// a future means a purely synchronous handler never allocates one.
#[derive(Clone)]
pub enum HandlerEntry {
    Async(Handler),
    Sync(SyncHandler),
}

impl HandlerEntry {
    pub async fn invoke(&self, ctx: Context) -> Response {
        match self {
            HandlerEntry::Async(handler) => handler(ctx).await,
            HandlerEntry::Sync(handler) => std::future::ready(handler(ctx)).await,
        }
    }
}

struct HandlerRecord {
    entry: HandlerEntry,
    method: Method,
    pattern: String,
}

/// A resolved route: which handler to invoke, the parameters captured while
/// matching, and the raw pattern string that matched (for observability).
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub handler_id: HandlerId,
    pub captured_params: HashMap<String, String>,
    pub matched_pattern: String,
}

/// The tunables exposed by the routing core.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum middleware chain depth; exceeding it fails registration.
    pub max_chain_depth: usize,
    /// Lookup cache capacity. `0` disables caching.
    pub cache_capacity: usize,
    /// Patricia node small-vec-to-hashmap migration threshold.
    pub small_children_threshold: usize,
    /// Methods `register_all` installs a pattern under.
    pub allowed_methods: Vec<Method>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: 100,
            cache_capacity: 1000,
            small_children_threshold: 4,
            allowed_methods: vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
                Method::Options,
                Method::Head,
                Method::Websocket,
            ],
        }
    }
}

struct RouterState {
    static_trie: StaticTrie,
    patricia: PatriciaMatcher,
    handlers: HashMap<HandlerId, HandlerRecord>,
    next_id: HandlerId,
    mounts: Vec<(String, Arc<Router>)>,
}

/// Owns the hybrid matcher, the lookup cache, the handler table, mounted
/// sub-routers, and a metrics handle.
///
/// `Router` is cheap to clone — every field is `Arc`-backed — so a `Router`
/// handed to a dispatcher and a `Router` mounted under another `Router` are
/// the same shared state, not independent copies.
pub struct Router {
    state: Arc<RwLock<RouterState>>,
    cache: Arc<Mutex<LookupCache>>,
    metrics: Arc<Metrics>,
    config: RouterConfig,
}

impl Clone for Router {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            cache: Arc::clone(&self.cache),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        let state = RouterState {
            static_trie: StaticTrie::new(),
            patricia: PatriciaMatcher::new(config.small_children_threshold),
            handlers: HashMap::new(),
            next_id: 0,
            mounts: Vec::new(),
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            cache: Arc::new(Mutex::new(LookupCache::new(config.cache_capacity))),
            metrics: Arc::new(Metrics::new()),
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Registers `handler` for `method` at `pattern`. Re-registering the same
    /// `(method, pattern)` replaces the prior handler id.
    pub fn register(
        &self,
        method: Method,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<HandlerId, DispatchError> {
        let parsed = RoutePattern::parse(pattern)?;
        let handler = Arc::new(handler);
        let entry = HandlerEntry::Async(Arc::new(move |ctx: Context| handler.call(ctx)));
        self.install(method, parsed, entry)
    }

    /// Registers a plain synchronous handler — no `.await` of its own — for
    /// `method` at `pattern`.
    pub fn register_sync(
        &self,
        method: Method,
        pattern: &str,
        handler: impl Fn(Context) -> Response + Send + Sync + 'static,
    ) -> Result<HandlerId, DispatchError> {
        let parsed = RoutePattern::parse(pattern)?;
        let entry = HandlerEntry::Sync(Arc::new(handler));
        self.install(method, parsed, entry)
    }

    /// Registers `handler` under every standard method (not `WEBSOCKET`,
    /// which is never dispatched by a client-chosen verb).
    pub fn register_all(
        &self,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<Vec<HandlerId>, DispatchError> {
        let handler = Arc::new(handler);
        let mut ids = Vec::new();
        for method in standard_methods() {
            let parsed = RoutePattern::parse(pattern)?;
            let handler = Arc::clone(&handler);
            let entry = HandlerEntry::Async(Arc::new(move |ctx: Context| handler.call(ctx)));
            ids.push(self.install(method, parsed, entry)?);
        }
        Ok(ids)
    }

    fn install(
        &self,
        method: Method,
        parsed: RoutePattern,
        entry: HandlerEntry,
    ) -> Result<HandlerId, DispatchError> {
        let mut state = self.state.write().expect("router state lock poisoned");

        let id = state.next_id;
        state.next_id += 1;

        if parsed.is_fully_static() {
            let segments: Vec<String> = parsed
                .segments()
                .iter()
                .map(|s| match s {
                    RouteSegment::Static(text) => text.clone(),
                    _ => unreachable!("is_fully_static guarantees every segment is Static"),
                })
                .collect();
            state.static_trie.insert(&segments, method.clone(), id)?;
        } else {
            state.patricia.insert(parsed.segments(), method.clone(), id);
        }

        state.handlers.insert(
            id,
            HandlerRecord {
                entry,
                method,
                pattern: parsed.raw().to_string(),
            },
        );
        drop(state);

        self.cache.lock().expect("lookup cache lock poisoned").clear();
        Ok(id)
    }

    /// Mounts `sub_router` under `prefix`. The prefix must be a fully-static
    /// path — a dynamic mount prefix is rejected with
    /// [`DispatchError::MountPrefixInvalid`].
    pub fn mount(&self, prefix: &str, sub_router: Router) -> Result<(), DispatchError> {
        let parsed = RoutePattern::parse(prefix)?;
        if !parsed.is_fully_static() {
            return Err(DispatchError::MountPrefixInvalid {
                prefix: prefix.to_string(),
            });
        }

        let mut state = self.state.write().expect("router state lock poisoned");
        state
            .mounts
            .push((parsed.canonical().to_string(), Arc::new(sub_router)));
        drop(state);

        self.cache.lock().expect("lookup cache lock poisoned").clear();
        Ok(())
    }

    /// Looks up `(method, path)`: the lookup cache, then the static trie,
    /// then the patricia matcher, then mounted sub-routers in registration
    /// order.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let canonical = pattern::canonicalize(path);
        self.metrics.record_lookup();

        if let Some(cached) = self
            .cache
            .lock()
            .expect("lookup cache lock poisoned")
            .get(method, &canonical)
        {
            self.metrics.record_cache_hit();
            return Some(cached);
        }

        let segments = pattern::split_segments(&canonical);
        let state = self.state.read().expect("router state lock poisoned");

        let started = Instant::now();
        match state.static_trie.match_route(&segments, method) {
            StaticMatch::Hit(handler_id) => {
                self.metrics
                    .record_static_hit(started.elapsed().as_nanos() as u64);
                let matched_pattern = pattern_of(&state, handler_id);
                drop(state);
                let route_match = RouteMatch {
                    handler_id,
                    captured_params: HashMap::new(),
                    matched_pattern,
                };
                self.cache
                    .lock()
                    .expect("lookup cache lock poisoned")
                    .put(method, &canonical, route_match.clone());
                return Some(route_match);
            }
            StaticMatch::MethodNotAllowed(_) => {
                // Static-first invariant: a static path owns this exact path
                // regardless of method, so a dynamic route or mounted
                // sub-router must not be allowed to answer for it. Report no
                // match; `Dispatcher` falls back to `allowed_methods`, which
                // reads the same static-trie method list for the 405.
                self.metrics.record_not_found();
                return None;
            }
            StaticMatch::Miss => {}
        }

        let started = Instant::now();
        if let PatriciaMatch::Hit(hit) = state.patricia.match_route(&segments, method) {
            self.metrics
                .record_dynamic_hit(started.elapsed().as_nanos() as u64);
            let matched_pattern = pattern_of(&state, hit.handler_id);
            drop(state);
            let route_match = RouteMatch {
                handler_id: hit.handler_id,
                captured_params: hit.params,
                matched_pattern,
            };
            self.cache
                .lock()
                .expect("lookup cache lock poisoned")
                .put(method, &canonical, route_match.clone());
            return Some(route_match);
        }

        let mounts = state.mounts.clone();
        drop(state);

        for (prefix, sub_router) in &mounts {
            if let Some(remainder) = strip_prefix_segments(&canonical, prefix) {
                if let Some(route_match) = sub_router.match_route(method, &remainder) {
                    return Some(route_match);
                }
            }
        }

        self.metrics.record_not_found();
        None
    }

    /// Every method with a registered route at `path`, across the static
    /// trie, patricia matcher, and mounted sub-routers — used to build a
    /// `405`'s `Allow` header.
    pub fn allowed_methods(&self, path: &str) -> HashSet<Method> {
        let canonical = pattern::canonicalize(path);
        let segments = pattern::split_segments(&canonical);

        let state = self.state.read().expect("router state lock poisoned");
        let mut methods: HashSet<Method> = state
            .static_trie
            .methods_at(&segments)
            .into_iter()
            .collect();
        methods.extend(state.patricia.allowed_methods(&segments));
        let mounts = state.mounts.clone();
        drop(state);

        for (prefix, sub_router) in &mounts {
            if let Some(remainder) = strip_prefix_segments(&canonical, prefix) {
                methods.extend(sub_router.allowed_methods(&remainder));
            }
        }

        methods
    }

    /// Returns the handler registered under `handler_id`, if any. Cheap to
    /// clone (both `HandlerEntry` variants are `Arc`-backed).
    pub fn handler(&self, handler_id: HandlerId) -> Option<HandlerEntry> {
        let state = self.state.read().expect("router state lock poisoned");
        state
            .handlers
            .get(&handler_id)
            .map(|record| record.entry.clone())
    }

    pub fn has_route(&self, method: &Method, path: &str) -> bool {
        self.allowed_methods(path).contains(method)
    }

    pub fn list_routes(&self) -> Vec<(String, Method)> {
        let state = self.state.read().expect("router state lock poisoned");
        let mut routes: Vec<(String, Method)> = state
            .handlers
            .values()
            .map(|record| (record.pattern.clone(), record.method.clone()))
            .collect();
        for (prefix, sub_router) in &state.mounts {
            for (path, method) in sub_router.list_routes() {
                routes.push((format!("{prefix}{path}"), method));
            }
        }
        routes
    }

    pub fn route_count(&self) -> usize {
        let state = self.state.read().expect("router state lock poisoned");
        state.handlers.len()
            + state
                .mounts
                .iter()
                .map(|(_, sub_router)| sub_router.route_count())
                .sum::<usize>()
    }
}

fn pattern_of(state: &RouterState, handler_id: HandlerId) -> String {
    state
        .handlers
        .get(&handler_id)
        .map(|record| record.pattern.clone())
        .unwrap_or_default()
}

fn standard_methods() -> [Method; 7] {
    [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Patch,
        Method::Options,
        Method::Head,
    ]
}

/// Strips a segment-aligned `prefix` off `path`, returning the remainder as
/// a canonical path (`/` if nothing remains). Returns `None` if `prefix`
/// isn't a whole-segment prefix of `path` (e.g. prefix `/api` does not match
/// path `/apiextra`).
fn strip_prefix_segments(path: &str, prefix: &str) -> Option<String> {
    if prefix == "/" {
        return Some(path.to_string());
    }

    let prefix_segments = pattern::split_segments(prefix);
    let path_segments = pattern::split_segments(path);
    if path_segments.len() < prefix_segments.len() {
        return None;
    }
    if !prefix_segments
        .iter()
        .zip(path_segments.iter())
        .all(|(a, b)| a == b)
    {
        return None;
    }

    let remainder = path_segments[prefix_segments.len()..].join("/");
    Some(if remainder.is_empty() {
        "/".to_string()
    } else {
        format!("/{remainder}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    fn ok(_ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async { Response::new(StatusCode::Ok) })
    }

    fn context_for(method: &str, path: &str) -> Context {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = crate::Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    #[test]
    fn static_route_registers_and_matches() {
        let router = Router::new();
        let id = router.register(Method::Get, "/health", ok).unwrap();
        let m = router.match_route(&Method::Get, "/health").unwrap();
        assert_eq!(m.handler_id, id);
    }

    #[test]
    fn dynamic_route_captures_params() {
        let router = Router::new();
        router
            .register(Method::Get, "/users/:id/posts/:pid", ok)
            .unwrap();
        let m = router.match_route(&Method::Get, "/users/42/posts/7").unwrap();
        assert_eq!(m.captured_params.get("id"), Some(&"42".to_string()));
        assert_eq!(m.captured_params.get("pid"), Some(&"7".to_string()));
    }

    #[test]
    fn static_wins_over_dynamic_at_same_path() {
        let router = Router::new();
        let dynamic_id = router.register(Method::Get, "/users/:id", ok).unwrap();
        let static_id = router.register(Method::Get, "/users/profile", ok).unwrap();
        assert_ne!(dynamic_id, static_id);

        let profile = router.match_route(&Method::Get, "/users/profile").unwrap();
        assert_eq!(profile.handler_id, static_id);

        let dynamic = router.match_route(&Method::Get, "/users/42").unwrap();
        assert_eq!(dynamic.handler_id, dynamic_id);
    }

    #[test]
    fn method_mismatch_reports_allowed_methods() {
        let router = Router::new();
        router.register(Method::Get, "/x", ok).unwrap();
        assert!(router.match_route(&Method::Post, "/x").is_none());
        let allowed = router.allowed_methods("/x");
        assert!(allowed.contains(&Method::Get));
        assert!(!allowed.contains(&Method::Post));
    }

    #[test]
    fn static_method_mismatch_blocks_dynamic_fallthrough() {
        let router = Router::new();
        let static_id = router.register(Method::Get, "/users/profile", ok).unwrap();
        let dynamic_id = router.register(Method::Post, "/users/:id", ok).unwrap();
        assert_ne!(static_id, dynamic_id);

        // The static trie owns "/users/profile" outright; a POST there must
        // not fall through to the dynamic ":id" route, even though that
        // route would otherwise happily match with id="profile".
        assert!(router.match_route(&Method::Post, "/users/profile").is_none());
        assert!(router.match_route(&Method::Get, "/users/profile").is_some());
        assert_eq!(
            router.match_route(&Method::Post, "/users/42").unwrap().handler_id,
            dynamic_id
        );
    }

    #[test]
    fn mount_prefix_must_be_static() {
        let router = Router::new();
        let sub = Router::new();
        let err = router.mount("/:dynamic", sub).unwrap_err();
        assert!(matches!(err, DispatchError::MountPrefixInvalid { .. }));
    }

    #[test]
    fn mounted_sub_router_handles_prefixed_paths() {
        let router = Router::new();
        let sub = Router::new();
        let sub_id = sub.register(Method::Get, "/ping", ok).unwrap();
        router.mount("/api", sub).unwrap();

        let m = router.match_route(&Method::Get, "/api/ping").unwrap();
        assert_eq!(m.handler_id, sub_id);
        assert!(router.match_route(&Method::Get, "/apiping").is_none());
    }

    #[test]
    fn re_registration_replaces_handler_id_and_flushes_cache() {
        let router = Router::new();
        let first = router.register(Method::Get, "/x", ok).unwrap();
        let _ = router.match_route(&Method::Get, "/x"); // populate cache
        let second = router.register(Method::Get, "/x", ok).unwrap();
        assert_ne!(first, second);
        let m = router.match_route(&Method::Get, "/x").unwrap();
        assert_eq!(m.handler_id, second);
    }

    #[test]
    fn register_all_covers_standard_methods() {
        let router = Router::new();
        let ids = router.register_all("/multi", ok).unwrap();
        assert_eq!(ids.len(), 7);
        assert!(router.match_route(&Method::Get, "/multi").is_some());
        assert!(router.match_route(&Method::Delete, "/multi").is_some());
    }

    #[test]
    fn handler_lookup_invokes_registered_closure() {
        let router = Router::new();
        let id = router.register(Method::Get, "/x", ok).unwrap();
        let entry = router.handler(id).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let response = rt.block_on(entry.invoke(context_for("GET", "/x")));
        assert_eq!(response.status(), StatusCode::Ok);
    }

    #[test]
    fn route_count_and_list_routes_include_mounts() {
        let router = Router::new();
        router.register(Method::Get, "/a", ok).unwrap();
        let sub = Router::new();
        sub.register(Method::Get, "/b", ok).unwrap();
        router.mount("/sub", sub).unwrap();
        assert_eq!(router.route_count(), 2);
        let routes = router.list_routes();
        assert!(routes.iter().any(|(p, _)| p == "/a"));
        assert!(routes.iter().any(|(p, _)| p == "/sub/b"));
    }
}
