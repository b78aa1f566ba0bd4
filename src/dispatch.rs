//! End-to-end request dispatch: middleware chain -> route match -> handler
//! -> response, including the WebSocket upgrade handshake path.
//!
//! [`Dispatcher`] is the single entry point described by spec §4.7: it owns
//! a [`Router`] and a [`MiddlewareChain`], and `dispatch` always produces
//! exactly one [`Response`], never an error value — every failure mode
//! (bad request, no route, handler panic, cancellation) is translated into
//! a `Response` before it leaves this module.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use base64::{Engine as _, engine::general_purpose};
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;

use crate::Method;
use crate::context::{Context, PathParams};
use crate::error::DispatchError;
use crate::http::{Request, Response, StatusCode};
use crate::http::request::RequestError;
use crate::middleware::{ChainHandler, ChainOutcome, MiddlewareChain, MiddlewareHandler};
use crate::router::{HandlerEntry, Router};

/// RFC 6455 §1.3 handshake magic GUID.
const WEBSOCKET_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Wire methods a client may legitimately send; everything else (`CONNECT`,
/// `TRACE`, a custom extension token) is rejected with `400` before routing
/// ever sees it, per spec §3's "other verbs rejected".
fn is_wire_method(method: &Method) -> bool {
    matches!(
        method,
        Method::Get
            | Method::Post
            | Method::Put
            | Method::Delete
            | Method::Patch
            | Method::Options
            | Method::Head
    )
}

fn error_response(status: StatusCode, kind: &str) -> Response {
    Response::new(status)
        .header("content-type", "application/json")
        .body(format!(r#"{{"error":"{kind}"}}"#))
}

/// Builds the RFC 6455 handshake response for an already-confirmed upgrade
/// request, or `None` if `sec-websocket-key` is missing or malformed
/// (not valid base64, or not a 16-byte nonce once decoded).
fn websocket_handshake(request: &Request) -> Option<Response> {
    let key = request.headers().get("sec-websocket-key")?;
    let decoded = general_purpose::STANDARD.decode(key.trim()).ok()?;
    if decoded.len() != 16 {
        return None;
    }

    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_MAGIC.as_bytes());
    let accept = general_purpose::STANDARD.encode(hasher.finalize());

    Some(
        Response::new(StatusCode::SwitchingProtocols)
            .header("upgrade", "websocket")
            .header("connection", "upgrade")
            .header("sec-websocket-accept", accept),
    )
}

fn method_not_allowed(allowed: &HashSet<Method>) -> Response {
    let mut names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
    names.sort_unstable();
    error_response(StatusCode::MethodNotAllowed, "MethodNotAllowed").header("allow", names.join(", "))
}

/// Owns the [`Router`] and [`MiddlewareChain`] for one service and exposes
/// the single `dispatch` entry point spec §4.7 describes. Cheap to clone —
/// both fields are internally `Arc`-backed.
#[derive(Clone)]
pub struct Dispatcher {
    router: Router,
    chain: Arc<MiddlewareChain>,
}

impl Dispatcher {
    /// Builds a dispatcher from a configured `Router` and an ordered list of
    /// middlewares. Fails with [`DispatchError::CapacityExceeded`] if the
    /// middleware list is longer than the router's configured
    /// `max_chain_depth`.
    pub fn new(router: Router, middlewares: Vec<MiddlewareHandler>) -> Result<Self, DispatchError> {
        let max_chain_depth = router.config().max_chain_depth;
        let chain = MiddlewareChain::new(middlewares, max_chain_depth)?;
        Ok(Self {
            router,
            chain: Arc::new(chain),
        })
    }

    /// Returns the router this dispatcher is backed by, for registering
    /// routes or reading metrics after construction.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Dispatches `request` with a cancellation token that never fires —
    /// the common case for a caller that has no cooperative-cancellation
    /// executor wired in yet.
    pub async fn dispatch(&self, request: Request) -> Response {
        self.dispatch_with_cancellation(request, CancellationToken::new()).await
    }

    /// Dispatches `request`, honoring `cancellation` at the checkpoints
    /// spec §5 names: between middlewares, before the handler, and between
    /// post-hooks (all three are enforced inside [`MiddlewareChain::run`]).
    pub async fn dispatch_with_cancellation(
        &self,
        mut request: Request,
        cancellation: CancellationToken,
    ) -> Response {
        let started = Instant::now();

        if !is_wire_method(request.method()) {
            self.finish(false, started);
            return error_response(StatusCode::BadRequest, "InvalidRequest");
        }

        let canonical = crate::router::pattern::canonicalize(request.path());
        if !canonical.starts_with('/') || !canonical.is_ascii() {
            self.finish(false, started);
            return error_response(StatusCode::BadRequest, "InvalidRequest");
        }

        let is_upgrade = request.is_websocket_upgrade();
        let handshake = if is_upgrade {
            match websocket_handshake(&request) {
                Some(response) => Some(response),
                None => {
                    self.finish(false, started);
                    return error_response(StatusCode::BadRequest, "InvalidRequest");
                }
            }
        } else {
            None
        };

        // §4.7 step 2: once the handshake is confirmed, routing proceeds
        // under the WEBSOCKET pseudo-method rather than the wire method
        // (always GET for an upgrade request).
        let effective_method = if is_upgrade {
            Method::Websocket
        } else {
            request.method().clone()
        };

        let ctx = Context::new(request);

        let router = self.router.clone();
        let path = canonical;
        let method = effective_method;

        let terminal: ChainHandler = Arc::new(move |mut ctx: Context| {
            let router = router.clone();
            let path = path.clone();
            let method = method.clone();
            let handshake = handshake.clone();
            Box::pin(async move {
                match router.match_route(&method, &path) {
                    Some(route_match) => {
                        ctx.apply_route_match(PathParams::from_map(route_match.captured_params));
                        let response = invoke_handler(&router, route_match.handler_id, ctx).await;
                        handshake.unwrap_or(response)
                    }
                    None => match handshake {
                        Some(response) => response,
                        None => {
                            let allowed = router.allowed_methods(&path);
                            if allowed.is_empty() {
                                error_response(StatusCode::NotFound, "NotFound")
                            } else {
                                method_not_allowed(&allowed)
                            }
                        }
                    },
                }
            })
        });

        let outcome = self.chain.run(ctx, terminal, cancellation).await;

        let (response, succeeded) = match outcome {
            ChainOutcome::Completed(response) => {
                let succeeded = (response.status().as_u16()) < 500;
                (response, succeeded)
            }
            ChainOutcome::Interrupted(response) => (response, true),
            ChainOutcome::Errored(response) => (response, false),
        };

        self.finish(succeeded, started);
        response
    }

    fn finish(&self, succeeded: bool, started: Instant) {
        self.router
            .metrics()
            .record_dispatch(succeeded, started.elapsed().as_nanos() as u64);
    }
}

/// Invokes the handler registered under `handler_id` on a worker task,
/// satisfying spec §6's `schedule(task)` executor contract and turning a
/// handler panic into a `500` rather than taking down the caller — spec §7's
/// `HandlerFailed`.
async fn invoke_handler(router: &Router, handler_id: crate::router::HandlerId, ctx: Context) -> Response {
    let Some(entry): Option<HandlerEntry> = router.handler(handler_id) else {
        // The handler table changed between match and invoke (a concurrent
        // re-registration); treat it the same as no route at all.
        return error_response(StatusCode::NotFound, "NotFound");
    };

    match tokio::spawn(async move { entry.invoke(ctx).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            tracing::error!(error = %join_error, "handler task failed");
            error_response(StatusCode::InternalServerError, "HandlerFailed")
        }
    }
}

/// Recognizes a malformed or incomplete request before it ever reaches
/// dispatch — used by [`crate::server`] to build the `400` response for a
/// request that failed to parse at all, mirroring [`error_response`]'s body
/// format so both failure paths look identical on the wire. The underlying
/// [`RequestError`] is logged by the caller; the response body only ever
/// carries the abstract `InvalidRequest` kind, matching every other
/// `error_response` call site and spec.md's `{ "error": "<kind>" }` contract.
pub fn parse_error_response(_error: &RequestError) -> Response {
    error_response(StatusCode::BadRequest, "InvalidRequest")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use crate::middleware::Middleware;
    use crate::router::RouterConfig;
    use std::pin::Pin;
    use std::future::Future;

    fn request(method: &str, path: &str, extra_headers: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n{extra_headers}\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn ok_handler(body: &'static str) -> impl Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static {
        move |_ctx: Context| Box::pin(async move { Response::new(StatusCode::Ok).body(body) })
    }

    #[tokio::test]
    async fn scenario_a_static_hit() {
        let router = Router::new();
        router.register(Method::Get, "/health", ok_handler("healthy")).unwrap();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();

        let response = dispatcher.dispatch(request("GET", "/health", "")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(dispatcher.router().metrics().snapshot().static_hits, 1);
    }

    #[tokio::test]
    async fn scenario_b_dynamic_capture() {
        let router = Router::new();
        router
            .register(Method::Get, "/users/:id/posts/:pid", |ctx: Context| {
                Box::pin(async move {
                    let id = ctx.params().get("id").unwrap_or_default().to_string();
                    let pid = ctx.params().get("pid").unwrap_or_default().to_string();
                    Response::new(StatusCode::Ok).body(format!("{id}:{pid}"))
                }) as Pin<Box<dyn Future<Output = Response> + Send>>
            })
            .unwrap();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();

        let response = dispatcher.dispatch(request("GET", "/users/42/posts/7", "")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(dispatcher.router().metrics().snapshot().dynamic_hits, 1);
    }

    #[tokio::test]
    async fn scenario_c_static_wins_tie_break() {
        let router = Router::new();
        router.register(Method::Get, "/users/profile", ok_handler("profile")).unwrap();
        router.register(Method::Get, "/users/:id", ok_handler("dynamic")).unwrap();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();

        let r1 = dispatcher.dispatch(request("GET", "/users/profile", "")).await;
        assert_eq!(r1.status(), StatusCode::Ok);
        assert_eq!(dispatcher.router().metrics().snapshot().static_hits, 1);

        let r2 = dispatcher.dispatch(request("GET", "/users/42", "")).await;
        assert_eq!(r2.status(), StatusCode::Ok);
        assert_eq!(dispatcher.router().metrics().snapshot().dynamic_hits, 1);
    }

    #[tokio::test]
    async fn scenario_d_method_mismatch_reports_allow_header() {
        let router = Router::new();
        router.register(Method::Get, "/x", ok_handler("x")).unwrap();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();

        let response = dispatcher.dispatch(request("POST", "/x", "")).await;
        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
    }

    #[tokio::test]
    async fn scenario_e_websocket_handshake() {
        let router = Router::new();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();

        let response = dispatcher
            .dispatch(request(
                "GET",
                "/ws",
                "Connection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n",
            ))
            .await;

        assert_eq!(response.status(), StatusCode::SwitchingProtocols);
        assert_eq!(
            response.headers().get("sec-websocket-accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
        assert_eq!(response.headers().get("upgrade"), Some("websocket"));
    }

    #[tokio::test]
    async fn scenario_e_malformed_key_is_bad_request() {
        let router = Router::new();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();

        let response = dispatcher
            .dispatch(request(
                "GET",
                "/ws",
                "Connection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Key: not-base64!!\r\n",
            ))
            .await;

        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    struct AuthDenies;
    impl Middleware for AuthDenies {
        fn handle(&self, _ctx: Context, _next: crate::middleware::Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::Unauthorized).body("denied") })
        }
    }

    struct LogObservesReach(Arc<std::sync::atomic::AtomicBool>);
    impl Middleware for LogObservesReach {
        fn handle(&self, ctx: Context, next: crate::middleware::Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            Box::pin(next.run(ctx))
        }
    }

    #[tokio::test]
    async fn scenario_f_middleware_short_circuit_skips_downstream_and_router() {
        let router = Router::new();
        router.register(Method::Get, "/x", ok_handler("should not run")).unwrap();

        let log_reached = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let middlewares = vec![
            crate::middleware::from_middleware(Arc::new(AuthDenies)),
            crate::middleware::from_middleware(Arc::new(LogObservesReach(Arc::clone(&log_reached)))),
        ];
        let dispatcher = Dispatcher::new(router, middlewares).unwrap();

        let response = dispatcher.dispatch(request("GET", "/x", "")).await;
        assert_eq!(response.status(), StatusCode::Unauthorized);
        assert!(!log_reached.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(dispatcher.router().metrics().snapshot().total_lookups, 0);
    }

    #[tokio::test]
    async fn not_found_without_any_route() {
        let router = Router::new();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();
        let response = dispatcher.dispatch(request("GET", "/nope", "")).await;
        assert_eq!(response.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn disallowed_wire_method_is_bad_request() {
        let router = Router::new();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();
        let response = dispatcher.dispatch(request("TRACE", "/x", "")).await;
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn handler_panic_becomes_500() {
        let router = Router::new();
        router
            .register(Method::Get, "/boom", |_ctx: Context| {
                Box::pin(async { panic!("handler exploded") }) as Pin<Box<dyn Future<Output = Response> + Send>>
            })
            .unwrap();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();
        let response = dispatcher.dispatch(request("GET", "/boom", "")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_with_499() {
        let router = Router::new();
        router.register(Method::Get, "/x", ok_handler("x")).unwrap();
        let dispatcher = Dispatcher::new(router, vec![]).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let response = dispatcher
            .dispatch_with_cancellation(request("GET", "/x", ""), token)
            .await;
        assert_eq!(response.status(), StatusCode::ClientClosedRequest);
    }

    #[test]
    fn construction_respects_router_max_chain_depth() {
        let router = Router::with_config(RouterConfig {
            max_chain_depth: 1,
            ..RouterConfig::default()
        });
        let middlewares = vec![
            crate::middleware::from_middleware(Arc::new(AuthDenies)),
            crate::middleware::from_middleware(Arc::new(AuthDenies)),
        ];
        let err = Dispatcher::new(router, middlewares).unwrap_err();
        assert!(matches!(err, DispatchError::CapacityExceeded { .. }));
    }
}
