//! Middleware pipeline — composable before/after request handler logic.
//!
//! This module defines the core types for building an ordered middleware
//! stack. Each middleware wraps the next layer, enabling request inspection,
//! short-circuit responses, and response decoration without coupling
//! handlers to infrastructure concerns.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining middleware chain; call
//!   [`Next::run`] to advance, or [`Next::push_post_hook`] to register
//!   response-observing logic that runs once the chain unwinds.
//! - [`MiddlewareChain`] — the bounded-depth, iterative runner; produces a
//!   [`ChainOutcome`] rather than a bare `Response`.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;
use crate::{Response, StatusCode, context::Context};

/// Type-erased terminal handler a chain hands off to once every middleware
/// has run its pre-phase.
pub type ChainHandler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

/// A response-observing hook registered by a middleware during its
/// pre-phase. Hooks run in LIFO order once the handler (or a short-circuit)
/// produces a response.
pub type PostHook =
    Arc<dyn Fn(Response) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

#[derive(Default)]
struct ChainState {
    reached_handler: AtomicBool,
    errored: Mutex<Option<DispatchError>>,
    post_hooks: Mutex<Vec<PostHook>>,
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`]
/// implementation. Calling [`Next::run`] advances the cursor by one position
/// and invokes the next middleware, or the terminal handler once the chain
/// is exhausted.
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be
/// called more than once per middleware invocation.
pub struct Next {
    middlewares: Arc<Vec<MiddlewareHandler>>,
    index: usize,
    handler: ChainHandler,
    state: Arc<ChainState>,
    cancellation: CancellationToken,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

fn cancellation_response() -> Response {
    Response::new(StatusCode::ClientClosedRequest).body("request cancelled")
}

impl Next {
    /// Registers `hook` to run, in LIFO order with every other hook
    /// registered this traversal, once the chain has a response to observe.
    pub fn push_post_hook(&self, hook: PostHook) {
        self.state.post_hooks.lock().expect("post-hook lock poisoned").push(hook);
    }

    /// Short-circuits the chain with an error response, marking this
    /// traversal as `Errored` rather than `Interrupted`.
    pub fn fail(&self, error: DispatchError) -> Response {
        let response = Response::new(StatusCode::InternalServerError).body(error.to_string());
        *self.state.errored.lock().expect("error slot lock poisoned") = Some(error);
        response
    }

    /// Invokes the next middleware in the chain, or the terminal handler
    /// once every middleware has run.
    ///
    /// Checks the cancellation token before advancing — this is one of the
    /// "between middlewares, before the handler" checkpoints — and returns
    /// a `499` response without advancing further if it has fired.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.cancellation.is_cancelled() {
            return cancellation_response();
        }

        if self.index < self.middlewares.len() {
            let middleware = self.middlewares[self.index].clone();
            self.index += 1;
            middleware(ctx, self).await
        } else {
            self.state.reached_handler.store(true, Ordering::SeqCst);
            (self.handler)(ctx).await
        }
    }
}

/// The core trait for all hotpath middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(ctx).await` without modification.
/// - **Short-circuit** — return a [`Response`] directly without calling `next`.
/// - **Decorate** — register a [`PostHook`] via `next.push_post_hook` before
///   calling `next.run(ctx).await`, instead of awaiting and wrapping inline;
///   this keeps the chain's depth bounded by middleware count rather than by
///   nested `.await` frames per decorator.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared
///   across Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited
///   across `.await` points in multi-threaded runtimes.
/// - Implementations **should not** hold `&mut` references to shared state
///   across an `.await` point.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Registers a post-hook rather than awaiting `next.run` inline, so its
/// timing is taken from chain entry to the final response — after every
/// other post-hook that ran before it in LIFO order has already had its say.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let start = Instant::now();
        let method = ctx.request().method().as_str().to_string();
        let path = ctx.request().path().to_string();

        next.push_post_hook(Arc::new(move |response: Response| {
            let method = method.clone();
            let path = path.clone();
            Box::pin(async move {
                tracing::info!(
                    "{} {} - {} ({:?})",
                    method,
                    path,
                    response.status().as_u16(),
                    start.elapsed()
                );
                response
            })
        }));

        Box::pin(next.run(ctx))
    }
}

/// The outcome of running a [`MiddlewareChain`] to completion.
#[derive(Debug)]
pub enum ChainOutcome {
    /// Every middleware ran its pre-phase and the handler produced `Response`.
    Completed(Response),
    /// A middleware (or cancellation) halted the chain before the handler
    /// without an error — `Response` is what should be returned as-is.
    Interrupted(Response),
    /// A middleware called [`Next::fail`]; `Response` is the error response
    /// already built for the caller.
    Errored(Response),
}

impl ChainOutcome {
    /// Unwraps the outcome to its `Response`, regardless of variant.
    pub fn into_response(self) -> Response {
        match self {
            ChainOutcome::Completed(r) | ChainOutcome::Interrupted(r) | ChainOutcome::Errored(r) => r,
        }
    }
}

/// Ordered, bounded-depth middleware runner.
///
/// Construction fails with [`DispatchError::CapacityExceeded`] if the given
/// middleware list is longer than `max_chain_depth` — depth is checked once,
/// at chain-construction time, not per request.
pub struct MiddlewareChain {
    middlewares: Arc<Vec<MiddlewareHandler>>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<MiddlewareHandler>, max_chain_depth: usize) -> Result<Self, DispatchError> {
        if middlewares.len() > max_chain_depth {
            return Err(DispatchError::CapacityExceeded {
                detail: format!(
                    "middleware chain has {} entries, exceeding max_chain_depth {}",
                    middlewares.len(),
                    max_chain_depth
                ),
            });
        }
        Ok(Self {
            middlewares: Arc::new(middlewares),
        })
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs the chain for one request, terminating in `handler` once every
    /// middleware has run its pre-phase, then unwinding registered post-hooks
    /// in LIFO order.
    pub async fn run(&self, ctx: Context, handler: ChainHandler, cancellation: CancellationToken) -> ChainOutcome {
        if cancellation.is_cancelled() {
            return ChainOutcome::Interrupted(cancellation_response());
        }

        let state = Arc::new(ChainState::default());
        let next = Next {
            middlewares: Arc::clone(&self.middlewares),
            index: 0,
            handler,
            state: Arc::clone(&state),
            cancellation: cancellation.clone(),
        };

        let mut response = next.run(ctx).await;

        let hooks: Vec<PostHook> = {
            let mut guard = state.post_hooks.lock().expect("post-hook lock poisoned");
            guard.drain(..).collect()
        };
        for hook in hooks.into_iter().rev() {
            if cancellation.is_cancelled() {
                return ChainOutcome::Interrupted(cancellation_response());
            }
            response = hook(response).await;
        }

        if state.errored.lock().expect("error slot lock poisoned").take().is_some() {
            return ChainOutcome::Errored(response);
        }

        if state.reached_handler.load(Ordering::SeqCst) {
            ChainOutcome::Completed(response)
        } else {
            ChainOutcome::Interrupted(response)
        }
    }
}
