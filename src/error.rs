//! Error kinds shared by the routing and dispatch core.
//!
//! Unlike the per-module error enums elsewhere in this crate (`RequestError`,
//! `ServerError`), the pattern parser, router, middleware chain, and
//! dispatcher all fail into the *same* small set of kinds — a bad pattern
//! discovered while mounting a sub-router and a bad pattern discovered while
//! registering a route are the same problem. One enum, used across those
//! four modules, avoids four near-identical copies of it.

use thiserror::Error;

/// Errors produced by route registration, mounting, middleware chain
/// construction, and request dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A route pattern failed to parse: non-ASCII bytes, an empty segment,
    /// a duplicate parameter name, or a non-terminal catch-all.
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A sub-router was mounted under a prefix that is not entirely static
    /// (contains `:`, `*`, or a catch-all segment).
    #[error("mount prefix {prefix:?} must be a static path, found a dynamic segment")]
    MountPrefixInvalid { prefix: String },

    /// A middleware chain or trie node exceeded a configured capacity limit
    /// (bounded chain depth, small-children-to-map migration guard rail).
    #[error("capacity exceeded: {detail}")]
    CapacityExceeded { detail: String },

    /// The incoming request could not be interpreted well enough to route
    /// (malformed path, disallowed characters).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No registered route matched the request's method and path.
    #[error("no route matched {method} {path}")]
    NotFound { method: String, path: String },

    /// A matched handler returned an error instead of a response, or panicked.
    #[error("handler failed: {0}")]
    HandlerFailed(String),

    /// Dispatch was cancelled at a checkpoint before completion.
    #[error("dispatch cancelled")]
    Cancelled,
}
