//! # hotpath
//!
//! A from-scratch async HTTP/1.1 server framework written in Rust, built
//! around a hybrid static/dynamic request router and dispatch pipeline.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotpath::server::Server;
//! use hotpath::http::{Request, Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     println!("Listening on http://127.0.0.1:8080");
//!     server.run(|_req: Request| async {
//!         Response::new(StatusCode::Ok).body("Hello, World!")
//!     }).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Routing and dispatch
//!
//! ```rust
//! use hotpath::{Dispatcher, Method, Router};
//! use hotpath::http::{Response, StatusCode};
//!
//! let router = Router::new();
//! router.register_sync(Method::Get, "/health", |_ctx| {
//!     Response::new(StatusCode::Ok).body("ok")
//! }).unwrap();
//!
//! let dispatcher = Dispatcher::new(router, vec![]).unwrap();
//! ```

pub mod context;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::Context;
pub use dispatch::Dispatcher;
pub use error::DispatchError;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
