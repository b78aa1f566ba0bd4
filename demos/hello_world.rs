//! Minimal server: one static route, no middleware.
//!
//! Run with `cargo run --example hello_world`, then `curl localhost:8080/`.

use hotpath::http::{Response, StatusCode};
use hotpath::{Context, Dispatcher, Method, Router, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let router = Router::new();
    router.register_sync(Method::Get, "/", |_ctx: Context| {
        Response::new(StatusCode::Ok).body("Hello, World!")
    })?;
    router.register_sync(Method::Get, "/health", |_ctx: Context| {
        Response::new(StatusCode::Ok).body("ok")
    })?;

    let dispatcher = Dispatcher::new(router, vec![])?;

    let server = Server::bind("127.0.0.1:8080").await?;
    println!("Listening on http://{}", server.local_addr());
    server.serve(dispatcher).await?;

    Ok(())
}
