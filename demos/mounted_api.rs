//! A mounted sub-router with dynamic path parameters, fronted by the CORS
//! and request-logging middleware.
//!
//! Run with `cargo run --example mounted_api`, then:
//!
//! ```text
//! curl localhost:8080/api/users/42
//! curl -X OPTIONS -H 'Origin: https://example.com' localhost:8080/api/users/42
//! ```

use std::sync::Arc;

use hotpath::http::{Response, StatusCode};
use hotpath::middleware::{from_middleware, LoggerMiddleware};
use hotpath::security::CorsMiddleware;
use hotpath::{Context, Dispatcher, Method, Router, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let api = Router::new();
    api.register_sync(Method::Get, "/users/:id", |ctx: Context| {
        let id = ctx.params().get("id").unwrap_or("?").to_string();
        Response::new(StatusCode::Ok)
            .header("content-type", "application/json")
            .body(format!(r#"{{"id":"{id}"}}"#))
    })?;
    api.register_sync(Method::Get, "/users/:id/posts/:post_id", |ctx: Context| {
        let id = ctx.params().get("id").unwrap_or("?").to_string();
        let post_id = ctx.params().get("post_id").unwrap_or("?").to_string();
        Response::new(StatusCode::Ok)
            .header("content-type", "application/json")
            .body(format!(r#"{{"user_id":"{id}","post_id":"{post_id}"}}"#))
    })?;

    let root = Router::new();
    root.mount("/api", api)?;

    let cors = CorsMiddleware::new().allow_origin("https://example.com");
    let middlewares = vec![
        from_middleware(Arc::new(LoggerMiddleware)),
        from_middleware(Arc::new(cors)),
    ];

    let dispatcher = Dispatcher::new(root, middlewares)?;

    let server = Server::bind("127.0.0.1:8080").await?;
    println!("Listening on http://{}", server.local_addr());
    server.serve(dispatcher).await?;

    Ok(())
}
