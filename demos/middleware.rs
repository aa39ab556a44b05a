//! Middleware example for Waypoint
//!
//! This example demonstrates middleware for:
//! - Logging requests
//! - Authentication through context metadata
//! - Security and CORS headers

use std::time::Instant;
use waypoint::middleware::{Cors, CorsConfig, SecurityConfig, SecurityHeaders};
use waypoint::{json, Application};

#[derive(Clone)]
struct CurrentUser(String);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut app = Application::new();

    app.middleware("/", |ctx| async move {
        ctx.set("started", Instant::now());
        tracing::info!(method = %ctx.request().method(), path = ctx.request().path(), "request");
    });

    let security = SecurityHeaders::new(SecurityConfig::default());
    app.middleware("/", move |ctx| security.apply(ctx));

    let cors = Cors::new(CorsConfig::default());
    app.middleware("/api", move |ctx| cors.apply(ctx));

    // everything under /api requires a bearer token
    app.middleware("/api", |ctx| async move {
        match ctx.request().header("authorization") {
            Some(token) if token.starts_with("Bearer ") => {
                ctx.set("user", CurrentUser(token["Bearer ".len()..].to_string()));
            }
            _ => ctx.throw("UNAUTHORIZED", "missing bearer token"),
        }
    });

    app.get("/", |ctx| async move {
        ctx.text("public");
    });

    app.get("/api/me", |ctx| async move {
        let user = ctx.get::<CurrentUser>("user").map(|u| u.0).unwrap_or_default();
        let elapsed = ctx
            .get::<Instant>("started")
            .map(|started| started.elapsed().as_micros())
            .unwrap_or_default();
        ctx.json(json!({ "user": user, "elapsed_us": elapsed as u64 }));
    });

    app.on_error("UNAUTHORIZED", |cause, ctx| async move {
        ctx.status(401).text(cause.to_string());
    });

    if let Err(e) = app.listen("127.0.0.1:3000") {
        eprintln!("server stopped: {}", e);
    }
}
