//! Routing example for Waypoint
//!
//! This example demonstrates:
//! - Path parameters, optional parameters and wildcards
//! - Route groups
//! - Throwing error codes and handling them

use serde::{Deserialize, Serialize};
use waypoint::{json, Application, Payload};

#[derive(Serialize, Deserialize)]
struct User {
    name: String,
    role: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut app = Application::new();

    app.get("/", |ctx| async move {
        ctx.text("Welcome to the Waypoint demo server!");
    });

    // `/page` and `/page/3` both match
    app.get("/page/:number?", |ctx| async move {
        let number = ctx.param("number").unwrap_or_else(|| "1".to_string());
        ctx.text(format!("Page {}", number));
    });

    app.get("/files/*", |ctx| async move {
        let rest = ctx.param("*").unwrap_or_default();
        ctx.text(format!("File: {}", rest));
    });

    {
        let mut api = app.group("/api");

        api.get("/status", |ctx| async move {
            ctx.json(json!({ "status": "operational", "version": "1.0.0" }));
        });

        api.post("/users", |ctx| async move {
            match serde_json::from_slice::<User>(ctx.request().body()) {
                Ok(user) => match Payload::from_serialize(&user) {
                    Ok(payload) => {
                        ctx.status(201).json(payload);
                    }
                    Err(e) => ctx.throw("BAD_USER", e),
                },
                Err(e) => ctx.throw("BAD_USER", e),
            }
        });

        api.get("/users/:uid", |ctx| async move {
            let uid = ctx.param("uid").unwrap_or_default();
            if uid != "42" {
                ctx.throw("UID_NOT_FOUND", format!("no user {}", uid));
                return;
            }
            ctx.json(json!({ "uid": uid, "name": "Douglas" }));
        });
    }

    app.on_error("BAD_USER", |cause, ctx| async move {
        ctx.status(400).json(json!({ "error": cause.to_string() }));
    });

    app.on_error("UID_NOT_FOUND", |cause, ctx| async move {
        ctx.status(404).text(cause.to_string());
    });

    app.on_uncaught_exception(|cause, ctx| async move {
        let code = ctx.error_code().unwrap_or_default();
        ctx.status(500).json(json!({ "code": code, "error": cause.to_string() }));
    });

    if let Err(e) = app.listen("127.0.0.1:3000") {
        eprintln!("server stopped: {}", e);
    }
}
