//! Hello world example for Waypoint
//!
//! Run with `cargo run --example hello_world` and open http://127.0.0.1:3000

use waypoint::{json, Application};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut app = Application::new();

    app.get("/", |ctx| async move {
        ctx.text("Hello, World!");
    });

    app.get("/json", |ctx| async move {
        ctx.json(json!({ "message": "Hello, World!" }));
    });

    if let Err(e) = app.listen("127.0.0.1:3000") {
        eprintln!("server stopped: {}", e);
    }
}
