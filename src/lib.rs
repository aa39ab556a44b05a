//! # Waypoint
//!
//! A request-routing and middleware-dispatch engine for Rust.
//!
//! ## Features
//!
//! - Express-style path templates (`:name`, `:name?`, `*`) compiled to anchored regexes
//! - Prefix middleware, method routes and error handlers keyed by error code
//! - A per-request [`Context`] whose response is written at most once
//! - Handler panics caught and turned into the runtime-error code
//! - Cooperative cancellation through a per-request `CancellationToken`
//! - Text, JSON and XML bodies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waypoint::Application;
//!
//! fn main() {
//!     let mut app = Application::new();
//!
//!     app.get("/user/:uid", |ctx| async move {
//!         let uid = ctx.param("uid").unwrap_or_default();
//!         ctx.json(waypoint::json!({ "uid": uid }));
//!     });
//!
//!     app.on_error("URL_NOT_FOUND", |_cause, ctx| async move {
//!         ctx.status(404).text("nothing here");
//!     });
//!
//!     app.listen("127.0.0.1:3000").unwrap();
//! }
//! ```
//!
//! ## Middleware Usage
//!
//! ```rust
//! use waypoint::middleware::{SecurityConfig, SecurityHeaders};
//! # let mut app = waypoint::Application::new();
//!
//! let security = SecurityHeaders::new(SecurityConfig::default());
//! app.middleware("/", move |ctx| security.apply(ctx));
//! ```

pub mod app;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod render;
pub mod router;
pub extern crate serde_json;

pub use app::{Application, Group};
pub use config::{EngineConfig, ErrorCodes};
pub use context::{Context, ContextState};
pub use dispatch::DispatchEngine;
pub use error::{Cause, ServerError, ServerResult};
pub use http::{Method, Request, Response, ResponseRecorder, ResponseSink};
pub use render::Payload;

// Reexport serde_json
pub use serde_json::{json, Value};
