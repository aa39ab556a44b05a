//! The per-request pipeline.
//!
//! ```text
//! middleware ─▶ routes ─▶ (not found?) ─▶ error handlers ─▶ uncaught ─▶ fallback
//! ```
//!
//! Every phase stops as soon as the context has ended. The middleware and route
//! phases also stop once an error code is set. A panic inside a handler is caught at
//! that handler's call, turned into the runtime-error code, and the request continues
//! from the error handlers.

use crate::config::EngineConfig;
use crate::context::{Context, Shared};
use crate::error::{Cause, Message, PanicError};
use crate::handler::{BoxedErrorHandler, BoxedHandler};
use crate::http::{Method, Request, ResponseSink};
use crate::router::Registry;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};

/// Outcome of one guarded handler call.
enum Call {
    Returned,
    Panicked(PanicError),
}

/// Runs requests against a frozen [`Registry`]. Cheap to clone; every clone shares
/// the same registry and configuration.
#[derive(Clone)]
pub struct DispatchEngine {
    registry: Arc<Registry>,
    shared: Arc<Shared>,
}

impl DispatchEngine {
    pub fn new(registry: Registry, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            shared: Arc::new(Shared::new(config)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Dispatches one request. All output goes to `sink`; nothing escapes this call,
    /// panics included.
    pub async fn handle<S: ResponseSink>(&self, request: Request, sink: S) {
        let span = tracing::debug_span!("dispatch", method = %request.method(), path = %request.path());
        self.dispatch(request, Box::new(sink)).instrument(span).await
    }

    async fn dispatch(&self, request: Request, sink: Box<dyn ResponseSink>) {
        let lifetime = request.lifetime().clone();
        let path = normalize(request.path());
        let method = request.method();
        let ctx = Context::with_shared(request, sink, Arc::clone(&self.shared));

        let _watcher = watch_cancellation(&ctx, lifetime);

        if let Call::Panicked(fault) = self.run_routing(&ctx, &path, method).await {
            self.reclassify(&ctx, fault);
        } else if !ctx.is_ended() && !ctx.has_error() {
            let config = &self.shared.config;
            ctx.throw(config.codes.not_found.clone(), Message(config.not_found_message.clone()));
        }

        if let Call::Panicked(fault) = self.run_error_handlers(&ctx).await {
            let handling_runtime = ctx.error_code().as_deref() == Some(self.runtime_code());
            self.reclassify(&ctx, fault);
            // one more pass for the runtime-error code, unless that is what just failed
            if !handling_runtime {
                if let Call::Panicked(fault) = self.run_error_handlers(&ctx).await {
                    self.reclassify(&ctx, fault);
                }
            }
        }

        if let Call::Panicked(fault) = self.run_uncaught(&ctx).await {
            self.reclassify(&ctx, fault);
        }

        self.render_fallback(&ctx);
        ctx.destroy();
    }

    async fn run_routing(&self, ctx: &Context, path: &str, method: Method) -> Call {
        for entry in &self.registry.middlewares {
            if ctx.is_ended() || ctx.has_error() {
                return Call::Returned;
            }
            if entry.pattern.is_match(path) {
                ctx.bind_params(entry.pattern.extract(path));
                if let fault @ Call::Panicked(_) = guarded(&entry.task, ctx).await {
                    return fault;
                }
            }
        }

        // every matching route runs until one ends the request or throws
        for entry in &self.registry.routes {
            if ctx.is_ended() || ctx.has_error() {
                return Call::Returned;
            }
            if entry.accepts(method) && entry.pattern.is_match(path) {
                ctx.bind_params(entry.pattern.extract(path));
                if let fault @ Call::Panicked(_) = guarded(&entry.task, ctx).await {
                    return fault;
                }
            }
        }
        Call::Returned
    }

    async fn run_error_handlers(&self, ctx: &Context) -> Call {
        for entry in &self.registry.errors {
            if ctx.is_ended() {
                break;
            }
            // compared against the live code: a handler may throw a new one
            let (Some(code), Some(cause)) = (ctx.error_code(), ctx.error()) else {
                break;
            };
            if code != entry.code {
                continue;
            }
            debug!(code = %code, "running error handler");
            if let fault @ Call::Panicked(_) = guarded_error(&entry.task, cause, ctx).await {
                return fault;
            }
        }
        Call::Returned
    }

    async fn run_uncaught(&self, ctx: &Context) -> Call {
        if ctx.is_ended() {
            return Call::Returned;
        }
        let (Some(task), Some(cause)) = (&self.registry.uncaught, ctx.error()) else {
            return Call::Returned;
        };
        debug!(code = ?ctx.error_code(), "running uncaught exception handler");
        guarded_error(task, cause, ctx).await
    }

    fn runtime_code(&self) -> &str {
        &self.shared.config.codes.runtime_error
    }

    fn reclassify(&self, ctx: &Context, fault: PanicError) {
        warn!(error = %fault, "handler panicked");
        ctx.throw(self.runtime_code(), fault);
    }

    /// Last resort when no handler ended the request.
    fn render_fallback(&self, ctx: &Context) {
        if ctx.is_ended() {
            return;
        }
        let rendered = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let config = &self.shared.config;
            let code = ctx.error_code();
            let message = ctx.error().map(|cause| cause.to_string()).unwrap_or_default();
            if code.as_deref() == Some(config.codes.not_found.as_str()) {
                ctx.status(404);
            } else if ctx.status_code() < 400 {
                ctx.status(500);
            }
            debug!(code = ?code, status = ctx.status_code(), "rendering fallback response");
            ctx.text(message);
        }));

        if let Err(payload) = rendered {
            let fault = PanicError::from_payload(payload);
            error!(error = %fault, "fallback rendering panicked");
            ctx.send_internal_error();
        }
    }
}

/// Canonical form used for matching: always ends with `/`.
fn normalize(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

async fn guarded(task: &BoxedHandler, ctx: &Context) -> Call {
    let ctx = ctx.clone();
    let call = AssertUnwindSafe(async move { task.call(ctx).await });
    match call.catch_unwind().await {
        Ok(()) => Call::Returned,
        Err(payload) => Call::Panicked(PanicError::from_payload(payload)),
    }
}

async fn guarded_error(task: &BoxedErrorHandler, cause: Cause, ctx: &Context) -> Call {
    let ctx = ctx.clone();
    let call = AssertUnwindSafe(async move { task.call(cause, ctx).await });
    match call.catch_unwind().await {
        Ok(()) => Call::Returned,
        Err(payload) => Call::Panicked(PanicError::from_payload(payload)),
    }
}

/// Flips the context to ended once the request's lifetime token fires. The returned
/// guard stops the watcher when dispatch finishes.
fn watch_cancellation(ctx: &Context, lifetime: CancellationToken) -> Option<tokio_util::sync::DropGuard> {
    let ended = ctx.termination_flag();
    if lifetime.is_cancelled() {
        debug!("request cancelled before dispatch");
        ended.store(true, Ordering::Release);
        return None;
    }

    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("no tokio runtime; cancellation is not watched");
        return None;
    };
    let done = CancellationToken::new();
    let finished = done.clone();
    runtime.spawn(async move {
        tokio::select! {
            _ = lifetime.cancelled() => {
                debug!("request cancelled; ending context");
                ended.store(true, Ordering::Release);
            }
            _ = finished.cancelled() => {}
        }
    });
    Some(done.drop_guard())
}
