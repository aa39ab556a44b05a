//! Application is the main entry point for building a waypoint service.
//!
//! It collects middleware, routes and error handlers, then either freezes them into a
//! [`DispatchEngine`] with [`Application::build`] or serves them over plain HTTP/1.1
//! with [`Application::listen`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use waypoint::Application;
//!
//! let mut app = Application::new();
//! app.get("/", |ctx| async move {
//!     ctx.json(waypoint::json!({ "message": "Hello!" }));
//! });
//! app.listen("127.0.0.1:3000").unwrap();
//! ```

use crate::config::EngineConfig;
use crate::context::Context;
use crate::dispatch::DispatchEngine;
use crate::error::{Cause, PatternError, ServerError, ServerResult};
use crate::http::{Method, Request, Response};
use crate::router::Registry;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Generates the per-method shorthands on top of a `route` method.
macro_rules! method_shorthands {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            #[doc = concat!("Registers a route for `", stringify!($method), "` requests.")]
            pub fn $name<F, R>(&mut self, path: &str, handler: F) -> &mut Self
            where
                F: Fn(Context) -> R + Send + Sync + 'static,
                R: Future<Output = ()> + Send + 'static,
            {
                self.route(Some(Method::$method), path, handler)
            }
        )*

        /// Registers a route that answers every method.
        pub fn all<F, R>(&mut self, path: &str, handler: F) -> &mut Self
        where
            F: Fn(Context) -> R + Send + Sync + 'static,
            R: Future<Output = ()> + Send + 'static,
        {
            self.route(None, path, handler)
        }
    };
}

/// The main application struct that represents your web service.
///
/// Registration never panics: a template that fails to compile is logged and kept
/// as a setup error, which [`build`](Application::build) and
/// [`listen`](Application::listen) report.
pub struct Application {
    pub max_connections: usize,
    pub request_timeout: Option<Duration>,
    pub max_body_size: usize,
    config: EngineConfig,
    registry: Registry,
    setup_errors: Vec<ServerError>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            max_connections: 256,
            request_timeout: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            config,
            registry: Registry::new(),
            setup_errors: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn max_connections(&mut self, max_connections: usize) -> &mut Self {
        self.max_connections = max_connections;
        self
    }

    /// Cancels a request's lifetime once it has been dispatching for `timeout`.
    pub fn request_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Requests announcing a larger `Content-Length` are answered `413` unread.
    pub fn max_body_size(&mut self, max_body_size: usize) -> &mut Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Runs `handler` for every request whose path is `prefix` or lies under it.
    pub fn middleware<F, R>(&mut self, prefix: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        let result = self.registry.add_middleware(prefix, handler);
        self.record(prefix, result)
    }

    /// Registers `handler` for `method` on `path`; `None` matches every method.
    pub fn route<F, R>(&mut self, method: Option<Method>, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        let result = self.registry.add_route(method, path, handler);
        self.record(path, result)
    }

    method_shorthands! {
        get => GET,
        post => POST,
        put => PUT,
        delete => DELETE,
        patch => PATCH,
        head => HEAD,
        options => OPTIONS,
    }

    /// Handles requests that threw `code`. Several handlers may share a code; they run
    /// in registration order.
    pub fn on_error<F, R>(&mut self, code: &str, handler: F) -> &mut Self
    where
        F: Fn(Cause, Context) -> R + Send + Sync + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        self.registry.add_error(code, handler);
        self
    }

    /// Last handler tried for an error no declared handler resolved. A second call
    /// replaces the first.
    pub fn on_uncaught_exception<F, R>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Cause, Context) -> R + Send + Sync + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        self.registry.set_uncaught(handler);
        self
    }

    /// Opens a group whose registrations are all prefixed with `prefix`.
    ///
    /// ```rust
    /// # use waypoint::Application;
    /// let mut app = Application::new();
    /// let mut api = app.group("/api");
    /// api.get("/users", |ctx| async move { ctx.text("users") });
    /// ```
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            app: self,
            prefix: join(prefix, ""),
        }
    }

    fn record(&mut self, template: &str, result: Result<(), PatternError>) -> &mut Self {
        if let Err(source) = result {
            error!(template, error = %source, "route template rejected");
            self.setup_errors.push(ServerError::Pattern {
                template: template.to_string(),
                source,
            });
        }
        self
    }

    /// Freezes the registrations into an engine. Fails with the first template that
    /// did not compile.
    pub fn build(self) -> ServerResult<DispatchEngine> {
        if let Some(err) = self.setup_errors.into_iter().next() {
            return Err(err);
        }
        debug!(entries = self.registry.len(), "registry frozen");
        Ok(DispatchEngine::new(self.registry, self.config))
    }

    /// Starts the HTTP server on a fresh tokio runtime and blocks.
    ///
    /// # Arguments
    /// * `addr` - Address to listen on (e.g. "127.0.0.1:3000")
    pub fn listen(self, addr: &str) -> ServerResult<()> {
        let runtime = Runtime::new()?;
        runtime.block_on(async {
            let listener = TcpListener::bind(addr).await?;
            info!("Server running on http://{}", addr);
            self.serve(listener).await
        })
    }

    /// Accepts connections from `listener` until the listener fails.
    pub async fn serve(self, listener: TcpListener) -> ServerResult<()> {
        let max_connections = self.max_connections.max(1);
        let limits = Limits {
            request_timeout: self.request_timeout,
            max_body_size: self.max_body_size,
        };
        let engine = self.build()?;
        let permits = Arc::new(Semaphore::new(max_connections));

        loop {
            if permits.available_permits() == 0 {
                warn!(max_connections, "Max connections reached");
            }
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                return Ok(());
            };

            match listener.accept().await {
                Ok((stream, peer)) => {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(&engine, stream, limits).await {
                            warn!(%peer, error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => error!(error = %e, "Connection failed"),
            }
        }
    }
}

/// A borrowed view of an [`Application`] that prefixes every path it registers.
/// Groups nest: prefixes concatenate.
pub struct Group<'a> {
    app: &'a mut Application,
    prefix: String,
}

impl Group<'_> {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn middleware<F, R>(&mut self, prefix: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        let full = join(&self.prefix, prefix);
        self.app.middleware(&full, handler);
        self
    }

    pub fn route<F, R>(&mut self, method: Option<Method>, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> R + Send + Sync + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        let full = join(&self.prefix, path);
        self.app.route(method, &full, handler);
        self
    }

    method_shorthands! {
        get => GET,
        post => POST,
        put => PUT,
        delete => DELETE,
        patch => PATCH,
        head => HEAD,
        options => OPTIONS,
    }

    /// Error codes are global; a group only forwards the registration.
    pub fn on_error<F, R>(&mut self, code: &str, handler: F) -> &mut Self
    where
        F: Fn(Cause, Context) -> R + Send + Sync + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        self.app.on_error(code, handler);
        self
    }

    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        let prefix = join(&self.prefix, prefix);
        Group {
            app: &mut *self.app,
            prefix,
        }
    }
}

fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        format!("{}{}", prefix, path)
    } else {
        format!("{}/{}", prefix, path)
    }
}

const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;
const MAX_LINE_LENGTH: u64 = 8 * 1024;
const MAX_HEADERS: usize = 100;

#[derive(Debug, Clone, Copy)]
struct Limits {
    request_timeout: Option<Duration>,
    max_body_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Serves exactly one request on `stream`, then closes it.
async fn handle_connection<S>(engine: &DispatchEngine, mut stream: S, limits: Limits) -> ServerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match read_request(&mut stream, limits.max_body_size).await {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(
            err @ (ServerError::BadRequest(_)
            | ServerError::PayloadTooLarge { .. }
            | ServerError::UnsupportedMethod(_)),
        ) => {
            debug!(error = %err, "rejecting request");
            let mut response = Response::new(err.status_code());
            response.body = err.to_string().into();
            write_response(&mut stream, &response).await?;
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    let lifetime = CancellationToken::new();
    let request = request.with_lifetime(lifetime.clone());
    let _timer = limits.request_timeout.map(|timeout| {
        let lifetime = lifetime.clone();
        AbortOnDrop(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            lifetime.cancel();
        }))
    });

    let (sender, receiver) = oneshot::channel();
    engine.handle(request, Some(sender)).await;

    let response = match receiver.await {
        Ok(response) => response,
        Err(_) if lifetime.is_cancelled() => {
            debug!("request timed out before a response was committed");
            Response::new(504)
        }
        Err(_) => {
            error!("dispatch finished without committing a response");
            Response::internal_error(&engine.config().internal_error_body)
        }
    };
    write_response(&mut stream, &response).await
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn read_request<S>(stream: &mut S, max_body_size: usize) -> ServerResult<Option<Request>>
where
    S: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let request_line = read_line(&mut reader).await?;
    if request_line.trim().is_empty() {
        return Ok(None);
    }

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(ServerError::BadRequest("invalid request line".to_string()));
    };
    let method = Method::from_str(method)?;
    let mut request = Request::new(method, target);

    let mut content_length = 0usize;
    let mut headers = 0usize;
    loop {
        let line = read_line(&mut reader).await?;
        if line.trim().is_empty() {
            break;
        }
        headers += 1;
        if headers > MAX_HEADERS {
            return Err(ServerError::BadRequest("too many headers".to_string()));
        }
        if let Some((key, value)) = line.trim().split_once(':') {
            let (key, value) = (key.trim(), value.trim());
            if key.eq_ignore_ascii_case("content-length") {
                content_length = value
                    .parse()
                    .map_err(|_| ServerError::BadRequest(format!("invalid content-length `{}`", value)))?;
            }
            request = request.with_header(key, value);
        }
    }

    if content_length > max_body_size {
        return Err(ServerError::PayloadTooLarge {
            length: content_length,
            limit: max_body_size,
        });
    }
    if content_length > 0 {
        let mut body = Vec::new();
        reader.take(content_length as u64).read_to_end(&mut body).await?;
        request = request.with_body(body);
    }
    Ok(Some(request))
}

/// One line of the request head, at most `MAX_LINE_LENGTH` bytes. An empty string
/// means the peer closed the connection.
async fn read_line<R>(reader: &mut R) -> ServerResult<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = (&mut *reader).take(MAX_LINE_LENGTH).read_line(&mut line).await?;
    if read as u64 == MAX_LINE_LENGTH && !line.ends_with('\n') {
        return Err(ServerError::BadRequest("request head line too long".to_string()));
    }
    Ok(line)
}

async fn write_response<S>(stream: &mut S, response: &Response) -> ServerResult<()>
where
    S: AsyncWrite + Unpin,
{
    let reason = http::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("");
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason);
    for (name, value) in &response.headers {
        head += &format!("{}: {}\r\n", name, value);
    }
    head += &format!("date: {}\r\n", httpdate::fmt_http_date(SystemTime::now()));
    head += &format!("content-length: {}\r\nconnection: close\r\n\r\n", response.body.len());

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&response.body).await?;
    stream.flush().await?;
    Ok(())
}
