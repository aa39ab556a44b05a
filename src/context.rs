//! Per-request state and the write-once response primitives.
//!
//! A [`Context`] is a cheap handle: the engine clones it into every handler it runs
//! for a request, and all clones observe the same state. Nothing is sent to the
//! response sink until a commit (`write`, `text`, `json`, `xml`, `end`, `redirect`),
//! and only the first commit reaches it.
//!
//! ```text
//! Open ──status/header──▶ Resolving ──commit──▶ Sent
//!   │                        │
//!   └──────── cancel ────────┴──────────────▶ Ended
//! ```

use crate::config::{EngineConfig, ErrorCodes};
use crate::error::Cause;
use crate::http::{Request, Response, ResponseSink};
use crate::render::{BodyEncoder, JsonEncoder, Payload, XmlEncoder, TEXT_CONTENT_TYPE};
use crate::router::Params;
use bytes::Bytes;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Open,
    Resolving,
    Sent,
    Ended,
}

/// Configuration and encoders shared by every context an engine creates.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) json: Box<dyn BodyEncoder>,
    pub(crate) xml: Box<dyn BodyEncoder>,
}

impl Shared {
    pub(crate) fn new(config: EngineConfig) -> Self {
        let xml = XmlEncoder::new(config.xml_root.clone());
        Self {
            config,
            json: Box::new(JsonEncoder),
            xml: Box::new(xml),
        }
    }
}

struct State {
    sink: Option<Box<dyn ResponseSink>>,
    params: Params,
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
    headers: HashMap<String, String>,
    status: u16,
    resolving: bool,
    sent: bool,
    code: Option<String>,
    cause: Option<Cause>,
}

struct Inner {
    request: Request,
    shared: Arc<Shared>,
    // the only field the cancellation watcher touches
    ended: Arc<AtomicBool>,
    state: Mutex<State>,
}

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// A context outside of any engine, with the default configuration. Useful for
    /// exercising a handler directly.
    pub fn new<S: ResponseSink>(request: Request, sink: S) -> Self {
        Self::with_shared(request, Box::new(sink), Arc::new(Shared::new(EngineConfig::default())))
    }

    pub(crate) fn with_shared(request: Request, sink: Box<dyn ResponseSink>, shared: Arc<Shared>) -> Self {
        Self {
            inner: Arc::new(Inner {
                request,
                shared,
                ended: Arc::new(AtomicBool::new(false)),
                state: Mutex::new(State {
                    sink: Some(sink),
                    params: Params::new(),
                    data: HashMap::new(),
                    headers: HashMap::new(),
                    status: 200,
                    resolving: false,
                    sent: false,
                    code: None,
                    cause: None,
                }),
            }),
        }
    }

    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// Path parameters bound by the pattern of the handler currently running.
    pub fn params(&self) -> Params {
        self.inner.state.lock().params.clone()
    }

    pub fn param(&self, name: &str) -> Option<String> {
        self.inner.state.lock().params.get(name).cloned()
    }

    pub fn codes(&self) -> &ErrorCodes {
        &self.inner.shared.config.codes
    }

    pub fn status(&self, code: u16) -> &Self {
        if http::StatusCode::from_u16(code).is_err() {
            warn!(status = code, "ignoring invalid status code");
            return self;
        }
        let mut state = self.inner.state.lock();
        if state.sent {
            debug!(status = code, "response already sent; status ignored");
            return self;
        }
        state.status = code;
        state.resolving = true;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.inner.state.lock().status
    }

    /// Sets a pending response header, replacing any previous value.
    pub fn header<K: AsRef<str>, V: Into<String>>(&self, key: K, value: V) -> &Self {
        let mut state = self.inner.state.lock();
        if state.sent {
            debug!(header = key.as_ref(), "response already sent; header ignored");
            return self;
        }
        state.headers.insert(key.as_ref().to_lowercase(), value.into());
        state.resolving = true;
        self
    }

    pub fn set<K: Into<String>, T: Any + Send + Sync>(&self, key: K, value: T) {
        self.inner.state.lock().data.insert(key.into(), Box::new(value));
    }

    /// Metadata stored under `key`, if present and of type `T`.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.inner
            .state
            .lock()
            .data
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.state.lock().data.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.state.lock().data.remove(key).is_some()
    }

    /// Records an error code and its cause. The request keeps running until the
    /// current handler returns; the engine then skips to the error handlers.
    pub fn throw<C, E>(&self, code: C, cause: E)
    where
        C: Into<String>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let code = code.into();
        if code.is_empty() {
            warn!("ignoring throw with an empty error code");
            return;
        }
        let cause: Cause = Arc::from(cause.into());
        let mut state = self.inner.state.lock();
        debug!(code = %code, "error thrown");
        state.code = Some(code);
        state.cause = Some(cause);
    }

    pub fn error_code(&self) -> Option<String> {
        self.inner.state.lock().code.clone()
    }

    pub fn error(&self) -> Option<Cause> {
        self.inner.state.lock().cause.clone()
    }

    pub fn has_error(&self) -> bool {
        self.inner.state.lock().code.is_some()
    }

    pub fn write<B: Into<Bytes>>(&self, body: B) {
        self.commit(body.into(), None);
    }

    pub fn text<S: Into<String>>(&self, body: S) {
        self.commit(Bytes::from(body.into()), Some(TEXT_CONTENT_TYPE));
    }

    /// Encodes `body` as JSON and commits it. On failure the invalid-json code is
    /// thrown and nothing is sent.
    pub fn json<P: Into<Payload>>(&self, body: P) {
        let shared = &self.inner.shared;
        self.encode_and_commit(body.into(), &*shared.json, &shared.config.codes.invalid_json);
    }

    /// Encodes `body` as XML and commits it. On failure the invalid-xml code is thrown
    /// and nothing is sent.
    pub fn xml<P: Into<Payload>>(&self, body: P) {
        let shared = &self.inner.shared;
        self.encode_and_commit(body.into(), &*shared.xml, &shared.config.codes.invalid_xml);
    }

    /// Commits the pending status and headers with an empty body.
    pub fn end(&self) {
        self.commit(Bytes::new(), None);
    }

    pub fn redirect(&self, location: &str) {
        self.status(302).header("Location", location);
        self.end();
    }

    pub fn state(&self) -> ContextState {
        let state = self.inner.state.lock();
        if state.sent {
            ContextState::Sent
        } else if self.is_ended() {
            ContextState::Ended
        } else if state.resolving {
            ContextState::Resolving
        } else {
            ContextState::Open
        }
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    pub fn is_sent(&self) -> bool {
        self.inner.state.lock().sent
    }

    fn encode_and_commit(&self, payload: Payload, encoder: &dyn BodyEncoder, code: &str) {
        if self.is_ended() {
            debug!("request already ended; body ignored");
            return;
        }
        match encoder.encode(&payload) {
            Ok(encoded) => self.commit(encoded.body, Some(encoded.content_type)),
            Err(err) => self.throw(code, err),
        }
    }

    fn commit(&self, body: Bytes, content_type: Option<&str>) {
        let mut state = self.inner.state.lock();
        if state.sent {
            debug!("response already sent; write ignored");
            return;
        }
        if self.is_ended() {
            debug!("request already ended; write ignored");
            return;
        }
        if let Some(content_type) = content_type {
            state
                .headers
                .insert("content-type".to_string(), content_type.to_string());
        }
        let response = Response {
            status: state.status,
            headers: std::mem::take(&mut state.headers),
            body,
        };
        let status = response.status;
        let result = match state.sink.as_mut() {
            Some(sink) => sink.send(response),
            None => Err(crate::error::SinkError::Closed),
        };
        state.sent = true;
        self.inner.ended.store(true, Ordering::Release);

        match result {
            Ok(()) => debug!(status, "response committed"),
            Err(err) => error!(status, error = %err, "response sink rejected the response"),
        }
    }

    pub(crate) fn bind_params(&self, params: Params) {
        self.inner.state.lock().params = params;
    }

    pub(crate) fn termination_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.ended)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.shared.config
    }

    /// Writes the fixed internal-error response straight to the sink unless something
    /// was already sent.
    pub(crate) fn send_internal_error(&self) {
        let mut state = self.inner.state.lock();
        if state.sent {
            return;
        }
        let response = Response::internal_error(&self.inner.shared.config.internal_error_body);
        if let Some(sink) = state.sink.as_mut() {
            let sent = std::panic::catch_unwind(AssertUnwindSafe(|| sink.send(response)));
            match sent {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "response sink rejected the internal error response"),
                Err(_) => error!("response sink panicked while sending the internal error response"),
            }
        }
        state.sent = true;
        self.inner.ended.store(true, Ordering::Release);
    }

    /// Releases everything the request held. Clones kept past the request see an
    /// ended context with no sink.
    pub(crate) fn destroy(&self) {
        self.inner.ended.store(true, Ordering::Release);
        let mut state = self.inner.state.lock();
        state.sink = None;
        state.params.clear();
        state.data.clear();
        state.headers.clear();
        state.cause = None;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.inner.request.method())
            .field("path", &self.inner.request.path())
            .field("state", &self.state())
            .field("code", &self.error_code())
            .finish()
    }
}
