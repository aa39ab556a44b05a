use crate::error::SinkError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A committed response: what a context hands to its sink in its single write.
///
/// Header names are stored lower-cased.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Fixed response used when even the fallback renderer fails.
    pub(crate) fn internal_error(body: &str) -> Response {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/plain;charset=UTF-8".to_string());
        Response {
            status: 500,
            headers,
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }
}

/// Where a request's response goes. The host supplies one per request; the engine
/// calls [`ResponseSink::send`] at most once.
pub trait ResponseSink: Send + 'static {
    fn send(&mut self, response: Response) -> Result<(), SinkError>;
}

/// A oneshot sender is consumed by its first send; later sends report `Closed`.
impl ResponseSink for Option<tokio::sync::oneshot::Sender<Response>> {
    fn send(&mut self, response: Response) -> Result<(), SinkError> {
        let sender = self.take().ok_or(SinkError::Closed)?;
        sender.send(response).map_err(|_| SinkError::Closed)
    }
}

/// In-memory sink that keeps every write it receives. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct ResponseRecorder {
    writes: Arc<Mutex<Vec<Response>>>,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<Response> {
        self.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    /// The first write, if any.
    pub fn response(&self) -> Option<Response> {
        self.writes.lock().first().cloned()
    }
}

impl ResponseSink for ResponseRecorder {
    fn send(&mut self, response: Response) -> Result<(), SinkError> {
        self.writes.lock().push(response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_clones_share_writes() {
        let recorder = ResponseRecorder::new();
        let mut sink = recorder.clone();
        sink.send(Response::new(204)).unwrap();
        sink.send(Response::new(200)).unwrap();

        assert_eq!(recorder.write_count(), 2);
        assert_eq!(recorder.response().map(|r| r.status), Some(204));
    }

    #[test]
    fn channel_sink_accepts_one_response() {
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let mut sink = Some(tx);
        sink.send(Response::new(201)).unwrap();
        assert!(matches!(sink.send(Response::new(500)), Err(SinkError::Closed)));
        assert_eq!(rx.try_recv().unwrap().status, 201);
    }

    #[test]
    fn internal_error_is_plain_text() {
        let response = Response::internal_error("Internal Server Error");
        assert_eq!(response.status, 500);
        assert_eq!(response.header("Content-Type"), Some("text/plain;charset=UTF-8"));
        assert_eq!(response.body_str(), "Internal Server Error");
    }
}
