use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The error value carried on a context after `throw`.
///
/// Shared so every declared error handler for a code can receive it.
pub type Cause = Arc<dyn StdError + Send + Sync>;

/// Errors raised while setting up or hosting the engine. Request-time failures never
/// surface here; they travel on the context as an error code and a [`Cause`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("invalid route `{template}`: {source}")]
    Pattern {
        template: String,
        #[source]
        source: PatternError,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("body of {length} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { length: usize, limit: usize },
    #[error("method `{0}` is not supported")]
    UnsupportedMethod(String),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::PayloadTooLarge { .. } => 413,
            ServerError::UnsupportedMethod(_) => 501,
            ServerError::IoError(_) | ServerError::Pattern { .. } | ServerError::Config(_) => 500,
        }
    }
}

impl From<toml::de::Error> for ServerError {
    fn from(err: toml::de::Error) -> Self {
        ServerError::Config(err.to_string())
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

/// A route template that cannot be turned into a matcher.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("parameter in segment `{0}` has no name")]
    EmptyParamName(String),
    #[error("parameter `{0}` is bound more than once")]
    DuplicateParam(String),
    #[error("wildcard segment `{0}` must be the last segment")]
    MisplacedWildcard(String),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// Failure of a body encoder. Becomes the cause of an `INVALID_JSON` / `INVALID_XML` throw.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("a {0} cannot be rendered as a JSON document")]
    UnsupportedJson(&'static str),
    #[error("invalid XML body: {0}")]
    Xml(String),
    #[error("only objects can be rendered as XML, got {0}")]
    UnsupportedXml(&'static str),
}

/// The response sink refused the committed response.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("response sink is closed")]
    Closed,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Cause attached to the runtime-error code when a handler panics.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PanicError {
    message: String,
}

impl PanicError {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            msg.to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "Unknown panic".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Plain message cause, used for the synthesized not-found error.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct Message(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_keep_their_message() {
        let from_str = PanicError::from_payload(Box::new("boom"));
        assert_eq!(from_str.message(), "boom");

        let from_string = PanicError::from_payload(Box::new(String::from("bang")));
        assert_eq!(from_string.to_string(), "bang");

        let opaque = PanicError::from_payload(Box::new(42_u8));
        assert_eq!(opaque.message(), "Unknown panic");
    }

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(ServerError::UnsupportedMethod("BREW".into()).status_code(), 501);
        assert_eq!(ServerError::PayloadTooLarge { length: 10, limit: 1 }.status_code(), 413);
    }
}
