//! Body encoders used by `Context::json` and `Context::xml`.
//!
//! The caller decides up front whether a body is already serialized text
//! ([`Payload::Raw`]) or a value to be serialized ([`Payload::Structured`]); encoders
//! never guess from the value.

mod json;
mod xml;

pub use json::JsonEncoder;
pub use xml::XmlEncoder;

use crate::error::EncodeError;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

pub const TEXT_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Bytes),
    Structured(Value),
}

impl Payload {
    /// Converts any serializable value into a structured payload.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, EncodeError> {
        Ok(Payload::Structured(serde_json::to_value(value)?))
    }
}

impl From<&str> for Payload {
    fn from(raw: &str) -> Self {
        Payload::Raw(Bytes::copy_from_slice(raw.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(raw: String) -> Self {
        Payload::Raw(Bytes::from(raw))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(raw: Vec<u8>) -> Self {
        Payload::Raw(Bytes::from(raw))
    }
}

impl From<Bytes> for Payload {
    fn from(raw: Bytes) -> Self {
        Payload::Raw(raw)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Structured(value)
    }
}

/// Output of a successful encode.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub body: Bytes,
    pub content_type: &'static str,
}

pub trait BodyEncoder: Send + Sync {
    fn encode(&self, payload: &Payload) -> Result<Encoded, EncodeError>;
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
