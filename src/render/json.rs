use super::{kind_of, BodyEncoder, Encoded, Payload};
use crate::error::EncodeError;
use bytes::Bytes;
use serde::de::IgnoredAny;
use serde_json::Value;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Raw payloads must already be valid JSON and are sent untouched. Structured
/// payloads must be a string, array or object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl BodyEncoder for JsonEncoder {
    fn encode(&self, payload: &Payload) -> Result<Encoded, EncodeError> {
        let body = match payload {
            Payload::Raw(raw) => {
                serde_json::from_slice::<IgnoredAny>(raw)?;
                raw.clone()
            }
            Payload::Structured(value) => match value {
                Value::Null | Value::Bool(_) | Value::Number(_) => {
                    return Err(EncodeError::UnsupportedJson(kind_of(value)));
                }
                _ => Bytes::from(serde_json::to_vec(value)?),
            },
        };

        Ok(Encoded {
            body,
            content_type: JSON_CONTENT_TYPE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_json_passes_through() {
        let encoded = JsonEncoder.encode(&Payload::from(r#"{"message": "Hello World!"}"#)).unwrap();
        assert_eq!(&encoded.body[..], br#"{"message": "Hello World!"}"#);
        assert_eq!(encoded.content_type, "application/json");
    }

    #[test]
    fn raw_text_is_rejected() {
        let err = JsonEncoder.encode(&Payload::from("Hello World")).unwrap_err();
        assert!(matches!(err, EncodeError::Json(_)));
    }

    #[test]
    fn structured_values_are_serialized() {
        let encoded = JsonEncoder.encode(&Payload::from(json!(["Hello", "World"]))).unwrap();
        assert_eq!(&encoded.body[..], br#"["Hello","World"]"#);

        let encoded = JsonEncoder.encode(&Payload::from(json!({}))).unwrap();
        assert_eq!(&encoded.body[..], b"{}");
    }

    #[test]
    fn structured_scalars_are_rejected() {
        for value in [json!(true), json!(3), json!(null)] {
            let err = JsonEncoder.encode(&Payload::Structured(value)).unwrap_err();
            assert!(matches!(err, EncodeError::UnsupportedJson(_)));
        }
    }
}
