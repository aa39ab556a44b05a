use super::{kind_of, BodyEncoder, Encoded, Payload};
use crate::error::EncodeError;
use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

const XML_CONTENT_TYPE: &str = "application/xml";

/// Raw payloads are checked for well-formedness and sent untouched. Structured payloads
/// must be objects; their fields become child elements of `root`.
#[derive(Debug, Clone)]
pub struct XmlEncoder {
    root: String,
}

impl XmlEncoder {
    pub fn new<S: Into<String>>(root: S) -> Self {
        Self { root: root.into() }
    }

    /// Tokenizes the whole document: exactly one root element, every element closed,
    /// nothing but whitespace, comments or processing instructions around the root.
    fn check_well_formed(raw: &[u8]) -> Result<(), EncodeError> {
        let mut reader = Reader::from_reader(raw);
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut roots = 0usize;
        loop {
            {
                let event = reader
                    .read_event_into(&mut buf)
                    .map_err(|e| EncodeError::Xml(format!("at byte {}: {}", reader.buffer_position(), e)))?;
                match event {
                    Event::Start(_) | Event::Empty(_) if depth == 0 => {
                        roots += 1;
                        if roots > 1 {
                            return Err(EncodeError::Xml("more than one root element".to_string()));
                        }
                        if matches!(event, Event::Start(_)) {
                            depth = 1;
                        }
                    }
                    Event::Start(_) => depth += 1,
                    Event::End(_) => depth = depth.saturating_sub(1),
                    Event::Text(ref text) if depth == 0 => {
                        if !text.iter().all(u8::is_ascii_whitespace) {
                            return Err(EncodeError::Xml("text outside the root element".to_string()));
                        }
                    }
                    Event::CData(_) if depth == 0 => {
                        return Err(EncodeError::Xml("CDATA outside the root element".to_string()));
                    }
                    Event::Eof => break,
                    _ => {}
                }
            }
            buf.clear();
        }

        if depth > 0 {
            return Err(EncodeError::Xml(format!("{} element(s) left open", depth)));
        }
        if roots == 0 {
            return Err(EncodeError::Xml("no root element".to_string()));
        }
        Ok(())
    }
}

impl Default for XmlEncoder {
    fn default() -> Self {
        Self::new("response")
    }
}

impl BodyEncoder for XmlEncoder {
    fn encode(&self, payload: &Payload) -> Result<Encoded, EncodeError> {
        let body = match payload {
            Payload::Raw(raw) => {
                Self::check_well_formed(raw)?;
                raw.clone()
            }
            Payload::Structured(value @ Value::Object(_)) => {
                let xml = quick_xml::se::to_string_with_root(&self.root, value)
                    .map_err(|e| EncodeError::Xml(e.to_string()))?;
                Bytes::from(xml)
            }
            Payload::Structured(value) => return Err(EncodeError::UnsupportedXml(kind_of(value))),
        };

        Ok(Encoded {
            body,
            content_type: XML_CONTENT_TYPE,
        })
    }
}
