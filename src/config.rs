//! Engine configuration.
//!
//! Reserved error codes and the messages used by the built-in renderer are plain data
//! here. An [`EngineConfig`] is built once at startup, frozen behind an `Arc` and handed
//! to the dispatch engine, which shares it with every request context.

use crate::error::ServerResult;
use serde::Deserialize;

pub const URL_NOT_FOUND: &str = "URL_NOT_FOUND";
pub const RUNTIME_ERROR: &str = "RUNTIME_ERROR";
pub const INVALID_JSON: &str = "INVALID_JSON";
pub const INVALID_XML: &str = "INVALID_XML";

/// Error codes the engine raises by itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ErrorCodes {
    pub not_found: String,
    pub runtime_error: String,
    pub invalid_json: String,
    pub invalid_xml: String,
}

impl Default for ErrorCodes {
    fn default() -> Self {
        Self {
            not_found: URL_NOT_FOUND.to_string(),
            runtime_error: RUNTIME_ERROR.to_string(),
            invalid_json: INVALID_JSON.to_string(),
            invalid_xml: INVALID_XML.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub codes: ErrorCodes,
    /// Message of the cause attached to the not-found code.
    pub not_found_message: String,
    /// Body written when rendering the fallback response fails.
    pub internal_error_body: String,
    /// Root element for structured XML bodies.
    pub xml_root: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            codes: ErrorCodes::default(),
            not_found_message: "URL not found".to_string(),
            internal_error_body: "Internal Server Error".to_string(),
            xml_root: "response".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document; omitted keys keep their defaults.
    ///
    /// ```toml
    /// not_found_message = "nothing here"
    ///
    /// [codes]
    /// not_found = "NOT_FOUND"
    /// ```
    pub fn from_toml_str(source: &str) -> ServerResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> ServerResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
