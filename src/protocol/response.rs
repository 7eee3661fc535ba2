//! Inner response document.
//!
//! Success:
//!
//! ```text
//! { "type": "app_installed", "data": <payload> }
//! ```
//!
//! Error:
//!
//! ```text
//! { "type": "error", "data": { "type": "ribosome_error", "data": "message" } }
//! ```
//!
//! Both `type` fields may also arrive externally tagged (`{ "error": nil }`).

// ============================================================================
// Imports
// ============================================================================

use rmpv::Value;

use crate::error::{Error, Result};

use super::codec;

/// Response type tag that marks an error record.
pub const ERROR_TYPE: &str = "error";

// ============================================================================
// ErrorRecord
// ============================================================================

/// Error record carried by an error response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    /// Error kind tag, e.g. `internal_error`.
    pub tag: String,
    /// Human-readable message, or the rendered structure if not a string.
    pub message: String,
}

impl ErrorRecord {
    fn from_value(value: &Value) -> Result<Self> {
        let tag = codec::map_get(value, "type")
            .and_then(codec::tag_of)
            .ok_or_else(|| {
                Error::protocol(format!(
                    "Error response without a type tag: {{ {} }}",
                    codec::map_keys(value).join(", ")
                ))
            })?
            .to_string();

        let message = match codec::map_get(value, "data") {
            Some(Value::String(s)) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
            Some(other) => other.to_string(),
            None => String::new(),
        };

        Ok(Self { tag, message })
    }
}

// ============================================================================
// ResponsePayload
// ============================================================================

/// Decoded inner response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// Successful call; holds the response `data`.
    Ok(Value),
    /// Conductor-reported failure.
    Error(ErrorRecord),
}

impl ResponsePayload {
    /// Decodes the inner response document.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = codec::decode_value(bytes)?;
        Self::from_value(value)
    }

    /// Interprets an already decoded inner response.
    pub fn from_value(mut value: Value) -> Result<Self> {
        if !value.is_map() {
            return Err(Error::protocol(format!(
                "Response payload is not a map: {value}"
            )));
        }

        let is_error = codec::map_get(&value, "type").and_then(codec::tag_of) == Some(ERROR_TYPE);
        let data = codec::map_take(&mut value, "data").unwrap_or(Value::Nil);

        if is_error {
            Ok(Self::Error(ErrorRecord::from_value(&data)?))
        } else {
            Ok(Self::Ok(data))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
