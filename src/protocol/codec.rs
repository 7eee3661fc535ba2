//! MessagePack codec adapter.
//!
//! Typed data goes through `rmp-serde` with named struct fields (maps on the
//! wire); untyped payloads are handled as [`rmpv::Value`] so arbitrary
//! conductor responses survive decoding with map order and binary data intact.

// ============================================================================
// Imports
// ============================================================================

use rmpv::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a value as MessagePack, structs as maps.
pub fn encode<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Encodes an untyped value.
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    encode(value)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes MessagePack into a typed value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Decodes MessagePack into an untyped value.
pub fn decode_value(mut bytes: &[u8]) -> Result<Value> {
    Ok(rmpv::decode::read_value(&mut bytes)?)
}

/// Converts any serializable value into an untyped value.
pub fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(rmpv::ext::to_value(value)?)
}

/// Converts an untyped value into a typed one.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(rmpv::ext::from_value(value)?)
}

// ============================================================================
// Value Helpers
// ============================================================================

/// Looks up a string key in a map value.
#[must_use]
pub fn map_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

/// Removes a string key from a map value, returning its value.
pub fn map_take(value: &mut Value, key: &str) -> Option<Value> {
    let Value::Map(entries) = value else {
        return None;
    };
    let index = entries.iter().position(|(k, _)| k.as_str() == Some(key))?;
    Some(entries.remove(index).1)
}

/// Reads an enum tag from either wire form.
///
/// Accepts a plain string (`"error"`) or an externally tagged unit variant,
/// a single-key map (`{"error": nil}`).
#[must_use]
pub fn tag_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => s.as_str(),
        Value::Map(entries) if entries.len() == 1 => entries[0].0.as_str(),
        _ => None,
    }
}

/// Lists the string keys of a map value, for diagnostics.
#[must_use]
pub fn map_keys(value: &Value) -> Vec<String> {
    match value.as_map() {
        Some(entries) => entries
            .iter()
            .map(|(k, _)| k.as_str().map_or_else(|| k.to_string(), str::to_string))
            .collect(),
        None => Vec::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
