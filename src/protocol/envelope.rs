//! Outer message envelope.
//!
//! Every frame on the socket is one MessagePack map:
//!
//! ```text
//! { "id": 3 | nil, "type": "request", "data": <bin> }
//! ```
//!
//! `data` holds a second, independently encoded MessagePack document. Requests
//! carry `{ "type": { <method>: nil }, "data": <args> }` inside it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use rmpv::Value;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::codec;

// ============================================================================
// MessageKind
// ============================================================================

/// Value of the envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Client to conductor call.
    Request,
    /// Conductor reply to a request.
    Response,
    /// Unsolicited conductor push.
    Signal,
    /// App interface authentication.
    Authenticate,
}

impl MessageKind {
    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Signal => "signal",
            Self::Authenticate => "authenticate",
        }
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "request" => Ok(Self::Request),
            "response" => Ok(Self::Response),
            "signal" => Ok(Self::Signal),
            "authenticate" => Ok(Self::Authenticate),
            other => Err(Error::protocol(format!("Unknown message type: {other}"))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Outer frame exchanged with the conductor.
///
/// `kind` stays a string so unknown types decode and can be reported rather
/// than failing the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id; `nil` for frames outside request/response.
    #[serde(default)]
    pub id: Option<RequestId>,

    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Inner MessagePack document. `nil` on a response means cancelled.
    #[serde(default)]
    pub data: Option<ByteBuf>,
}

impl Envelope {
    /// Builds an envelope by encoding `payload` as the inner document.
    pub fn new<P>(kind: MessageKind, payload: &P, id: Option<RequestId>) -> Result<Self>
    where
        P: Serialize + ?Sized,
    {
        Ok(Self {
            id,
            kind: kind.as_str().to_string(),
            data: Some(ByteBuf::from(codec::encode(payload)?)),
        })
    }

    /// Decodes an envelope from a socket frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }

    /// Encodes the envelope for the socket.
    pub fn encode(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    /// Parses the message type.
    pub fn message_kind(&self) -> Result<MessageKind> {
        self.kind.parse()
    }

    /// Returns the inner document bytes, if present.
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref().map(|b| b.as_slice())
    }
}

// ============================================================================
// Request Payload
// ============================================================================

/// Builds the inner request document `{ type: { method: nil }, data: args }`.
#[must_use]
pub fn request_payload(method: &str, args: Value) -> Value {
    Value::Map(vec![
        (
            Value::from("type"),
            Value::Map(vec![(Value::from(method), Value::Nil)]),
        ),
        (Value::from("data"), args),
    ])
}

/// Inner document of an `authenticate` message.
///
/// The token goes out as a plain array of integers, not a binary blob.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatePayload {
    /// Authentication token bytes.
    pub token: Vec<u8>,
}

// ============================================================================
// Tests
// ============================================================================
