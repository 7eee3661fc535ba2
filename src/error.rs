//! Error types for the conductor WebSocket client.
//!
//! Two layers live here:
//!
//! - [`enum@Error`], the crate-wide error returned by every fallible operation
//! - [`ConductorError`], the closed taxonomy of failures reported by the
//!   conductor inside an error response, produced by [`ConductorError::classify`]
//!
//! # Usage
//!
//! ```ignore
//! use holochain_websocket::{ConductorError, Connection, Error};
//!
//! match conn.request("install_app", args).await {
//!     Ok(value) => println!("{value}"),
//!     Err(Error::Conductor { kind: ConductorError::DnaRead { message }, .. }) => {
//!         eprintln!("bad bundle: {message}");
//!     }
//!     Err(other) => return Err(other),
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`], [`Error::InvalidPort`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::SocketClosed`], [`Error::SharedSocket`] |
//! | Request | [`Error::ConnectionFlushed`], [`Error::ResponseCancelled`], [`Error::Timeout`] |
//! | Protocol | [`Error::Protocol`] |
//! | Remote | [`Error::Conductor`] |
//! | External | [`Error::Encode`], [`Error::Decode`], [`Error::ValueDecode`], [`Error::Value`], [`Error::Url`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::Location;
use std::result::Result as StdResult;
use std::sync::LazyLock;

use regex::Regex;
use rmpv::Value;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::warn;

use crate::identifiers::RequestId;
use crate::protocol::codec;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// CallSite
// ============================================================================

/// Source location of the code that issued a request.
///
/// Responses are handled on the socket task, far from the caller. The call
/// site is captured when the request is made and attached to any error the
/// response produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite(&'static Location<'static>);

impl CallSite {
    /// Captures the caller's location.
    ///
    /// Propagates through `#[track_caller]` functions.
    #[inline]
    #[must_use]
    #[track_caller]
    pub fn capture() -> Self {
        Self(Location::caller())
    }

    /// Returns the source file of the call.
    #[inline]
    #[must_use]
    pub fn file(&self) -> &'static str {
        self.0.file()
    }

    /// Returns the line of the call.
    #[inline]
    #[must_use]
    pub fn line(&self) -> u32 {
        self.0.line()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.0.file(), self.0.line(), self.0.column())
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the connection cannot be set up in the current
    /// environment (e.g. no tokio runtime).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument.
    ///
    /// Returned for unusable constructor inputs or operation arguments.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Port number outside `1..=65535`.
    #[error("Invalid port: {port}; must be between 1..65535")]
    InvalidPort {
        /// The rejected port.
        port: u32,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed to open.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The socket task is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Send attempted while the socket is closing or closed.
    #[error("Socket already closed")]
    SocketClosed,

    /// Close attempted on a socket this connection does not own.
    #[error("The WebSocket was not created by this Connection instance")]
    SharedSocket,

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Pending request rejected by a flush.
    #[error("Connection flushed while waiting for '{method}' (called from {call_site})")]
    ConnectionFlushed {
        /// Method of the flushed request.
        method: String,
        /// Where the request was issued.
        call_site: CallSite,
    },

    /// Response frame without a payload.
    ///
    /// The conductor signals cancellation by omitting `data`.
    #[error("Response cancelled by conductor for request {id} '{method}' (called from {call_site})")]
    ResponseCancelled {
        /// Correlation id of the cancelled request.
        id: RequestId,
        /// Method of the cancelled request.
        method: String,
        /// Where the request was issued.
        call_site: CallSite,
    },

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Failure reported by the conductor.
    #[error("{kind} (request '{method}' called from {call_site})")]
    Conductor {
        /// Classified failure kind.
        kind: ConductorError,
        /// Method of the failed request.
        method: String,
        /// Where the request was issued.
        call_site: CallSite,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// MessagePack encoding error.
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// MessagePack value decoding error.
    #[error("Decode error: {0}")]
    ValueDecode(#[from] rmpv::decode::Error),

    /// Conversion between typed data and a MessagePack value failed.
    #[error("Value conversion error: {0}")]
    Value(#[from] rmpv::ext::Error),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::SocketClosed
                | Self::ConnectionFlushed { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this failure was reported by the conductor.
    #[inline]
    #[must_use]
    pub fn is_conductor_error(&self) -> bool {
        matches!(self, Self::Conductor { .. })
    }

    /// Returns the classified conductor failure, if any.
    #[inline]
    #[must_use]
    pub fn conductor_kind(&self) -> Option<&ConductorError> {
        match self {
            Self::Conductor { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Returns the call site of the request that produced this error.
    #[must_use]
    pub fn call_site(&self) -> Option<CallSite> {
        match self {
            Self::Conductor { call_site, .. }
            | Self::ConnectionFlushed { call_site, .. }
            | Self::ResponseCancelled { call_site, .. } => Some(*call_site),
            _ => None,
        }
    }
}

// ============================================================================
// ConductorError
// ============================================================================

/// Wire tags of the known conductor error kinds.
pub mod tags {
    /// Conductor internal failure.
    pub const INTERNAL_ERROR: &str = "internal_error";
    /// Conductor could not decode the request.
    pub const DESERIALIZATION: &str = "deserialization";
    /// DNA file could not be read.
    pub const DNA_READ_ERROR: &str = "dna_read_error";
    /// Ribosome (wasm runtime) failure.
    pub const RIBOSOME_ERROR: &str = "ribosome_error";
    /// App activation failure.
    pub const ACTIVATE_APP: &str = "activate_app";
    /// Zome call rejected by capability check.
    pub const ZOME_CALL_UNAUTHORIZED: &str = "zome_call_unauthorized";
}

/// Marker text of a ribosome error caused by zome input deserialization.
const RIBOSOME_WASM_MARKER: &str = "Wasm runtime error while working with Ribosome";
const RIBOSOME_DESERIALIZE_MARKER: &str = "error: Deserialize";

/// Byte list embedded in a ribosome deserialize message.
static DESERIALIZE_BYTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Deserialize\(\[(?P<bytes>[^\]]*)\]\)").expect("static regex is valid")
});

/// Bytes shown at each end of a long byte preview.
const PREVIEW_EDGE: usize = 16;

/// Failure kinds reported by the conductor in an error response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConductorError {
    /// `internal_error`
    #[error("ConductorError: {message}")]
    Internal {
        /// Conductor message.
        message: String,
    },

    /// `deserialization`
    #[error("DeserializationError: {message}")]
    Deserialization {
        /// Conductor message.
        message: String,
    },

    /// `dna_read_error`
    #[error("DnaReadError: {message}")]
    DnaRead {
        /// Conductor message.
        message: String,
    },

    /// `ribosome_error`
    #[error("RibosomeError: {message}")]
    Ribosome {
        /// Conductor message.
        message: String,
    },

    /// `ribosome_error` caused by the zome failing to decode its input.
    #[error("RibosomeDeserializeError: {message}")]
    RibosomeDeserialize {
        /// Summary naming the target and previewing the bytes.
        message: String,
        /// Zome named in the original call arguments.
        zome: Option<String>,
        /// Function named in the original call arguments.
        function: Option<String>,
        /// Offending input bytes recovered from the conductor message.
        bytes: Vec<u8>,
        /// MessagePack decoding of `bytes`, when decodable.
        data: Option<Value>,
        /// Arguments of the original call.
        context: Value,
    },

    /// `activate_app`
    #[error("ActivateAppError: {message}")]
    ActivateApp {
        /// Conductor message.
        message: String,
    },

    /// `zome_call_unauthorized`
    #[error("ZomeCallUnauthorizedError: {message}")]
    ZomeCallUnauthorized {
        /// Conductor message.
        message: String,
    },

    /// Any tag outside the known set.
    #[error("Conductor error ({tag}): {message}")]
    Unknown {
        /// The unrecognized tag.
        tag: String,
        /// Conductor message.
        message: String,
    },
}

impl ConductorError {
    /// Maps an error record to its typed kind.
    ///
    /// `args` are the arguments of the request that failed; the ribosome
    /// deserialize kind reads the target zome and function from them.
    /// Unknown tags are logged and returned as [`ConductorError::Unknown`].
    #[must_use]
    pub fn classify(tag: &str, message: String, args: &Value) -> Self {
        match tag {
            tags::INTERNAL_ERROR => Self::Internal { message },
            tags::DESERIALIZATION => Self::Deserialization { message },
            tags::DNA_READ_ERROR => Self::DnaRead { message },
            tags::RIBOSOME_ERROR => {
                if message.contains(RIBOSOME_WASM_MARKER)
                    && message.contains(RIBOSOME_DESERIALIZE_MARKER)
                    && let Some(bytes) = parse_deserialize_bytes(&message)
                {
                    Self::ribosome_deserialize(bytes, args)
                } else {
                    Self::Ribosome { message }
                }
            }
            tags::ACTIVATE_APP => Self::ActivateApp { message },
            tags::ZOME_CALL_UNAUTHORIZED => Self::ZomeCallUnauthorized { message },
            _ => {
                warn!(tag, "Unknown conductor error type");
                Self::Unknown {
                    tag: tag.to_string(),
                    message,
                }
            }
        }
    }

    /// Returns the wire tag this kind was classified from.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Internal { .. } => tags::INTERNAL_ERROR,
            Self::Deserialization { .. } => tags::DESERIALIZATION,
            Self::DnaRead { .. } => tags::DNA_READ_ERROR,
            Self::Ribosome { .. } | Self::RibosomeDeserialize { .. } => tags::RIBOSOME_ERROR,
            Self::ActivateApp { .. } => tags::ACTIVATE_APP,
            Self::ZomeCallUnauthorized { .. } => tags::ZOME_CALL_UNAUTHORIZED,
            Self::Unknown { tag, .. } => tag.as_str(),
        }
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Internal { message }
            | Self::Deserialization { message }
            | Self::DnaRead { message }
            | Self::Ribosome { message }
            | Self::RibosomeDeserialize { message, .. }
            | Self::ActivateApp { message }
            | Self::ZomeCallUnauthorized { message }
            | Self::Unknown { message, .. } => message,
        }
    }

    fn ribosome_deserialize(bytes: Vec<u8>, args: &Value) -> Self {
        let zome = codec::map_get(args, "zome_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let function = codec::map_get(args, "fn_name")
            .and_then(Value::as_str)
            .map(str::to_string);

        let message = format!(
            "Failed to deserialize input for '{}->{}' [ {} ]",
            zome.as_deref().unwrap_or("undefined"),
            function.as_deref().unwrap_or("undefined"),
            byte_preview(&bytes),
        );
        let data = codec::decode_value(&bytes).ok();

        Self::RibosomeDeserialize {
            message,
            zome,
            function,
            bytes,
            data,
            context: args.clone(),
        }
    }
}

/// Recovers the byte list from `Deserialize([1, 2, 3])` in a message.
///
/// This parses diagnostic text; it returns `None` as soon as the text stops
/// looking like a list of bytes.
fn parse_deserialize_bytes(message: &str) -> Option<Vec<u8>> {
    let captures = DESERIALIZE_BYTES.captures(message)?;
    let list = captures.name("bytes")?.as_str().trim();

    if list.is_empty() {
        return Some(Vec::new());
    }

    list.split(',')
        .map(|item| item.trim().parse::<u8>().ok())
        .collect()
}

/// Renders bytes as a comma list, eliding the middle of long inputs.
#[must_use]
pub fn byte_preview(bytes: &[u8]) -> String {
    let join = |slice: &[u8]| {
        slice
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    if bytes.len() > PREVIEW_EDGE * 2 {
        format!(
            "{} ... {} more bytes ... {}",
            join(&bytes[..PREVIEW_EDGE]),
            bytes.len() - PREVIEW_EDGE * 2,
            join(&bytes[bytes.len() - PREVIEW_EDGE..]),
        )
    } else {
        join(bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
