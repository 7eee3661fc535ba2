//! Conductor wire protocol.
//!
//! Frames are MessagePack documents nested two (responses) or three (app
//! signals) levels deep. Each level is decoded separately.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `request` | Local → Conductor | API call, correlated by `id` |
//! | `authenticate` | Local → Conductor | App interface token |
//! | `response` | Conductor → Local | Result or error record for `id` |
//! | `signal` | Conductor → Local | Unsolicited system or app signal |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | MessagePack encode/decode and value helpers |
//! | `envelope` | Outer frame and request payloads |
//! | `response` | Inner response decoding |
//! | `signal` | Inner signal decoding |

// ============================================================================
// Submodules
// ============================================================================

/// MessagePack codec adapter.
pub mod codec;

/// Outer message envelope.
pub mod envelope;

/// Inner response document.
pub mod response;

/// Inner signal document.
pub mod signal;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{AuthenticatePayload, Envelope, MessageKind, request_payload};
pub use response::{ErrorRecord, ResponsePayload};
pub use signal::{AppSignal, SignalEvent, SignalPayload};
