//! Inner signal document and the event delivered to subscribers.
//!
//! ```text
//! { "System": ... }
//! { "App": { "cell_id": [<dna>, <agent>], "zome_name": "z", "signal": <bin> } }
//! ```
//!
//! The app `signal` bytes are a third MessagePack document whose `type` field
//! names the signal; the remaining fields become its data.

// ============================================================================
// Imports
// ============================================================================

use rmpv::Value;
use serde::Deserialize;
use serde_bytes::ByteBuf;

use crate::error::{Error, Result};
use crate::identifiers::{AgentPubKey, DnaHash};

use super::codec;

// ============================================================================
// SignalEvent
// ============================================================================

/// Application signal as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    /// Agent half of the emitting cell id.
    pub agent: AgentPubKey,
    /// DNA half of the emitting cell id.
    pub dna: DnaHash,
    /// Emitting zome.
    pub zome: String,
    /// Raw signal bytes as received.
    pub message: Vec<u8>,
    /// Decoded signal.
    pub signal: AppSignal,
}

/// Decoded app signal body.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSignal {
    /// Signal `type` field, if the body carried one.
    pub kind: Option<String>,
    /// Remaining fields of the body.
    pub data: Value,
}

// ============================================================================
// SignalPayload
// ============================================================================

/// Wire shape of the `App` variant.
#[derive(Debug, Deserialize)]
struct AppSignalPayload {
    cell_id: (ByteBuf, ByteBuf),
    zome_name: String,
    signal: ByteBuf,
}

/// Decoded inner signal document.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalPayload {
    /// Conductor system signal; carried for completeness, not delivered.
    System(Value),
    /// Application signal.
    App(SignalEvent),
}

impl SignalPayload {
    /// Decodes the inner signal document.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the document is neither `System` nor `App`,
    ///   or the app body is not a map
    /// - [`Error::Value`] if the `App` variant is malformed
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = codec::decode_value(bytes)?;

        if let Some(system) = codec::map_get(&value, "System") {
            return Ok(Self::System(system.clone()));
        }

        let Some(app) = codec::map_get(&value, "App") else {
            return Err(Error::protocol(format!(
                "Unknown signal type [{}]",
                codec::map_keys(&value).join(", ")
            )));
        };

        let payload: AppSignalPayload = codec::from_value(app.clone())?;
        let signal = decode_app_signal(&payload.signal)?;
        let (dna, agent) = payload.cell_id;

        Ok(Self::App(SignalEvent {
            agent: AgentPubKey::from_raw(agent.into_vec()),
            dna: DnaHash::from_raw(dna.into_vec()),
            zome: payload.zome_name,
            message: payload.signal.into_vec(),
            signal,
        }))
    }
}

/// Splits an app signal body into its `type` and the remaining fields.
fn decode_app_signal(bytes: &[u8]) -> Result<AppSignal> {
    let mut body = codec::decode_value(bytes)?;

    if !body.is_map() {
        return Err(Error::protocol(format!(
            "App signal body is not a map: {body}"
        )));
    }

    let kind = codec::map_take(&mut body, "type").and_then(|t| codec::tag_of(&t).map(str::to_string));

    Ok(AppSignal { kind, data: body })
}

// ============================================================================
// Tests
// ============================================================================
