//! Holochain WebSocket - conductor interface client.
//!
//! This library speaks the MessagePack-over-WebSocket protocol of Holochain
//! conductor admin and app interfaces.
//!
//! # Architecture
//!
//! - **Connection**: cloneable handle over one WebSocket, owned by a spawned
//!   socket task
//! - **Requests**: correlated by a per-connection sequential id, settled
//!   exactly once by response, cancellation, timeout or flush
//! - **Signals**: unsolicited app signals fanned out to subscribers
//! - **Errors**: conductor error records classified into [`ConductorError`]
//!
//! # Quick Start
//!
//! ```no_run
//! use holochain_websocket::{Connection, ConnectionOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let conn = Connection::new(8888u16, ConnectionOptions::new().with_name("admin"))?;
//!     conn.open().await?;
//!
//!     conn.on_signal(|signal| {
//!         println!("{} sent {:?}", signal.zome, signal.signal.kind);
//!     });
//!
//!     let apps = conn.request("list_apps", ()).await?;
//!     println!("installed apps: {apps}");
//!
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types, conductor error taxonomy, [`Result`] alias |
//! | [`identifiers`] | Type-safe ID and hash wrappers |
//! | [`options`] | Connection configuration |
//! | [`protocol`] | Wire message types and MessagePack codec |
//! | [`transport`] | Connection, socket task and correlation |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Connection configuration.
pub mod options;

/// Conductor wire protocol.
///
/// Envelope, response and signal documents.
pub mod protocol;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{CallSite, ConductorError, Error, Result};

// Identifier types
pub use identifiers::{AgentPubKey, ConnectionId, DnaHash, RequestId, SubscriptionId};

// Configuration
pub use options::{ConnectionOptions, WsOptions};

// Protocol types
pub use protocol::{AppSignal, MessageKind, SignalEvent};

// Transport types
pub use transport::{Address, Connection, Endpoint, ReadyState, SignalHandler, Wrapped};

/// Returns `true` if `address` starts with a URI scheme.
pub use transport::address::has_scheme;
