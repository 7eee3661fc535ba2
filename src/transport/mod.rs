//! WebSocket transport layer.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐                          ┌─────────────────┐
//! │  Connection       │                          │  Conductor      │
//! │  (cloneable)      │        WebSocket         │  admin / app    │
//! │        │          │◄────────────────────────►│  interface      │
//! │  socket task      │      MessagePack         │                 │
//! │  pending table    │                          │                 │
//! └───────────────────┘                          └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `address` | Port / URI resolution and `wrap` inputs |
//! | `connection` | Public handle and lifecycle |
//! | `dispatch` | Inbound frame routing |
//! | `event_loop` | Socket task |
//! | `pending` | Correlation table |
//! | `signals` | Signal subscribers |

// ============================================================================
// Submodules
// ============================================================================

/// Connection addresses.
pub mod address;

/// Conductor connection.
pub mod connection;

mod dispatch;
mod event_loop;
mod pending;

/// Signal subscribers.
pub mod signals;

// ============================================================================
// Re-exports
// ============================================================================

pub use address::{Address, Endpoint, Wrapped};
pub use connection::{ABNORMAL_CLOSURE, Connection, NORMAL_CLOSURE, ReadyState};
pub use signals::SignalHandler;
