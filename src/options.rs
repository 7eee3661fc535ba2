//! Connection configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use holochain_websocket::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_name("admin")
//!     .with_host("127.0.0.1")
//!     .with_timeout(Duration::from_secs(5))
//!     .with_origin("node");
//!
//! assert_eq!(options.scheme(), "ws://");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for open, close and request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Default host combined with a bare port.
pub const DEFAULT_HOST: &str = "localhost";

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Diagnostic label; a random one is generated when `None`.
    pub name: Option<String>,

    /// Default deadline for open, close and request.
    pub timeout: Duration,

    /// Host used when the address is a bare port.
    pub host: String,

    /// Use `wss://` instead of `ws://` for addresses without a scheme.
    pub secure: bool,

    /// Options passed through to the WebSocket handshake.
    pub ws: WsOptions,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            name: None,
            timeout: DEFAULT_TIMEOUT,
            host: DEFAULT_HOST.to_string(),
            secure: false,
            ws: WsOptions::default(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the diagnostic name.
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the default deadline.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the host used with bare ports.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Selects the secure scheme.
    #[inline]
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the handshake `Origin` header.
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.ws.origin = Some(origin.into());
        self
    }

    /// Replaces the WebSocket options.
    #[inline]
    #[must_use]
    pub fn with_ws_options(mut self, ws: WsOptions) -> Self {
        self.ws = ws;
        self
    }

    /// Returns the scheme prefix for addresses without one.
    #[inline]
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss://" } else { "ws://" }
    }
}

// ============================================================================
// WsOptions
// ============================================================================

/// WebSocket handshake and framing options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WsOptions {
    /// `Origin` header sent with the handshake.
    pub origin: Option<String>,

    /// Largest accepted message in bytes.
    pub max_message_size: Option<usize>,

    /// Largest accepted frame in bytes.
    pub max_frame_size: Option<usize>,

    /// Disable Nagle's algorithm on the TCP stream.
    pub disable_nagle: bool,
}

impl WsOptions {
    /// Sets the largest accepted message.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Sets the largest accepted frame.
    #[inline]
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = Some(size);
        self
    }

    /// Disables Nagle's algorithm.
    #[inline]
    #[must_use]
    pub fn with_nodelay(mut self) -> Self {
        self.disable_nagle = true;
        self
    }

    /// Builds the tungstenite configuration, if any limit is set.
    #[must_use]
    pub(crate) fn to_config(&self) -> Option<WebSocketConfig> {
        if self.max_message_size.is_none() && self.max_frame_size.is_none() {
            return None;
        }

        let mut config = WebSocketConfig::default();
        if let Some(size) = self.max_message_size {
            config = config.max_message_size(Some(size));
        }
        if let Some(size) = self.max_frame_size {
            config = config.max_frame_size(Some(size));
        }
        Some(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
