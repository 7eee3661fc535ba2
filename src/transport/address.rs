//! Connection addresses.
//!
//! An address is either a bare port combined with the configured host, or a
//! URI. URIs without a scheme get `ws://` or `wss://` depending on
//! [`ConnectionOptions::secure`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};
use crate::options::ConnectionOptions;

use super::Connection;

/// Matches a leading `scheme://`.
static URI_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.\-+]+://").expect("static regex is valid"));

// ============================================================================
// Address
// ============================================================================

/// Where a new connection should dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Port on [`ConnectionOptions::host`].
    Port(u32),
    /// `host:port` or a full URI.
    Uri(String),
}

impl Address {
    /// Resolves the address to a validated URI.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPort`] if the port is outside `1..=65535`
    /// - [`Error::Url`] if the result is not a valid URI
    pub fn resolve(&self, options: &ConnectionOptions) -> Result<String> {
        let uri = match self {
            Self::Port(port) => {
                if !(1..65_536).contains(port) {
                    return Err(Error::InvalidPort { port: *port });
                }
                format!("{}{}:{}", options.scheme(), options.host, port)
            }
            Self::Uri(address) if has_scheme(address) => address.clone(),
            Self::Uri(address) => format!("{}{}", options.scheme(), address),
        };

        Url::parse(&uri)?;
        Ok(uri)
    }
}

impl From<u16> for Address {
    fn from(port: u16) -> Self {
        Self::Port(u32::from(port))
    }
}

impl From<u32> for Address {
    fn from(port: u32) -> Self {
        Self::Port(port)
    }
}

impl From<&str> for Address {
    fn from(uri: &str) -> Self {
        Self::Uri(uri.to_string())
    }
}

impl From<String> for Address {
    fn from(uri: String) -> Self {
        Self::Uri(uri)
    }
}

/// Returns `true` if the address starts with a scheme.
#[inline]
#[must_use]
pub fn has_scheme(address: &str) -> bool {
    URI_SCHEME.is_match(address)
}

// ============================================================================
// Endpoint
// ============================================================================

/// Input to [`Connection::wrap`]: an address to dial or a live connection.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// Dial a new connection.
    Address(Address),
    /// Reuse an existing connection.
    Connection(Connection),
}

impl From<Connection> for Endpoint {
    fn from(conn: Connection) -> Self {
        Self::Connection(conn)
    }
}

impl From<Address> for Endpoint {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

macro_rules! endpoint_from_address {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Endpoint {
                fn from(address: $ty) -> Self {
                    Self::Address(address.into())
                }
            }
        )*
    };
}

endpoint_from_address!(u16, u32, &str, String);

/// Result of [`Connection::wrap`].
#[derive(Debug, Clone)]
pub enum Wrapped {
    /// A connection created for this call.
    New(Connection),
    /// The connection that was passed in.
    Existing(Connection),
}

impl Wrapped {
    /// Returns the connection either way.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Connection {
        match self {
            Self::New(conn) | Self::Existing(conn) => conn,
        }
    }

    /// Returns `true` if a new connection was created.
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}

// ============================================================================
// Tests
// ============================================================================
