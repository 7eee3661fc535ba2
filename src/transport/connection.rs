//! Conductor connection.
//!
//! A [`Connection`] multiplexes concurrent requests over one WebSocket and
//! routes inbound frames to the waiting caller (responses) or to signal
//! subscribers (signals).
//!
//! # Lifecycle
//!
//! ```text
//! CONNECTING ──► OPEN ──► CLOSING ──► CLOSED
//!      │
//!      └──► CLOSED (failed to open)
//! ```
//!
//! The socket is owned by a spawned task (see `event_loop`). Handles talk to
//! it through a command channel and share the pending table and lifecycle
//! state with it. Dropping the last handle closes the socket.
//!
//! # Example
//!
//! ```no_run
//! use holochain_websocket::{Connection, ConnectionOptions};
//!
//! # async fn example() -> holochain_websocket::Result<()> {
//! let conn = Connection::new(4444u16, ConnectionOptions::new().with_name("admin"))?;
//! conn.open().await?;
//!
//! let port = conn.request("attach_app_interface", ()).await?;
//! println!("app interface: {port}");
//!
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rmpv::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

use crate::error::{CallSite, Error, Result};
use crate::identifiers::{ConnectionId, RequestId, SubscriptionId};
use crate::options::ConnectionOptions;
use crate::protocol::{AuthenticatePayload, Envelope, MessageKind, SignalEvent, codec, request_payload};

use super::address::{Address, Endpoint, Wrapped};
use super::event_loop::{self, LoopCommand};
use super::pending::{PendingRequest, PendingRequests};
use super::signals::SignalSubscribers;

// ============================================================================
// Constants
// ============================================================================

/// Close code sent by [`Connection::close`].
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the socket ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported for a close frame without a status.
pub(crate) const NO_STATUS_RECEIVED: u16 = 1005;

/// Reason sent with a normal closure.
pub(crate) const CLOSE_REASON: &str = "Client closed connection";

// ============================================================================
// ReadyState
// ============================================================================

/// Socket state, numbered like the WebSocket `readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting = 0,
    /// Ready for traffic.
    Open = 1,
    /// Close handshake in progress.
    Closing = 2,
    /// Closed, or never opened.
    Closed = 3,
}

impl ReadyState {
    /// Returns the numeric state.
    #[inline]
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Returns the state name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LinkState
// ============================================================================

/// Internal lifecycle state, richer than [`ReadyState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkState {
    Connecting,
    Open,
    Closing,
    Closed { code: u16 },
    Failed { reason: String },
}

impl LinkState {
    fn ready_state(&self) -> ReadyState {
        match self {
            Self::Connecting => ReadyState::Connecting,
            Self::Open => ReadyState::Open,
            Self::Closing => ReadyState::Closing,
            Self::Closed { .. } | Self::Failed { .. } => ReadyState::Closed,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Failed { .. })
    }
}

// ============================================================================
// Core
// ============================================================================

/// State shared between connection handles and the socket task.
pub(crate) struct Core {
    /// Sequential connection id.
    pub(crate) id: ConnectionId,
    /// Display name, `"{id}:{label}"`.
    pub(crate) name: String,
    /// Resolved target URI.
    pub(crate) uri: String,
    /// Socket supplied by the caller rather than dialed here.
    pub(crate) shared_socket: bool,
    /// Effective options.
    pub(crate) options: ConnectionOptions,
    /// Lifecycle state.
    state: watch::Sender<LinkState>,
    /// Reached OPEN at least once.
    opened: AtomicBool,
    /// Socket fully closed.
    closed: AtomicBool,
    /// Next correlation id.
    message_count: AtomicU64,
    /// In-flight requests.
    pub(crate) pending: Mutex<PendingRequests>,
    /// Signal handlers.
    pub(crate) subscribers: SignalSubscribers,
}

impl Core {
    pub(crate) fn new(
        uri: String,
        shared_socket: bool,
        options: ConnectionOptions,
        initial: LinkState,
    ) -> Self {
        let id = ConnectionId::next();
        let label = options.name.clone().unwrap_or_else(random_label);
        let opened = initial == LinkState::Open;

        Self {
            id,
            name: format!("{id}:{label}"),
            uri,
            shared_socket,
            options,
            state: watch::Sender::new(initial),
            opened: AtomicBool::new(opened),
            closed: AtomicBool::new(false),
            message_count: AtomicU64::new(0),
            pending: Mutex::new(PendingRequests::default()),
            subscribers: SignalSubscribers::default(),
        }
    }

    #[inline]
    pub(crate) fn link_state(&self) -> LinkState {
        self.state.borrow().clone()
    }

    /// CONNECTING → OPEN.
    pub(crate) fn mark_open(&self) {
        self.opened.store(true, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if *state == LinkState::Connecting {
                *state = LinkState::Open;
                true
            } else {
                false
            }
        });
        debug!(conn = %self.name, "Received 'open' event");
    }

    /// CONNECTING | OPEN → CLOSING.
    ///
    /// Returns `true` only for the call that made the transition.
    pub(crate) fn mark_closing(&self) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, LinkState::Connecting | LinkState::Open) {
                *state = LinkState::Closing;
                true
            } else {
                false
            }
        })
    }

    /// Any state → CLOSED, keeping the first recorded code.
    pub(crate) fn mark_closed(&self, code: u16) {
        self.closed.store(true, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = LinkState::Closed { code };
                true
            }
        });
        debug!(conn = %self.name, code, "Received 'close' event");
    }

    /// CONNECTING → failed to open.
    pub(crate) fn mark_failed(&self, reason: String) {
        self.closed.store(true, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = LinkState::Failed { reason };
                true
            }
        });
    }

    /// Rejects every pending request; returns how many were flushed.
    pub(crate) fn flush(&self) -> usize {
        let drained = self.pending.lock().drain();
        let count = drained.len();

        for (id, request) in drained {
            trace!(conn = %self.name, %id, method = request.method(), "Flushing pending request");
            request.flush();
        }

        if count > 0 {
            debug!(conn = %self.name, count, "Flushed pending requests");
        }
        count
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::new(self.message_count.fetch_add(1, Ordering::SeqCst))
    }

    fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }
}

/// Six random characters for unnamed connections.
fn random_label() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

// ============================================================================
// Connection
// ============================================================================

/// Client connection to a conductor interface.
///
/// Cheap to clone; clones share the socket, pending table and subscribers.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
#[derive(Clone)]
pub struct Connection {
    /// Shared state (also held by the socket task).
    core: Arc<Core>,
    /// Channel to the socket task.
    command_tx: mpsc::UnboundedSender<LoopCommand>,
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Creates a connection and starts opening it.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPort`] if a port is outside `1..=65535`
    /// - [`Error::Url`] if the resolved URI is invalid
    /// - [`Error::Config`] if no tokio runtime is running
    pub fn new(address: impl Into<Address>, options: ConnectionOptions) -> Result<Self> {
        let uri = address.into().resolve(&options)?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Connection requires a running tokio runtime"))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let core = Arc::new(Core::new(uri, false, options, LinkState::Connecting));

        debug!(conn = %core.name, uri = %core.uri, "Opening connection");
        runtime.spawn(event_loop::connect_and_run(Arc::clone(&core), command_rx));

        Ok(Self { core, command_tx })
    }

    /// Wraps an already open WebSocket.
    ///
    /// The connection does not own the socket: [`close`](Self::close) is
    /// refused and the socket is released when the last handle drops.
    /// `uri` names the socket's target for display.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `uri` is invalid
    /// - [`Error::Config`] if no tokio runtime is running
    pub fn from_socket<S>(
        stream: WebSocketStream<S>,
        uri: impl Into<String>,
        options: ConnectionOptions,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let uri = uri.into();
        Url::parse(&uri)?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Connection requires a running tokio runtime"))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let core = Arc::new(Core::new(uri, true, options, LinkState::Open));

        debug!(conn = %core.name, uri = %core.uri, "Wrapping shared socket");
        runtime.spawn(event_loop::run(stream, command_rx, Arc::clone(&core), Vec::new()));

        Ok(Self { core, command_tx })
    }

    /// Returns the given connection, or creates one for an address.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::new`] when a new connection is created.
    pub fn wrap(endpoint: impl Into<Endpoint>, options: ConnectionOptions) -> Result<Wrapped> {
        match endpoint.into() {
            Endpoint::Connection(conn) => Ok(Wrapped::Existing(conn)),
            Endpoint::Address(address) => Ok(Wrapped::New(Self::new(address, options)?)),
        }
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the sequential connection id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.core.id
    }

    /// Returns the display name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Returns the target URI.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.core.uri
    }

    /// Returns the socket state.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.core.link_state().ready_state()
    }

    /// Returns the socket state name.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &'static str {
        self.ready_state().as_str()
    }

    /// Returns `true` if the socket was supplied by the caller.
    #[inline]
    #[must_use]
    pub fn shared_socket(&self) -> bool {
        self.core.shared_socket
    }

    /// Returns the next correlation id to be assigned.
    #[inline]
    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.core.message_count.load(Ordering::SeqCst)
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.core.pending.lock().len()
    }

    /// Returns `true` once the socket has reached OPEN.
    #[inline]
    #[must_use]
    pub fn opened(&self) -> bool {
        self.core.opened.load(Ordering::SeqCst)
    }

    /// Returns `true` once the socket has fully closed.
    #[inline]
    #[must_use]
    pub fn closed(&self) -> bool {
        self.core.closed.load(Ordering::SeqCst)
    }

    /// Returns the effective options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.core.options
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Waits until the socket is open, with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`open_with_timeout`](Self::open_with_timeout).
    pub async fn open(&self) -> Result<()> {
        self.open_with_timeout(self.core.options.timeout).await
    }

    /// Waits until the socket is open.
    ///
    /// Returns immediately if it has opened before.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the socket failed or closed before opening
    /// - [`Error::Timeout`] if it did not settle in time
    pub async fn open_with_timeout(&self, deadline: Duration) -> Result<()> {
        if self.opened() {
            return Ok(());
        }

        let mut state = self.core.subscribe_state();
        let settled = {
            let current = timeout(deadline, state.wait_for(|s| *s != LinkState::Connecting))
                .await
                .map_err(|_| Error::timeout("open WebSocket", millis(deadline)))?
                .map_err(|_| Error::ConnectionClosed)?;
            LinkState::clone(&current)
        };

        if self.opened() {
            return Ok(());
        }

        match settled {
            LinkState::Failed { reason } => Err(Error::connection(reason)),
            _ => Err(Error::connection(format!(
                "WebSocket({}) closed before it opened",
                self.core.uri
            ))),
        }
    }

    /// Closes the socket, with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`close_with_timeout`](Self::close_with_timeout).
    pub async fn close(&self) -> Result<u16> {
        self.close_with_timeout(self.core.options.timeout).await
    }

    /// Closes the socket and returns the close code.
    ///
    /// Pending requests are flushed immediately. Closing a connection that
    /// never opened returns [`ABNORMAL_CLOSURE`].
    ///
    /// # Errors
    ///
    /// - [`Error::SharedSocket`] if the socket was supplied by the caller
    /// - [`Error::Timeout`] if the close handshake did not finish in time
    pub async fn close_with_timeout(&self, deadline: Duration) -> Result<u16> {
        if self.core.shared_socket {
            return Err(Error::SharedSocket);
        }

        match self.core.link_state() {
            LinkState::Closed { code } => return Ok(code),
            LinkState::Failed { .. } => return Ok(ABNORMAL_CLOSURE),
            _ => {}
        }

        // Only the handle that moves the link to CLOSING sends the close frame
        if self.core.mark_closing() {
            debug!(conn = %self.core.name, "Closing connection on purpose");
            // A send error means the socket task already ended; its final state is awaited below
            let _ = self.command_tx.send(LoopCommand::Close {
                code: NORMAL_CLOSURE,
                reason: CLOSE_REASON,
            });
        }
        self.core.flush();

        let mut state = self.core.subscribe_state();
        let settled = {
            let current = timeout(deadline, state.wait_for(LinkState::is_terminal))
                .await
                .map_err(|_| Error::timeout("close WebSocket", millis(deadline)))?
                .map_err(|_| Error::ConnectionClosed)?;
            LinkState::clone(&current)
        };

        match settled {
            LinkState::Closed { code } => Ok(code),
            _ => Ok(ABNORMAL_CLOSURE),
        }
    }

    /// Rejects every pending request with [`Error::ConnectionFlushed`].
    ///
    /// Returns the number of requests flushed.
    pub fn flush(&self) -> usize {
        self.core.flush()
    }
}

// ============================================================================
// Connection - Messaging
// ============================================================================

impl Connection {
    /// Encodes and writes one message.
    ///
    /// Waits for the socket to open if it is still connecting.
    ///
    /// # Errors
    ///
    /// - [`Error::SocketClosed`] if the socket is closing or closed
    /// - [`Error::Encode`] if the payload cannot be encoded
    /// - [`Error::WebSocket`] if the write fails
    pub async fn send<P>(&self, kind: MessageKind, payload: &P, id: Option<RequestId>) -> Result<()>
    where
        P: Serialize + ?Sized,
    {
        let frame = Envelope::new(kind, payload, id)?.encode()?;

        match self.core.link_state() {
            LinkState::Connecting => self.open().await?,
            LinkState::Open => {}
            _ => return Err(Error::SocketClosed),
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(LoopCommand::Send {
                frame,
                done: done_tx,
            })
            .map_err(|_| Error::SocketClosed)?;

        done_rx.await?
    }

    /// Sends an app interface authentication token.
    ///
    /// The conductor does not answer; later requests on this socket are
    /// honoured once it has processed the token.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the token is empty
    /// - any error of [`open`](Self::open) or [`send`](Self::send)
    pub async fn authenticate(&self, token: &[u8]) -> Result<()> {
        if token.is_empty() {
            return Err(Error::invalid_argument(
                "Authentication token must not be empty",
            ));
        }

        self.open().await?;

        let payload = AuthenticatePayload {
            token: token.to_vec(),
        };
        self.send(MessageKind::Authenticate, &payload, None).await?;

        debug!(conn = %self.core.name, "Sent authentication token");
        Ok(())
    }

    /// Calls `method` with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`request_with_timeout`](Self::request_with_timeout).
    #[track_caller]
    pub fn request<'a, A>(
        &'a self,
        method: &str,
        args: A,
    ) -> impl Future<Output = Result<Value>> + Send + use<'a, A>
    where
        A: Serialize,
    {
        self.request_with_timeout(method, args, self.core.options.timeout)
    }

    /// Calls `method` and waits for its response.
    ///
    /// The caller's location is recorded and attached to any error the
    /// response produces.
    ///
    /// # Errors
    ///
    /// - [`Error::Conductor`] if the conductor returned an error record
    /// - [`Error::ResponseCancelled`] if the conductor cancelled the response
    /// - [`Error::ConnectionFlushed`] if the connection closed first
    /// - [`Error::Timeout`] if no response arrived in time
    /// - [`Error::SocketClosed`] if the socket is closing or closed
    #[track_caller]
    pub fn request_with_timeout<'a, A>(
        &'a self,
        method: &str,
        args: A,
        deadline: Duration,
    ) -> impl Future<Output = Result<Value>> + Send + use<'a, A>
    where
        A: Serialize,
    {
        let call_site = CallSite::capture();
        let method = method.to_string();
        let args = codec::to_value(args);

        async move {
            let args = args?;
            let operation = format!("get response for request '{method}'");

            match timeout(deadline, self.round_trip(method, args, call_site)).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(operation, millis(deadline))),
            }
        }
    }

    /// Calls `method` and decodes the response into `R`.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request), plus [`Error::Value`] if the
    /// response does not fit `R`.
    #[track_caller]
    pub fn call<'a, A, R>(
        &'a self,
        method: &str,
        args: A,
    ) -> impl Future<Output = Result<R>> + Send + use<'a, A, R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let response = self.request(method, args);
        async move { codec::from_value(response.await?) }
    }

    /// Registers the request, writes it, and waits for its settlement.
    async fn round_trip(&self, method: String, args: Value, call_site: CallSite) -> Result<Value> {
        let id = self.core.next_request_id();
        let payload = request_payload(&method, args.clone());
        let (tx, rx) = oneshot::channel();

        self.core
            .pending
            .lock()
            .insert(id, PendingRequest::new(method.clone(), args, call_site, tx));
        trace!(conn = %self.core.name, %id, method = %method, "Request registered");

        if let Err(e) = self.send(MessageKind::Request, &payload, Some(id)).await {
            self.core.pending.lock().take(id);
            return Err(e);
        }

        rx.await.map_err(|_| Error::ConnectionClosed)?
    }
}

// ============================================================================
// Connection - Signals
// ============================================================================

impl Connection {
    /// Registers a handler for app signals.
    ///
    /// Handlers run on the socket task in registration order.
    pub fn on_signal<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SignalEvent) + Send + Sync + 'static,
    {
        self.core.subscribers.subscribe(Arc::new(handler))
    }

    /// Removes a signal handler; returns `false` if it was not registered.
    pub fn off_signal(&self, id: SubscriptionId) -> bool {
        self.core.subscribers.unsubscribe(id)
    }

    /// Returns the number of registered signal handlers.
    #[inline]
    #[must_use]
    pub fn signal_handler_count(&self) -> usize {
        self.core.subscribers.len()
    }
}

// ============================================================================
// Formatting
// ============================================================================

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:>12}",
            ellipsis_end(&self.core.name, 8),
            ellipsis_start(&self.core.uri, 25),
            format!("[{}]", self.state()),
        )
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("uri", &self.core.uri)
            .field("state", &self.ready_state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Truncates at the end with `…`, or pads to `width`.
fn ellipsis_end(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    } else {
        format!("{s:<width$}")
    }
}

/// Truncates at the start with `…`, or left-pads to `width`.
fn ellipsis_start(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len > width {
        let tail: String = s.chars().skip(len - width.saturating_sub(1)).collect();
        format!("…{tail}")
    } else {
        format!("{s:>width$}")
    }
}

#[inline]
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_constants() {
        assert_eq!(NORMAL_CLOSURE, 1000);
        assert_eq!(ABNORMAL_CLOSURE, 1006);
    }

    #[test]
    fn test_ready_state_numbers() {
        assert_eq!(ReadyState::Connecting.as_u8(), 0);
        assert_eq!(ReadyState::Open.as_u8(), 1);
        assert_eq!(ReadyState::Closing.as_u8(), 2);
        assert_eq!(ReadyState::Closed.as_u8(), 3);
        assert_eq!(ReadyState::Closing.to_string(), "CLOSING");
    }

    #[test]
    fn test_failed_reports_closed() {
        let state = LinkState::Failed {
            reason: "refused".into(),
        };
        assert_eq!(state.ready_state(), ReadyState::Closed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_core_name_uses_label() {
        let core = Core::new(
            "ws://localhost:1".into(),
            false,
            ConnectionOptions::new().with_name("admin"),
            LinkState::Connecting,
        );
        assert_eq!(core.name, format!("{}:admin", core.id));
        assert!(!core.opened.load(Ordering::SeqCst));
    }

    #[test]
    fn test_core_random_label() {
        let core = Core::new(
            "ws://localhost:1".into(),
            false,
            ConnectionOptions::new(),
            LinkState::Open,
        );
        let label = core.name.split(':').nth(1).expect("label");
        assert_eq!(label.len(), 6);
        assert!(core.opened.load(Ordering::SeqCst));
    }

    #[test]
    fn test_state_transitions() {
        let core = Core::new(
            "ws://localhost:1".into(),
            false,
            ConnectionOptions::new(),
            LinkState::Connecting,
        );

        core.mark_open();
        assert_eq!(core.link_state(), LinkState::Open);

        assert!(core.mark_closing());
        assert!(!core.mark_closing());
        assert_eq!(core.link_state(), LinkState::Closing);

        core.mark_closed(NORMAL_CLOSURE);
        core.mark_closed(ABNORMAL_CLOSURE);
        assert_eq!(core.link_state(), LinkState::Closed { code: 1000 });
        assert!(core.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_request_ids_are_sequential() {
        let core = Core::new(
            "ws://localhost:1".into(),
            false,
            ConnectionOptions::new(),
            LinkState::Open,
        );
        let ids: Vec<u64> = (0..5).map(|_| core.next_request_id().as_u64()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_ellipsis_helpers() {
        assert_eq!(ellipsis_end("0:abcdefgh", 8), "0:abcde…");
        assert_eq!(ellipsis_end("0:ab", 8), "0:ab    ");
        assert_eq!(ellipsis_start("ws://localhost:8888", 10), "…host:8888");
        assert_eq!(ellipsis_start("ws://a:1", 10), "  ws://a:1");
    }

    #[test]
    fn test_new_without_runtime_fails() {
        let result = Connection::new(8888u16, ConnectionOptions::new());
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_new_rejects_bad_port_first() {
        let result = Connection::new(70_000u32, ConnectionOptions::new());
        assert!(matches!(result, Err(Error::InvalidPort { port: 70_000 })));
    }

    proptest! {
        #[test]
        fn prop_request_ids_strictly_increase(count in 1usize..256) {
            let core = Core::new(
                "ws://localhost:1".into(),
                false,
                ConnectionOptions::new(),
                LinkState::Open,
            );
            let ids: Vec<u64> = (0..count).map(|_| core.next_request_id().as_u64()).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(core.message_count.load(Ordering::SeqCst), count as u64);
        }
    }
}
