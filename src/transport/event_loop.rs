//! Socket task.
//!
//! One task per connection owns the WebSocket. It dials (unless the socket
//! was supplied), then multiplexes inbound frames and outbound commands until
//! either side closes. Whenever it ends, the connection is marked closed and
//! every pending request is flushed.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::options::WsOptions;

use super::connection::{ABNORMAL_CLOSURE, Core, NO_STATUS_RECEIVED};

// ============================================================================
// Types
// ============================================================================

/// Command sent from a connection handle to its socket task.
#[derive(Debug)]
pub(crate) enum LoopCommand {
    /// Write one encoded frame.
    Send {
        frame: Vec<u8>,
        done: oneshot::Sender<Result<()>>,
    },
    /// Start the close handshake.
    Close { code: u16, reason: &'static str },
}

/// Frame queued while the handshake was still running.
type Queued = (Vec<u8>, oneshot::Sender<Result<()>>);

type WsWriter<S> = SplitSink<WebSocketStream<S>, Message>;

// ============================================================================
// Dialing
// ============================================================================

/// Opens a client WebSocket to `uri`.
async fn connect(uri: &str, ws: &WsOptions) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let mut request = uri.into_client_request()?;

    if let Some(origin) = &ws.origin {
        let value = HeaderValue::from_str(origin)
            .map_err(|e| Error::invalid_argument(format!("Invalid origin header: {e}")))?;
        request.headers_mut().insert(ORIGIN, value);
    }

    let (stream, response) = connect_async_with_config(request, ws.to_config(), ws.disable_nagle).await?;
    debug!(uri, status = %response.status(), "WebSocket handshake completed");

    Ok(stream)
}

/// Dials the connection's URI, then runs the event loop.
///
/// A close command (or every handle dropping) during the handshake abandons
/// it and reports [`ABNORMAL_CLOSURE`].
pub(crate) async fn connect_and_run(
    core: Arc<Core>,
    mut command_rx: mpsc::UnboundedReceiver<LoopCommand>,
) {
    let uri = core.uri.clone();
    let ws = core.options.ws.clone();
    let dialing = connect(&uri, &ws);
    tokio::pin!(dialing);

    let mut backlog: Vec<Queued> = Vec::new();

    loop {
        tokio::select! {
            result = &mut dialing => {
                match result {
                    Ok(stream) => {
                        core.mark_open();
                        run(stream, command_rx, core, backlog).await;
                    }
                    Err(e) => {
                        let reason = format!("Failed to open WebSocket({uri}): {e}");
                        warn!(conn = %core.name, error = %e, "Failed to open WebSocket");
                        core.mark_failed(reason);
                        for (_, done) in backlog {
                            let _ = done.send(Err(Error::SocketClosed));
                        }
                        core.flush();
                    }
                }
                return;
            }

            command = command_rx.recv() => {
                match command {
                    Some(LoopCommand::Send { frame, done }) => backlog.push((frame, done)),

                    Some(LoopCommand::Close { .. }) | None => {
                        debug!(conn = %core.name, "Connection attempt abandoned");
                        for (_, done) in backlog {
                            let _ = done.send(Err(Error::SocketClosed));
                        }
                        core.mark_closed(ABNORMAL_CLOSURE);
                        core.flush();
                        return;
                    }
                }
            }
        }
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Multiplexes an open WebSocket until it closes.
pub(crate) async fn run<S>(
    stream: WebSocketStream<S>,
    mut command_rx: mpsc::UnboundedReceiver<LoopCommand>,
    core: Arc<Core>,
    backlog: Vec<Queued>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_write, mut ws_read) = stream.split();
    let mut close_code = None;
    let mut close_sent = false;

    for (frame, done) in backlog {
        write_frame(&mut ws_write, &core, frame, done).await;
    }

    loop {
        tokio::select! {
            // Frames from the conductor
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Binary(data))) => {
                        trace!(conn = %core.name, bytes = data.len(), "Frame received");
                        if let Err(e) = core.handle_frame(&data) {
                            error!(conn = %core.name, error = %e, "Failed to handle inbound message");
                        }
                    }

                    Some(Ok(Message::Text(text))) => {
                        warn!(conn = %core.name, len = text.len(), "Ignoring text frame");
                    }

                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map_or(NO_STATUS_RECEIVED, |f| u16::from(f.code));
                        debug!(conn = %core.name, code, "WebSocket closed by remote");
                        close_code = Some(code);
                        let _ = ws_write.close().await;
                        break;
                    }

                    Some(Err(e)) => {
                        error!(conn = %core.name, error = %e, "WebSocket error");
                        break;
                    }

                    None => {
                        debug!(conn = %core.name, "WebSocket stream ended");
                        break;
                    }

                    // Ping, Pong, raw frames
                    _ => {}
                }
            }

            // Commands from connection handles
            command = command_rx.recv() => {
                match command {
                    Some(LoopCommand::Send { frame, done }) => {
                        write_frame(&mut ws_write, &core, frame, done).await;
                    }

                    Some(LoopCommand::Close { .. }) if close_sent => {
                        trace!(conn = %core.name, "Close frame already sent");
                    }

                    Some(LoopCommand::Close { code, reason }) => {
                        debug!(conn = %core.name, code, "Sending close frame");
                        close_sent = true;
                        core.mark_closing();
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
                            warn!(conn = %core.name, error = %e, "Failed to send close frame");
                            break;
                        }
                    }

                    None => {
                        debug!(conn = %core.name, "All connection handles dropped");
                        core.mark_closing();
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    core.mark_closed(close_code.unwrap_or(ABNORMAL_CLOSURE));
    let flushed = core.flush();

    debug!(conn = %core.name, flushed, "Event loop terminated");
}

/// Writes one binary frame and reports the outcome to the sender.
async fn write_frame<S>(
    ws_write: &mut WsWriter<S>,
    core: &Core,
    frame: Vec<u8>,
    done: oneshot::Sender<Result<()>>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let bytes = frame.len();
    let result = ws_write
        .send(Message::Binary(frame.into()))
        .await
        .map_err(Error::from);

    match &result {
        Ok(()) => trace!(conn = %core.name, bytes, "Frame sent"),
        Err(e) => warn!(conn = %core.name, error = %e, "Failed to write frame"),
    }

    let _ = done.send(result);
}
