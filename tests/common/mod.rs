//! In-process mock conductor for integration tests.
//!
//! Accepts a single WebSocket client on `127.0.0.1:<random>`, forwards every
//! decoded envelope to the test, and writes whatever frames the test scripts.

#![allow(dead_code)]

use std::time::Duration;

use anyhow::{Context, anyhow};
use futures_util::{SinkExt, StreamExt};
use holochain_websocket::RequestId;
use holochain_websocket::protocol::{Envelope, codec};
use rmpv::Value;
use serde_bytes::ByteBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing_subscriber::EnvFilter;

/// How long a test waits for the client to send something.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Tracing
// ============================================================================

/// Routes crate logs to the test output; set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockConductor
// ============================================================================

/// Scripted server action.
enum Action {
    Frame(Vec<u8>),
    Close(u16),
}

/// Single-client WebSocket server speaking the conductor envelope.
pub struct MockConductor {
    port: u16,
    inbound: mpsc::UnboundedReceiver<Envelope>,
    actions: mpsc::UnboundedSender<Action>,
}

impl MockConductor {
    /// Binds a random port and serves the first client that connects.
    pub async fn start() -> anyhow::Result<Self> {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (actions, mut action_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let Ok((tcp, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = accept_async(tcp).await else {
                return;
            };
            let (mut write, mut read) = ws.split();

            loop {
                tokio::select! {
                    message = read.next() => match message {
                        Some(Ok(Message::Binary(data))) => {
                            if let Ok(envelope) = Envelope::decode(&data) {
                                let _ = inbound_tx.send(envelope);
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                            let _ = write.close().await;
                            break;
                        }
                        Some(Ok(_)) => {}
                    },

                    action = action_rx.recv() => match action {
                        Some(Action::Frame(frame)) => {
                            if write.send(Message::Binary(frame.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Action::Close(code)) => {
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: "mock closing".into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(Self {
            port,
            inbound,
            actions,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Waits for the next envelope from the client.
    pub async fn next_message(&mut self) -> anyhow::Result<Envelope> {
        tokio::time::timeout(RECEIVE_TIMEOUT, self.inbound.recv())
            .await
            .context("timed out waiting for a client message")?
            .ok_or_else(|| anyhow!("client disconnected"))
    }

    /// Waits for the next request and returns its id and method.
    pub async fn next_request(&mut self) -> anyhow::Result<(RequestId, String)> {
        let envelope = self.next_message().await?;
        anyhow::ensure!(envelope.kind == "request", "expected request, got {}", envelope.kind);

        let id = envelope.id.context("request without id")?;
        let method = method_of(&envelope).context("request without method")?;
        Ok((id, method))
    }

    /// Writes a raw frame to the client.
    pub fn send_frame(&self, frame: Vec<u8>) {
        let _ = self.actions.send(Action::Frame(frame));
    }

    /// Answers request `id` with `{ type: "ok", data }`.
    pub fn respond_ok(&self, id: RequestId, data: Value) {
        self.send_frame(response_frame(Some(id), Some(&ok_payload(data))));
    }

    /// Answers request `id` with an error record.
    pub fn respond_error(&self, id: RequestId, tag: &str, message: &str) {
        self.send_frame(response_frame(
            Some(id),
            Some(&error_payload(tag, Value::from(message))),
        ));
    }

    /// Answers request `id` with the cancellation sentinel.
    pub fn cancel(&self, id: RequestId) {
        self.send_frame(response_frame(Some(id), None));
    }

    /// Starts a server-side close handshake.
    pub fn close(&self, code: u16) {
        let _ = self.actions.send(Action::Close(code));
    }
}

// ============================================================================
// Frame Builders
// ============================================================================

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect(),
    )
}

/// Outer `response` envelope; `None` payload omits `data`.
pub fn response_frame(id: Option<RequestId>, payload: Option<&Value>) -> Vec<u8> {
    Envelope {
        id,
        kind: "response".into(),
        data: payload.map(|p| ByteBuf::from(codec::encode_value(p).expect("encode payload"))),
    }
    .encode()
    .expect("encode envelope")
}

pub fn ok_payload(data: Value) -> Value {
    map(vec![("type", Value::from("ok")), ("data", data)])
}

pub fn error_payload(tag: &str, message: Value) -> Value {
    map(vec![
        ("type", Value::from("error")),
        ("data", map(vec![("type", Value::from(tag)), ("data", message)])),
    ])
}

/// Outer `signal` envelope carrying an app signal from `zome`.
pub fn app_signal_frame(zome: &str, body: &Value) -> Vec<u8> {
    let signal = codec::encode_value(body).expect("encode body");
    let payload = map(vec![(
        "App",
        map(vec![
            (
                "cell_id",
                Value::Array(vec![Value::Binary(vec![0xaa; 39]), Value::Binary(vec![0xbb; 39])]),
            ),
            ("zome_name", Value::from(zome)),
            ("signal", Value::Binary(signal)),
        ]),
    )]);

    Envelope {
        id: None,
        kind: "signal".into(),
        data: Some(ByteBuf::from(codec::encode_value(&payload).expect("encode signal"))),
    }
    .encode()
    .expect("encode envelope")
}

/// Outer `signal` envelope carrying a system signal.
pub fn system_signal_frame() -> Vec<u8> {
    let payload = map(vec![("System", Value::from("SuccessfulOs"))]);
    Envelope {
        id: None,
        kind: "signal".into(),
        data: Some(ByteBuf::from(codec::encode_value(&payload).expect("encode signal"))),
    }
    .encode()
    .expect("encode envelope")
}

// ============================================================================
// Envelope Inspection
// ============================================================================

/// Decodes the inner document of an envelope.
pub fn inner_of(envelope: &Envelope) -> Option<Value> {
    codec::decode_value(envelope.data()?).ok()
}

/// Extracts the method of a request envelope.
pub fn method_of(envelope: &Envelope) -> Option<String> {
    let inner = inner_of(envelope)?;
    codec::map_get(&inner, "type")
        .and_then(codec::tag_of)
        .map(str::to_string)
}
