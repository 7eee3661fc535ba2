//! Inbound frame routing.
//!
//! | `type` | Route |
//! |--------|-------|
//! | `response` | Settles the pending request with the same `id` |
//! | `signal` | App signals go to subscribers; system signals are dropped |
//! | anything else | Protocol error, logged by the socket task |
//!
//! A response with no `data` is the conductor's cancellation sentinel.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{Envelope, MessageKind, ResponsePayload, SignalPayload};

use super::connection::Core;

// ============================================================================
// Dispatch
// ============================================================================

impl Core {
    /// Routes one inbound frame.
    ///
    /// Errors are returned for logging only; callers affected by a bad frame
    /// have already been settled.
    pub(crate) fn handle_frame(&self, bytes: &[u8]) -> Result<()> {
        let envelope = Envelope::decode(bytes)?;
        trace!(conn = %self.name, kind = %envelope.kind, id = ?envelope.id, "Message received");

        match envelope.message_kind()? {
            MessageKind::Response => self.handle_response(&envelope),
            MessageKind::Signal => self.handle_signal(&envelope),
            other => Err(Error::protocol(format!(
                "Unexpected '{other}' message from conductor"
            ))),
        }
    }

    fn handle_response(&self, envelope: &Envelope) -> Result<()> {
        let id = envelope
            .id
            .ok_or_else(|| Error::protocol("Response without a correlation id"))?;

        let Some(request) = self.pending.lock().take(id) else {
            return Err(Error::protocol(format!(
                "There is no pending request for response ID: {id}"
            )));
        };

        let Some(data) = envelope.data() else {
            debug!(conn = %self.name, %id, method = request.method(), "Response cancelled by conductor");
            request.cancel(id);
            return Ok(());
        };

        match ResponsePayload::decode(data) {
            Ok(ResponsePayload::Ok(value)) => {
                trace!(conn = %self.name, %id, "Resolving request");
                request.resolve(value);
                Ok(())
            }
            Ok(ResponsePayload::Error(record)) => {
                debug!(conn = %self.name, %id, tag = %record.tag, "Rejecting request");
                request.reject_remote(&record.tag, record.message);
                Ok(())
            }
            Err(e) => {
                let message = format!("Malformed response for request {id}: {e}");
                request.reject(e);
                Err(Error::protocol(message))
            }
        }
    }

    fn handle_signal(&self, envelope: &Envelope) -> Result<()> {
        let data = envelope
            .data()
            .ok_or_else(|| Error::protocol("Signal without a payload"))?;

        match SignalPayload::decode(data)? {
            SignalPayload::System(_) => {
                trace!(conn = %self.name, "Ignoring system signal");
            }
            SignalPayload::App(event) => {
                let delivered = self.subscribers.emit(&event);
                trace!(
                    conn = %self.name,
                    zome = %event.zome,
                    kind = ?event.signal.kind,
                    delivered,
                    "App signal emitted"
                );
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rmpv::Value;
    use serde_bytes::ByteBuf;
    use tokio::sync::oneshot;

    use crate::error::{CallSite, ConductorError};
    use crate::identifiers::RequestId;
    use crate::options::ConnectionOptions;
    use crate::protocol::codec;
    use crate::transport::connection::LinkState;
    use crate::transport::pending::PendingRequest;

    fn core() -> Core {
        Core::new(
            "ws://localhost:1".into(),
            false,
            ConnectionOptions::new().with_name("test"),
            LinkState::Open,
        )
    }

    fn register(core: &Core, id: u64, method: &str) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        core.pending.lock().insert(
            RequestId::new(id),
            PendingRequest::new(method.into(), Value::Nil, CallSite::capture(), tx),
        );
        rx
    }

    fn frame(kind: &str, id: Option<u64>, data: Option<&Value>) -> Vec<u8> {
        Envelope {
            id: id.map(RequestId::new),
            kind: kind.into(),
            data: data.map(|d| ByteBuf::from(codec::encode_value(d).expect("encode"))),
        }
        .encode()
        .expect("encode envelope")
    }

    fn ok_response(data: Value) -> Value {
        Value::Map(vec![
            (Value::from("type"), Value::from("app_info")),
            (Value::from("data"), data),
        ])
    }

    fn error_response(tag: &str, message: &str) -> Value {
        Value::Map(vec![
            (Value::from("type"), Value::from("error")),
            (
                Value::from("data"),
                Value::Map(vec![
                    (Value::from("type"), Value::from(tag)),
                    (Value::from("data"), Value::from(message)),
                ]),
            ),
        ])
    }

    #[tokio::test]
    async fn test_responses_settle_by_id_not_order() {
        let core = core();
        let first = register(&core, 0, "a");
        let second = register(&core, 1, "b");

        core.handle_frame(&frame("response", Some(1), Some(&ok_response(Value::from("B")))))
            .expect("dispatch");
        core.handle_frame(&frame("response", Some(0), Some(&ok_response(Value::from("A")))))
            .expect("dispatch");

        assert_eq!(second.await.expect("settled").expect("ok"), Value::from("B"));
        assert_eq!(first.await.expect("settled").expect("ok"), Value::from("A"));
        assert_eq!(core.pending.lock().len(), 0);
    }

    #[tokio::test]
    async fn test_error_record_is_classified() {
        let core = core();
        let rx = register(&core, 0, "install_app");

        core.handle_frame(&frame(
            "response",
            Some(0),
            Some(&error_response("deserialization", "bad input")),
        ))
        .expect("dispatch");

        let err = rx.await.expect("settled").expect_err("rejected");
        assert!(matches!(
            err.conductor_kind(),
            Some(ConductorError::Deserialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_data_cancels() {
        let core = core();
        let rx = register(&core, 7, "slow");

        core.handle_frame(&frame("response", Some(7), None))
            .expect("dispatch");

        let err = rx.await.expect("settled").expect_err("cancelled");
        assert!(matches!(err, Error::ResponseCancelled { .. }));
    }

    #[tokio::test]
    async fn test_unknown_id_is_protocol_error() {
        let core = core();
        let rx = register(&core, 0, "kept");

        let err = core
            .handle_frame(&frame("response", Some(99), Some(&ok_response(Value::Nil))))
            .expect_err("no entry");
        assert!(err.to_string().contains("99"));

        // Other entries are untouched
        assert_eq!(core.pending.lock().len(), 1);
        drop(rx);
    }

    #[tokio::test]
    async fn test_malformed_payload_rejects_caller() {
        let core = core();
        let rx = register(&core, 0, "broken");

        let result = core.handle_frame(&frame("response", Some(0), Some(&Value::from(5))));
        assert!(matches!(result, Err(Error::Protocol { .. })));

        let err = rx.await.expect("settled").expect_err("rejected");
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_unknown_type_is_protocol_error() {
        let core = core();
        let err = core
            .handle_frame(&frame("gossip", None, None))
            .expect_err("unknown");
        assert!(err.to_string().contains("Unknown message type: gossip"));
    }

    #[test]
    fn test_request_from_conductor_is_rejected() {
        let core = core();
        assert!(matches!(
            core.handle_frame(&frame("request", Some(0), Some(&Value::Nil))),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_app_signal_reaches_subscribers() {
        let core = core();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        core.subscribers.subscribe(Arc::new(move |event| {
            assert_eq!(event.zome, "chat");
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        let body = Value::Map(vec![(Value::from("type"), Value::from("ping"))]);
        let signal = Value::Map(vec![(
            Value::from("App"),
            Value::Map(vec![
                (
                    Value::from("cell_id"),
                    Value::Array(vec![Value::Binary(vec![1; 4]), Value::Binary(vec![2; 4])]),
                ),
                (Value::from("zome_name"), Value::from("chat")),
                (
                    Value::from("signal"),
                    Value::Binary(codec::encode_value(&body).expect("encode")),
                ),
            ]),
        )]);

        core.handle_frame(&frame("signal", None, Some(&signal)))
            .expect("dispatch");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_system_signal_is_dropped() {
        let core = core();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        core.subscribers.subscribe(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        let signal = Value::Map(vec![(Value::from("System"), Value::Nil)]);
        core.handle_frame(&frame("signal", None, Some(&signal)))
            .expect("dispatch");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
