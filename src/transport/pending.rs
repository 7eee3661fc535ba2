//! Pending-request table.
//!
//! Maps correlation ids to the waiting caller. An entry is created before the
//! request frame is written and removed exactly once: by its response, by a
//! failed send, or by a flush. Settling consumes the entry's sender, so a
//! second settlement cannot happen; settling after the caller gave up (timeout)
//! is a silent no-op.

// ============================================================================
// Imports
// ============================================================================

use rmpv::Value;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{CallSite, ConductorError, Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Types
// ============================================================================

/// Sender half of a caller's deferred result.
pub(crate) type Responder = oneshot::Sender<Result<Value>>;

// ============================================================================
// PendingRequest
// ============================================================================

/// An in-flight request awaiting its response.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    /// Called method.
    method: String,
    /// Call arguments, kept to interpret failures.
    args: Value,
    /// Where the request was issued.
    call_site: CallSite,
    /// Caller's deferred.
    responder: Responder,
}

impl PendingRequest {
    pub(crate) fn new(method: String, args: Value, call_site: CallSite, responder: Responder) -> Self {
        Self {
            method,
            args,
            call_site,
            responder,
        }
    }

    #[inline]
    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    /// Resolves the caller with the response data.
    pub(crate) fn resolve(self, value: Value) {
        self.settle(Ok(value));
    }

    /// Rejects the caller with a classified conductor failure.
    pub(crate) fn reject_remote(self, tag: &str, message: String) {
        let kind = ConductorError::classify(tag, message, &self.args);
        let err = Error::Conductor {
            kind,
            method: self.method.clone(),
            call_site: self.call_site,
        };
        self.settle(Err(err));
    }

    /// Rejects the caller because the conductor cancelled the response.
    pub(crate) fn cancel(self, id: RequestId) {
        let err = Error::ResponseCancelled {
            id,
            method: self.method.clone(),
            call_site: self.call_site,
        };
        self.settle(Err(err));
    }

    /// Rejects the caller because the table was flushed.
    pub(crate) fn flush(self) {
        let err = Error::ConnectionFlushed {
            method: self.method.clone(),
            call_site: self.call_site,
        };
        self.settle(Err(err));
    }

    /// Rejects the caller with an arbitrary error.
    pub(crate) fn reject(self, err: Error) {
        self.settle(Err(err));
    }

    fn settle(self, result: Result<Value>) {
        if self.responder.send(result).is_err() {
            trace!(method = %self.method, "Caller already gone, settlement dropped");
        }
    }
}

// ============================================================================
// PendingRequests
// ============================================================================

/// Correlation table of one connection.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    entries: FxHashMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    /// Registers a request.
    ///
    /// Ids come from a monotonic counter, so a live entry is never replaced.
    pub(crate) fn insert(&mut self, id: RequestId, request: PendingRequest) {
        let previous = self.entries.insert(id, request);
        debug_assert!(previous.is_none(), "correlation id {id} reused");
    }

    /// Removes and returns the entry for `id`.
    pub(crate) fn take(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    /// Removes all entries.
    pub(crate) fn drain(&mut self) -> Vec<(RequestId, PendingRequest)> {
        self.entries.drain().collect()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
