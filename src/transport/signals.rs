//! Signal subscribers.
//!
//! App signals are the only event a connection emits, so subscribers are a
//! plain list of callbacks rather than a general event bus.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::identifiers::SubscriptionId;
use crate::protocol::SignalEvent;

// ============================================================================
// Types
// ============================================================================

/// Signal handler callback.
///
/// Runs on the connection's socket task; it should hand work off rather than
/// block.
pub type SignalHandler = Arc<dyn Fn(&SignalEvent) + Send + Sync>;

// ============================================================================
// SignalSubscribers
// ============================================================================

/// Registered signal handlers, in registration order.
#[derive(Default)]
pub(crate) struct SignalSubscribers {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, SignalHandler)>>,
}

impl SignalSubscribers {
    /// Registers a handler.
    pub(crate) fn subscribe(&self, handler: SignalHandler) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, handler));
        id
    }

    /// Removes a handler; returns `false` if it was not registered.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Delivers an event to every handler; returns how many ran.
    ///
    /// Handlers are called outside the lock so they may (un)subscribe.
    pub(crate) fn emit(&self, event: &SignalEvent) -> usize {
        let handlers: Vec<SignalHandler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
