//! Synchronous publish/subscribe primitive
//!
//! [`EventEmitter`] delivers each published value to every listener that was
//! registered when `publish` was called, in registration order. Delivery works
//! on a snapshot of the listener list, so a handler may subscribe or
//! unsubscribe (on this emitter or any other) without deadlocking; such
//! changes take effect from the next publish.
//!
//! A panicking handler is logged and skipped. The remaining handlers still
//! run and the publisher never sees the panic.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

static NEXT_EMITTER_ID: AtomicU64 = AtomicU64::new(1);

type Handler<T> = dyn Fn(&T) + Send + Sync;
type Filter<T> = dyn Fn(&T) -> bool + Send + Sync;

struct Listener<T> {
    id: u64,
    filter: Option<Box<Filter<T>>>,
    handler: Box<Handler<T>>,
}

struct EmitterState<T> {
    next_id: u64,
    listeners: Vec<Arc<Listener<T>>>,
}

/// Handle returned by [`EventEmitter::subscribe`]; pass it back to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    emitter_id: u64,
    id: u64,
}

/// A cloneable fan-out point for values of type `T`
///
/// Clones share the same listener list.
pub struct EventEmitter<T> {
    id: u64,
    state: Arc<Mutex<EmitterState<T>>>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("id", &self.id)
            .field("listeners", &self.len())
            .finish()
    }
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            id: NEXT_EMITTER_ID.fetch_add(1, Ordering::Relaxed),
            state: Arc::new(Mutex::new(EmitterState {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a handler for every published value
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(None, Box::new(handler))
    }

    /// Register a handler that only sees values accepted by `filter`
    pub fn subscribe_filtered<P, F>(&self, filter: P, handler: F) -> SubscriptionHandle
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(Some(Box::new(filter)), Box::new(handler))
    }

    fn register(&self, filter: Option<Box<Filter<T>>>, handler: Box<Handler<T>>) -> SubscriptionHandle {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push(Arc::new(Listener {
            id,
            filter,
            handler,
        }));
        SubscriptionHandle {
            emitter_id: self.id,
            id,
        }
    }

    /// Remove a listener. Returns false if the handle is unknown to this emitter
    /// or was already removed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        if handle.emitter_id != self.id {
            return false;
        }
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|listener| listener.id != handle.id);
        state.listeners.len() != before
    }

    /// Deliver `value` to the current listeners, returning how many handlers ran
    /// to completion
    pub fn publish(&self, value: &T) -> usize {
        let snapshot: Vec<Arc<Listener<T>>> = self.state.lock().listeners.clone();

        let mut delivered = 0;
        for listener in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let accepted = listener.filter.as_ref().map_or(true, |filter| filter(value));
                if accepted {
                    (listener.handler)(value);
                }
                accepted
            }));

            match outcome {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(payload) => {
                    error!(
                        subscription = listener.id,
                        "Event handler panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        delivered
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
