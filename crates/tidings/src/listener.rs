//! Listener handles.
//!
//! A [`Listener`] pairs a callback with a process-unique id. Equality is by
//! id, so a clone of a listener is the same listener while two listeners
//! built from identical closures are not.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::arg::Arg;
use crate::error::ListenerError;

/// Unique listener ID for tracking callbacks.
pub type ListenerId = u64;

/// Value returned by a listener callback.
pub type ListenerResult = Result<(), ListenerError>;

/// Closure type for listener callbacks.
pub type ListenerFn = dyn Fn(&[Arg]) -> ListenerResult + Send + Sync;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique listener ID.
fn next_listener_id() -> ListenerId {
    NEXT_LISTENER_ID.fetch_add(1, Ordering::SeqCst)
}

/// A registered (or registrable) event listener.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,

    /// Whether this is a self-removing wrapper created by `once`.
    once: bool,

    callback: Arc<ListenerFn>,
}

impl Listener {
    /// Create a new listener from a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&[Arg]) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            id: next_listener_id(),
            once: false,
            callback: Arc::new(callback),
        }
    }

    /// Build a one-shot wrapper. The closure receives the wrapper's own id so
    /// it can remove itself before running.
    pub(crate) fn once_with<F>(make: F) -> Self
    where
        F: FnOnce(ListenerId) -> Box<ListenerFn>,
    {
        let id = next_listener_id();
        Self {
            id,
            once: true,
            callback: Arc::from(make(id)),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether this listener is a one-shot wrapper.
    pub fn is_once(&self) -> bool {
        self.once
    }

    /// Invoke the callback directly, bypassing any emitter.
    pub fn call(&self, args: &[Arg]) -> ListenerResult {
        (self.callback)(args)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Listener {}

impl std::hash::Hash for Listener {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}
