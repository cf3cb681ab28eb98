//! The event emitter.
//!
//! Listeners are kept per event name in registration order. `emit` calls them
//! synchronously on the caller's thread, over a snapshot taken before the
//! first callback runs:
//!   - a listener removed during emission is still called in that round;
//!   - a listener added during emission is not called until the next emit.
//!
//! One-shot wrappers are the exception to the first rule: once removed, or
//! once fired by a nested emit, they skip any remaining stale snapshot.
//!
//! The first listener error aborts the round and is returned from `emit`.
//! Panics unwind through `emit` untouched.
//!
//! All methods take `&self`. The registry sits behind a `parking_lot::Mutex`
//! that is never held while a listener runs, so listeners may register,
//! remove or emit on the same emitter.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::arg::Arg;
use crate::config::EmitterConfig;
use crate::error::{EmitterError, Result};
use crate::listener::{Listener, ListenerFn, ListenerId, ListenerResult};

/// Default leak-warning threshold per event.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Emitted before a listener is stored, with `(event_name, listener)`.
pub const NEW_LISTENER: &str = "new_listener";

/// Emitted after a single listener is removed, with `(event_name, listener)`.
pub const REMOVE_LISTENER: &str = "remove_listener";

/// Callback receiving leak warnings.
pub type WarningHandler = dyn Fn(&LeakWarning) + Send + Sync;

/// Advisory signal that an event has reached its listener threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakWarning {
    pub event: String,
    pub count: usize,
    pub max_listeners: usize,
}

impl fmt::Display for LeakWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Possible listener leak detected: {} '{}' listeners added (max_listeners = {}). \
             Use set_max_listeners() to increase the limit",
            self.count, self.event, self.max_listeners
        )
    }
}

/// Registry state. Only ever touched under the emitter's lock.
#[derive(Debug)]
struct EmitterState {
    /// Listeners indexed by event name, in first-registration order.
    listeners: IndexMap<String, Vec<Listener>>,

    /// Leak-warning threshold per event (0 = unlimited).
    max_listeners: usize,
}

impl EmitterState {
    fn new() -> Self {
        Self {
            listeners: IndexMap::new(),
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }

    /// Read path: a missing event is an empty slice, nothing is inserted.
    fn get_listeners(&self, event: &str) -> &[Listener] {
        self.listeners.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Write path: creates the event entry if needed. Returns a warning when
    /// the new count meets the threshold.
    fn add_listener(
        &mut self,
        event: &str,
        listener: Listener,
        prepend: bool,
    ) -> Option<LeakWarning> {
        let listeners = self.listeners.entry(event.to_string()).or_default();

        if prepend {
            listeners.insert(0, listener);
        } else {
            listeners.push(listener);
        }

        let count = listeners.len();
        (self.max_listeners > 0 && count >= self.max_listeners).then(|| LeakWarning {
            event: event.to_string(),
            count,
            max_listeners: self.max_listeners,
        })
    }

    /// Remove the first listener with `id`. The event entry stays even if it
    /// becomes empty.
    fn remove_listener(&mut self, event: &str, id: ListenerId) -> Option<Listener> {
        let listeners = self.listeners.get_mut(event)?;
        let pos = listeners.iter().position(|l| l.id() == id)?;
        Some(listeners.remove(pos))
    }

    /// Drop one event entry, or all of them. Returns the number of listeners dropped.
    fn remove_all_listeners(&mut self, event: Option<&str>) -> usize {
        match event {
            Some(event_name) => self
                .listeners
                .shift_remove(event_name)
                .map(|l| l.len())
                .unwrap_or(0),
            None => {
                let removed = self.listeners.values().map(Vec::len).sum();
                self.listeners.clear();
                removed
            }
        }
    }

    fn event_names(&self) -> Vec<String> {
        self.listeners
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

struct Shared {
    state: Mutex<EmitterState>,
    warning_handler: Mutex<Option<Arc<WarningHandler>>>,
}

/// Synchronous event emitter.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct Emitter {
    shared: Arc<Shared>,
}

impl Emitter {
    /// Create an emitter with the default threshold of 10.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EmitterState::new()),
                warning_handler: Mutex::new(None),
            }),
        }
    }

    /// Create an emitter with a custom threshold.
    pub fn with_max_listeners(value: i64) -> Result<Self> {
        let emitter = Self::new();
        emitter.set_max_listeners(value)?;
        Ok(emitter)
    }

    /// Create an emitter from configuration. A wrongly-typed or negative
    /// `max_listeners` is rejected.
    pub fn from_config(config: &EmitterConfig) -> Result<Self> {
        let emitter = Self::new();
        if let Some(value) = &config.max_listeners {
            emitter.set_max_listeners_value(value)?;
        }
        Ok(emitter)
    }

    /// Set the leak-warning threshold. `0` disables the warning.
    ///
    /// Does not warn retroactively for events already over the new limit.
    pub fn set_max_listeners(&self, value: i64) -> Result<()> {
        let n = usize::try_from(value)
            .map_err(|_| EmitterError::InvalidArgumentValue(value.to_string()))?;
        self.shared.state.lock().max_listeners = n;
        Ok(())
    }

    /// Set the threshold from a dynamically typed value. Anything other than
    /// an integer fails with [`EmitterError::InvalidArgumentType`].
    pub fn set_max_listeners_value(&self, value: &serde_json::Value) -> Result<()> {
        let serde_json::Value::Number(number) = value else {
            return Err(EmitterError::invalid_type(value));
        };

        if let Some(i) = number.as_i64() {
            return self.set_max_listeners(i);
        }

        match number.as_u64() {
            Some(u) => {
                let n = usize::try_from(u)
                    .map_err(|_| EmitterError::InvalidArgumentValue(u.to_string()))?;
                self.shared.state.lock().max_listeners = n;
                Ok(())
            }
            None => Err(EmitterError::invalid_type(value)),
        }
    }

    /// Get the leak-warning threshold.
    pub fn max_listeners(&self) -> usize {
        self.shared.state.lock().max_listeners
    }

    /// Install a handler that receives every leak warning in addition to the log.
    pub fn set_warning_handler(&self, handler: impl Fn(&LeakWarning) + Send + Sync + 'static) {
        *self.shared.warning_handler.lock() = Some(Arc::new(handler));
    }

    /// Event names with at least one listener, in first-registration order.
    pub fn event_names(&self) -> Vec<String> {
        self.shared.state.lock().event_names()
    }

    /// Snapshot of the listeners for `event`.
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.shared.state.lock().get_listeners(event).to_vec()
    }

    /// Number of listeners for `event`.
    pub fn count(&self, event: &str) -> usize {
        self.shared.state.lock().get_listeners(event).len()
    }

    /// Whether `event` has a registry entry, even an empty one.
    pub fn contains(&self, event: &str) -> bool {
        self.shared.state.lock().listeners.contains_key(event)
    }

    /// Number of registry entries, including empty ones.
    pub fn len(&self) -> usize {
        self.shared.state.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keyed access to the listeners of `event`.
    pub fn get(&self, event: &str) -> Result<Vec<Listener>> {
        self.shared
            .state
            .lock()
            .listeners
            .get(event)
            .cloned()
            .ok_or_else(|| EmitterError::NotFound(event.to_string()))
    }

    /// Erase the entry for `event` without firing `remove_listener`.
    pub fn delete(&self, event: &str) -> Result<()> {
        let removed = self.shared.state.lock().listeners.shift_remove(event);
        match removed {
            Some(listeners) => {
                tracing::debug!(
                    event_name = event,
                    removed = listeners.len(),
                    "event entry deleted"
                );
                Ok(())
            }
            None => Err(EmitterError::NotFound(event.to_string())),
        }
    }

    /// Append `listener` to `event`. Returns the listener unchanged.
    pub fn add_listener(&self, event: &str, listener: Listener) -> Result<Listener> {
        self.register(event, listener, false)
    }

    /// Alias for [`add_listener`](Self::add_listener).
    pub fn on(&self, event: &str, listener: Listener) -> Result<Listener> {
        self.add_listener(event, listener)
    }

    /// Insert `listener` before every listener already registered for `event`.
    pub fn prepend_listener(&self, event: &str, listener: Listener) -> Result<Listener> {
        self.register(event, listener, true)
    }

    /// Register a one-shot listener. Returns the wrapper that is actually
    /// stored; only the wrapper can be used to remove it early.
    pub fn once(&self, event: &str, listener: Listener) -> Result<Listener> {
        let wrapper = self.once_wrapper(event, listener);
        self.register(event, wrapper, false)
    }

    /// Like [`once`](Self::once), but inserted first.
    pub fn prepend_once_listener(&self, event: &str, listener: Listener) -> Result<Listener> {
        let wrapper = self.once_wrapper(event, listener);
        self.register(event, wrapper, true)
    }

    /// Registration function for `event`, equivalent to calling `on` later.
    pub fn on_registrar(&self, event: &str) -> Registrar {
        Registrar {
            emitter: self.clone(),
            event: event.to_string(),
            once: false,
        }
    }

    /// Registration function for `event`, equivalent to calling `once` later.
    pub fn once_registrar(&self, event: &str) -> Registrar {
        Registrar {
            emitter: self.clone(),
            event: event.to_string(),
            once: true,
        }
    }

    /// Remove the first occurrence of `listener` from `event`.
    ///
    /// Fires `remove_listener` and returns `true` if something was removed.
    /// An unknown listener is not an error.
    pub fn remove_listener(&self, event: &str, listener: &Listener) -> Result<bool> {
        self.remove_by_id(event, listener.id())
    }

    /// Alias for [`remove_listener`](Self::remove_listener).
    pub fn off(&self, event: &str, listener: &Listener) -> Result<bool> {
        self.remove_listener(event, listener)
    }

    /// Drop all listeners of `event`, or of every event when `None`.
    /// Does not fire `remove_listener`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        let removed = self.shared.state.lock().remove_all_listeners(event);
        tracing::debug!(event_name = ?event, removed, "listeners cleared");
    }

    /// Call every listener of `event` with `args`, in order.
    ///
    /// Returns whether any listener was registered when the call started.
    pub fn emit(&self, event: &str, args: &[Arg]) -> Result<bool> {
        // Lock is released before any callback runs.
        let snapshot = self.listeners(event);
        tracing::trace!(event_name = event, listeners = snapshot.len(), "emit");

        for listener in &snapshot {
            listener
                .call(args)
                .map_err(|source| EmitterError::listener(event, source))?;
        }

        Ok(!snapshot.is_empty())
    }

    fn register(&self, event: &str, listener: Listener, prepend: bool) -> Result<Listener> {
        self.emit(NEW_LISTENER, &[Arg::from(event), Arg::from(&listener)])?;

        let warning = self
            .shared
            .state
            .lock()
            .add_listener(event, listener.clone(), prepend);
        tracing::debug!(
            event_name = event,
            listener = listener.id(),
            once = listener.is_once(),
            prepend,
            "listener registered"
        );

        if let Some(warning) = warning {
            self.report_leak(&warning);
        }

        Ok(listener)
    }

    fn remove_by_id(&self, event: &str, id: ListenerId) -> Result<bool> {
        let removed = self.shared.state.lock().remove_listener(event, id);
        let Some(listener) = removed else {
            return Ok(false);
        };

        tracing::debug!(event_name = event, listener = id, "listener removed");
        self.emit(REMOVE_LISTENER, &[Arg::from(event), Arg::from(listener)])?;
        Ok(true)
    }

    fn once_wrapper(&self, event: &str, listener: Listener) -> Listener {
        let shared = Arc::downgrade(&self.shared);
        let event = event.to_string();

        let fired = AtomicBool::new(false);

        Listener::once_with(move |id| {
            let callback: Box<ListenerFn> = Box::new(move |args: &[Arg]| -> ListenerResult {
                // A stale snapshot may still hold the wrapper after a nested emit ran it.
                if fired.swap(true, Ordering::SeqCst) {
                    return Ok(());
                }
                if let Some(shared) = shared.upgrade() {
                    if !(Emitter { shared }).remove_by_id(&event, id)? {
                        // Removed earlier in this round; a one-shot never runs unregistered.
                        return Ok(());
                    }
                }
                listener.call(args)
            });
            callback
        })
    }

    fn report_leak(&self, warning: &LeakWarning) {
        tracing::warn!(
            target: "tidings::leak",
            event_name = %warning.event,
            count = warning.count,
            max_listeners = warning.max_listeners,
            "{}",
            warning
        );

        let handler = self.shared.warning_handler.lock().clone();
        if let Some(handler) = handler {
            handler(warning);
        }
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Emitter")
            .field("max_listeners", &state.max_listeners)
            .field("events", &state.event_names())
            .finish()
    }
}

/// Deferred registration for a single event, returned by
/// [`Emitter::on_registrar`] and [`Emitter::once_registrar`].
#[derive(Debug, Clone)]
pub struct Registrar {
    emitter: Emitter,
    event: String,
    once: bool,
}

impl Registrar {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Register `listener`. Returns the listener, or the one-shot wrapper.
    pub fn register(&self, listener: Listener) -> Result<Listener> {
        if self.once {
            self.emitter.once(&self.event, listener)
        } else {
            self.emitter.on(&self.event, listener)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Listener {
        Listener::new(|_| Ok(()))
    }

    #[test]
    fn test_add_and_remove_listeners() {
        let emitter = Emitter::new();

        let l1 = emitter.on("test", noop()).unwrap();
        let l2 = emitter.on("test", noop()).unwrap();

        assert_eq!(emitter.count("test"), 2);
        assert_eq!(emitter.listeners("test"), vec![l1.clone(), l2.clone()]);

        assert!(emitter.remove_listener("test", &l1).unwrap());
        assert_eq!(emitter.count("test"), 1);
        assert_eq!(emitter.listeners("test"), vec![l2]);
    }

    #[test]
    fn test_prepend_listener() {
        let emitter = Emitter::new();

        let l1 = emitter.on("test", noop()).unwrap();
        let l2 = emitter.prepend_listener("test", noop()).unwrap();

        assert_eq!(emitter.listeners("test"), vec![l2, l1]);
    }

    #[test]
    fn test_state_leak_threshold() {
        let mut state = EmitterState::new();
        state.max_listeners = 2;

        assert!(state.add_listener("test", noop(), false).is_none());
        let warn2 = state.add_listener("test", noop(), false);
        let warn3 = state.add_listener("test", noop(), false);

        assert_eq!(
            warn2,
            Some(LeakWarning {
                event: "test".to_string(),
                count: 2,
                max_listeners: 2
            })
        );
        assert_eq!(warn3.map(|w| w.count), Some(3));
    }

    #[test]
    fn test_state_zero_threshold_never_warns() {
        let mut state = EmitterState::new();
        state.max_listeners = 0;

        for _ in 0..20 {
            assert!(state.add_listener("test", noop(), false).is_none());
        }
    }

    #[test]
    fn test_state_read_does_not_insert() {
        let state = EmitterState::new();
        assert!(state.get_listeners("missing").is_empty());
        assert!(!state.listeners.contains_key("missing"));
    }

    #[test]
    fn test_remove_all_listeners() {
        let emitter = Emitter::new();

        emitter.on("event1", noop()).unwrap();
        emitter.on("event1", noop()).unwrap();
        emitter.on("event2", noop()).unwrap();

        emitter.remove_all_listeners(Some("event1"));
        assert_eq!(emitter.count("event1"), 0);
        assert!(!emitter.contains("event1"));
        assert_eq!(emitter.count("event2"), 1);

        emitter.remove_all_listeners(None);
        assert!(emitter.event_names().is_empty());
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_event_names_keep_registration_order() {
        let emitter = Emitter::new();

        emitter.on("data", noop()).unwrap();
        emitter.on("error", noop()).unwrap();
        emitter.on("end", noop()).unwrap();
        emitter.on("data", noop()).unwrap();

        assert_eq!(emitter.event_names(), vec!["data", "error", "end"]);
    }

    #[test]
    fn test_single_removal_keeps_empty_entry() {
        let emitter = Emitter::new();
        let l = emitter.on("data", noop()).unwrap();

        emitter.off("data", &l).unwrap();

        assert!(emitter.contains("data"));
        assert_eq!(emitter.count("data"), 0);
        assert!(emitter.event_names().is_empty());
        assert_eq!(emitter.get("data").unwrap(), Vec::<Listener>::new());
        assert_eq!(emitter.len(), 1);
    }

    #[test]
    fn test_get_and_delete_missing_event() {
        let emitter = Emitter::new();

        assert!(matches!(emitter.get("nope"), Err(EmitterError::NotFound(ref e)) if e == "nope"));
        assert!(matches!(emitter.delete("nope"), Err(EmitterError::NotFound(_))));
    }

    #[test]
    fn test_once_wrapper_is_stored() {
        let emitter = Emitter::new();
        let original = noop();

        let wrapper = emitter.once("test", original.clone()).unwrap();

        assert!(wrapper.is_once());
        assert_ne!(wrapper, original);
        assert_eq!(emitter.listeners("test"), vec![wrapper]);
    }

    #[test]
    fn test_max_listeners_validation() {
        let emitter = Emitter::new();
        assert_eq!(emitter.max_listeners(), DEFAULT_MAX_LISTENERS);

        emitter.set_max_listeners(3).unwrap();
        assert_eq!(emitter.max_listeners(), 3);

        assert!(matches!(
            emitter.set_max_listeners(-1),
            Err(EmitterError::InvalidArgumentValue(_))
        ));
        assert!(matches!(
            emitter.set_max_listeners_value(&serde_json::json!("5")),
            Err(EmitterError::InvalidArgumentType { .. })
        ));
        assert!(matches!(
            emitter.set_max_listeners_value(&serde_json::json!(2.5)),
            Err(EmitterError::InvalidArgumentType { .. })
        ));
        assert_eq!(emitter.max_listeners(), 3);

        emitter.set_max_listeners_value(&serde_json::json!(7)).unwrap();
        assert_eq!(emitter.max_listeners(), 7);
    }

    #[test]
    fn test_from_config() {
        let emitter = Emitter::from_config(&EmitterConfig::default()).unwrap();
        assert_eq!(emitter.max_listeners(), DEFAULT_MAX_LISTENERS);

        let emitter = Emitter::from_config(&EmitterConfig::with_max_listeners(4)).unwrap();
        assert_eq!(emitter.max_listeners(), 4);

        let err = Emitter::from_config(&EmitterConfig::with_max_listeners("4")).unwrap_err();
        assert!(matches!(err, EmitterError::InvalidArgumentType { .. }));

        let err = Emitter::with_max_listeners(-3).unwrap_err();
        assert!(matches!(err, EmitterError::InvalidArgumentValue(ref v) if v == "-3"));
    }

    #[test]
    fn test_leak_warning_message() {
        let warning = LeakWarning {
            event: "click".to_string(),
            count: 10,
            max_listeners: 10,
        };
        assert_eq!(
            warning.to_string(),
            "Possible listener leak detected: 10 'click' listeners added (max_listeners = 10). \
             Use set_max_listeners() to increase the limit"
        );
    }
}
