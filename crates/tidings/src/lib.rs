//! Tidings - in-process synchronous event emitter
//!
//! Register listeners under event names and fan out calls to them with
//! `emit`. Supports one-shot listeners, prepending, listener-leak warnings
//! and the `new_listener` / `remove_listener` lifecycle events.
//!
//! # Usage
//!
//! ```
//! use tidings::{Emitter, Listener, args};
//!
//! let emitter = Emitter::new();
//! emitter
//!     .on("data", Listener::new(|args| {
//!         println!("got {:?}", args);
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! assert!(emitter.emit("data", &args!["Hello!"]).unwrap());
//! assert!(!emitter.emit("end", &[]).unwrap());
//! ```

mod arg;
mod config;
mod emitter;
mod error;
mod listener;

pub use arg::Arg;
pub use config::EmitterConfig;
pub use emitter::{
    DEFAULT_MAX_LISTENERS, Emitter, LeakWarning, NEW_LISTENER, REMOVE_LISTENER, Registrar,
    WarningHandler,
};
pub use error::{EmitterError, ListenerError, Result};
pub use listener::{Listener, ListenerFn, ListenerId, ListenerResult};
