//! Dispatch arguments.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::listener::Listener;

/// A single argument passed through `emit` to every listener.
#[derive(Clone)]
pub enum Arg {
    /// Plain data.
    Value(Value),

    /// A listener handle, as passed to `new_listener` / `remove_listener`.
    Listener(Listener),

    /// Any shared value; compared by pointer identity.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Arg {
    /// Wrap an arbitrary shared value.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Arg::Opaque(Arc::new(value))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_listener(&self) -> Option<&Listener> {
        match self {
            Arg::Listener(l) => Some(l),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Arg::Opaque(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// JSON rendering used by logs and the scenario runner.
    pub fn to_json(&self) -> Value {
        match self {
            Arg::Value(v) => v.clone(),
            Arg::Listener(l) => serde_json::json!({ "listener": l.id() }),
            Arg::Opaque(_) => Value::String("<opaque>".to_string()),
        }
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Arg::Value(a), Arg::Value(b)) => a == b,
            (Arg::Listener(a), Arg::Listener(b)) => a == b,
            (Arg::Opaque(a), Arg::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => write!(f, "{v}"),
            Arg::Listener(l) => fmt::Debug::fmt(l, f),
            Arg::Opaque(_) => f.write_str("<opaque>"),
        }
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

impl From<Listener> for Arg {
    fn from(l: Listener) -> Self {
        Arg::Listener(l)
    }
}

impl From<&Listener> for Arg {
    fn from(l: &Listener) -> Self {
        Arg::Listener(l.clone())
    }
}

macro_rules! impl_from_json {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(v: $ty) -> Self {
                    Arg::Value(Value::from(v))
                }
            }
        )*
    };
}

impl_from_json!(&str, String, bool, i32, i64, u32, u64, usize, f64);

/// Build a `Vec<Arg>` from a list of convertible expressions.
///
/// ```
/// let args = tidings::args!["click", 42, true];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Arg::from($arg)),+]
    };
}
