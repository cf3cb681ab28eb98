//! Error types for tidings

use thiserror::Error;

/// Error returned by a listener callback.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during emitter operations
#[derive(Error, Debug)]
pub enum EmitterError {
    /// Configuration value has the wrong type (e.g. a string where an integer is expected)
    #[error("max_listeners must be a non-negative integer, not {actual}")]
    InvalidArgumentType {
        /// Type name of the rejected value
        actual: String,
    },

    /// Configuration value has the right type but is out of range
    #[error("max_listeners must be a non-negative integer, got {0}")]
    InvalidArgumentValue(String),

    /// Keyed access to an event name that has no registry entry
    #[error("Event not found: {0}")]
    NotFound(String),

    /// A listener failed during dispatch; remaining listeners were skipped
    #[error("Listener for '{event}' failed")]
    Listener {
        event: String,
        #[source]
        source: ListenerError,
    },
}

impl EmitterError {
    /// Create an invalid argument type error from a JSON value
    pub fn invalid_type(value: &serde_json::Value) -> Self {
        let actual = match value {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "bool",
            serde_json::Value::Number(_) => "float",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Self::InvalidArgumentType {
            actual: actual.to_string(),
        }
    }

    /// Wrap a listener failure for `event`
    pub fn listener(event: impl Into<String>, source: ListenerError) -> Self {
        Self::Listener {
            event: event.into(),
            source,
        }
    }
}

/// Result type alias for emitter operations
pub type Result<T> = std::result::Result<T, EmitterError>;
