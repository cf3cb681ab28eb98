//! Emitter configuration.

use serde::Deserialize;

/// Settings used by [`Emitter::from_config`](crate::Emitter::from_config).
///
/// `max_listeners` is kept as a raw value so that a wrongly-typed entry in a
/// config file (`max_listeners = "5"`) is reported as an invalid argument
/// type by the emitter rather than as a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EmitterConfig {
    /// Leak-warning threshold; absent means the default of 10.
    #[serde(default)]
    pub max_listeners: Option<serde_json::Value>,
}

impl EmitterConfig {
    pub fn with_max_listeners(value: impl Into<serde_json::Value>) -> Self {
        Self {
            max_listeners: Some(value.into()),
        }
    }
}
