//! Scenario files and the runner that replays them.
//!
//! A scenario is a list of `[[step]]` tables:
//!
//! ```toml
//! [[step]]
//! action = "on"
//! event = "x"
//! listener = "A"
//!
//! [[step]]
//! action = "emit"
//! event = "x"
//! args = [42]
//! ```
//!
//! Every registration of a name wraps the same underlying callback. For `off`,
//! a name refers to the handle returned by its most recent registration, so
//! `off` after `once` removes the one-shot wrapper.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use tidings::{Arg, Emitter, Listener};

#[derive(Debug, Default, Deserialize)]
pub struct Scenario {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).context("Failed to parse scenario")
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    On {
        event: String,
        listener: String,
        #[serde(default)]
        fail: bool,
    },
    Prepend {
        event: String,
        listener: String,
        #[serde(default)]
        fail: bool,
    },
    Once {
        event: String,
        listener: String,
        #[serde(default)]
        fail: bool,
    },
    PrependOnce {
        event: String,
        listener: String,
        #[serde(default)]
        fail: bool,
    },
    Off {
        event: String,
        listener: String,
    },
    RemoveAll {
        #[serde(default)]
        event: Option<String>,
    },
    Delete {
        event: String,
    },
    Emit {
        event: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
    Names,
    Count {
        event: String,
    },
    MaxListeners {
        value: serde_json::Value,
    },
}

#[derive(Clone, Copy)]
enum Placement {
    Append,
    Prepend,
    Once,
    PrependOnce,
}

/// Replays steps against an emitter and records what happened.
pub struct Runner {
    emitter: Emitter,
    /// Callback per name, with its `fail` flag.
    callbacks: HashMap<String, (Listener, bool)>,
    /// Handle from the latest registration per name.
    named: HashMap<String, Listener>,
    trace: Arc<Mutex<Vec<String>>>,
}

impl Runner {
    pub fn new(emitter: Emitter) -> Self {
        let trace = Arc::new(Mutex::new(Vec::new()));

        let warnings = Arc::clone(&trace);
        emitter.set_warning_handler(move |w| warnings.lock().push(format!("warning: {w}")));

        Self {
            emitter,
            callbacks: HashMap::new(),
            named: HashMap::new(),
            trace,
        }
    }

    /// Run every step. A failing step is recorded and the run continues.
    pub fn run(&mut self, scenario: &Scenario) -> Vec<String> {
        for step in &scenario.steps {
            if let Err(e) = self.step(step) {
                tracing::debug!("step {:?} failed: {:#}", step, e);
                self.record(format!("error: {e:#}"));
            }
        }
        self.trace.lock().clone()
    }

    fn step(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::On {
                event,
                listener,
                fail,
            } => self.register(event, listener, *fail, Placement::Append),
            Step::Prepend {
                event,
                listener,
                fail,
            } => self.register(event, listener, *fail, Placement::Prepend),
            Step::Once {
                event,
                listener,
                fail,
            } => self.register(event, listener, *fail, Placement::Once),
            Step::PrependOnce {
                event,
                listener,
                fail,
            } => self.register(event, listener, *fail, Placement::PrependOnce),
            Step::Off { event, listener } => {
                let handle = self
                    .named
                    .get(listener)
                    .with_context(|| format!("unknown listener '{listener}'"))?;
                let removed = self.emitter.off(event, handle)?;
                self.record(format!("off {event} {listener} -> {removed}"));
                Ok(())
            }
            Step::RemoveAll { event } => {
                self.emitter.remove_all_listeners(event.as_deref());
                Ok(())
            }
            Step::Delete { event } => {
                self.emitter.delete(event)?;
                Ok(())
            }
            Step::Emit { event, args } => {
                let args: Vec<Arg> = args.iter().cloned().map(Arg::from).collect();
                let had_listeners = self
                    .emitter
                    .emit(event, &args)
                    .with_context(|| format!("emit {event}"))?;
                self.record(format!("emit {event} -> {had_listeners}"));
                Ok(())
            }
            Step::Names => {
                let names = self.emitter.event_names();
                self.record(format!("names -> {}", serde_json::to_string(&names)?));
                Ok(())
            }
            Step::Count { event } => {
                let count = self.emitter.count(event);
                self.record(format!("count {event} -> {count}"));
                Ok(())
            }
            Step::MaxListeners { value } => {
                self.emitter.set_max_listeners_value(value)?;
                Ok(())
            }
        }
    }

    fn register(
        &mut self,
        event: &str,
        name: &str,
        fail: bool,
        placement: Placement,
    ) -> Result<()> {
        let listener = match self.callbacks.get(name) {
            Some((_, existing_fail)) if *existing_fail != fail => {
                anyhow::bail!("listener '{name}' already registered with fail = {existing_fail}")
            }
            Some((existing, _)) => existing.clone(),
            None => {
                let listener = self.make_listener(name, fail);
                self.callbacks
                    .insert(name.to_string(), (listener.clone(), fail));
                listener
            }
        };

        let handle = match placement {
            Placement::Append => self.emitter.on(event, listener)?,
            Placement::Prepend => self.emitter.prepend_listener(event, listener)?,
            Placement::Once => self.emitter.once(event, listener)?,
            Placement::PrependOnce => self.emitter.prepend_once_listener(event, listener)?,
        };
        self.named.insert(name.to_string(), handle);
        Ok(())
    }

    fn make_listener(&self, name: &str, fail: bool) -> Listener {
        let name = name.to_string();
        let trace = Arc::clone(&self.trace);
        Listener::new(move |args| {
            let rendered = serde_json::Value::Array(args.iter().map(Arg::to_json).collect());
            trace.lock().push(format!("{name} <- {rendered}"));
            if fail {
                return Err(format!("{name} failed").into());
            }
            Ok(())
        })
    }

    fn record(&self, line: String) {
        self.trace.lock().push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Vec<String> {
        let scenario = Scenario::from_toml(source).unwrap();
        Runner::new(Emitter::new()).run(&scenario)
    }

    #[test]
    fn test_emit_in_order_then_clear() {
        let trace = run(r#"
[[step]]
action = "on"
event = "x"
listener = "A"

[[step]]
action = "on"
event = "x"
listener = "B"

[[step]]
action = "emit"
event = "x"
args = [42]

[[step]]
action = "remove_all"
event = "x"

[[step]]
action = "emit"
event = "x"
args = [42]
"#);

        assert_eq!(
            trace,
            vec!["A <- [42]", "B <- [42]", "emit x -> true", "emit x -> false"]
        );
    }

    #[test]
    fn test_once_and_lifecycle_events() {
        let trace = run(r#"
[[step]]
action = "on"
event = "remove_listener"
listener = "R"

[[step]]
action = "once"
event = "x"
listener = "O"

[[step]]
action = "emit"
event = "x"
args = ["first"]

[[step]]
action = "emit"
event = "x"
args = ["second"]

[[step]]
action = "names"
"#);

        assert_eq!(trace.len(), 5);
        assert!(trace[0].starts_with(r#"R <- ["x",{"listener":"#));
        assert_eq!(trace[1], r#"O <- ["first"]"#);
        assert_eq!(trace[2], "emit x -> true");
        assert_eq!(trace[3], "emit x -> false");
        assert_eq!(trace[4], r#"names -> ["remove_listener"]"#);
    }

    #[test]
    fn test_off_removes_named_handle() {
        let trace = run(r#"
[[step]]
action = "once"
event = "x"
listener = "O"

[[step]]
action = "off"
event = "x"
listener = "O"

[[step]]
action = "off"
event = "x"
listener = "O"

[[step]]
action = "off"
event = "x"
listener = "ghost"

[[step]]
action = "count"
event = "x"
"#);

        assert_eq!(
            trace,
            vec![
                "off x O -> true",
                "off x O -> false",
                "error: unknown listener 'ghost'",
                "count x -> 0",
            ]
        );
    }

    #[test]
    fn test_on_after_once_registers_the_plain_callback() {
        let trace = run(r#"
[[step]]
action = "once"
event = "x"
listener = "A"

[[step]]
action = "on"
event = "x"
listener = "A"

[[step]]
action = "emit"
event = "x"
args = [1]

[[step]]
action = "emit"
event = "x"
args = [2]

[[step]]
action = "on"
event = "x"
listener = "A"
fail = true
"#);

        assert_eq!(
            trace,
            vec![
                "A <- [1]",
                "A <- [1]",
                "emit x -> true",
                "A <- [2]",
                "emit x -> true",
                "error: listener 'A' already registered with fail = false",
            ]
        );
    }

    #[test]
    fn test_failing_listener_is_reported() {
        let trace = run(r#"
[[step]]
action = "on"
event = "x"
listener = "F"
fail = true

[[step]]
action = "on"
event = "x"
listener = "B"

[[step]]
action = "emit"
event = "x"
"#);

        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0], "F <- []");
        assert_eq!(trace[1], "error: emit x: Listener for 'x' failed: F failed");
    }

    #[test]
    fn test_threshold_steps() {
        let trace = run(r#"
[[step]]
action = "max_listeners"
value = 2

[[step]]
action = "on"
event = "x"
listener = "A"

[[step]]
action = "on"
event = "x"
listener = "B"

[[step]]
action = "max_listeners"
value = "3"

[[step]]
action = "delete"
event = "missing"
"#);

        assert_eq!(
            trace,
            vec![
                "warning: Possible listener leak detected: 2 'x' listeners added (max_listeners = 2). \
                 Use set_max_listeners() to increase the limit",
                "error: max_listeners must be a non-negative integer, not string",
                "error: Event not found: missing",
            ]
        );
    }
}
