//! The boundary between the engine and the environment it scripts.
//!
//! The engine never assumes what a target *is*.  Everything it needs from
//! the outside world goes through two traits:
//!
//! - [`HostObject`]: one opaque value (an element, a node list, a window)
//!   with properties, attributes, style and an optional tree position.
//! - [`Host`]: the environment as a whole: the builtin-function resolver,
//!   the global namespace, document queries and log output.
//!
//! [`crate::memory::MemoryHost`] is the in-memory implementation used by
//! the binary and the test suite.

use std::fmt;

use crate::error::HostError;
use crate::script::value::Value;

/// Severity for script-initiated log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// `log_raw`: the arguments as given.
    Raw,
    Info,
    Warn,
    Error,
}

// ── HostObject ────────────────────────────────────────────────────────────────

pub trait HostObject: fmt::Debug {
    /// Constructor-style name used by `is_a` and the `type` prefix.
    fn type_name(&self) -> String;

    /// `Some` for element-like objects.
    fn tag_name(&self) -> Option<String> {
        None
    }

    fn get(&self, _key: &str) -> Value {
        Value::Undefined
    }

    fn set(&self, key: &str, _value: Value) -> Result<(), HostError> {
        Err(HostError::new(format!("Cannot set property '{key}' of {}", self.type_name())))
    }

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Items of a list-like object (node lists); `None` when not iterable.
    fn items(&self) -> Option<Vec<Value>> {
        None
    }

    /// Invoke one of the object's own methods.  `None` when the object has
    /// no method of that name.
    fn call(&self, _method: &str, _args: &[Value]) -> Option<Result<Value, HostError>> {
        None
    }

    fn get_attribute(&self, _name: &str) -> Option<String> {
        None
    }

    fn set_attribute(&self, name: &str, _value: &str) -> Result<(), HostError> {
        Err(HostError::new(format!("Cannot set attribute '{name}' of {}", self.type_name())))
    }

    /// Current value of a style property; empty when unset.
    fn style(&self, _name: &str) -> String {
        String::new()
    }

    fn set_style(&self, name: &str, _value: &str) -> Result<(), HostError> {
        Err(HostError::new(format!("Cannot set style '{name}' of {}", self.type_name())))
    }

    fn inner_html(&self) -> Option<String> {
        None
    }

    fn set_inner_html(&self, _html: &str) -> Result<(), HostError> {
        Err(HostError::new(format!("Cannot insert into {}", self.type_name())))
    }

    /// Tree parent, `Undefined` at the root.
    fn parent(&self) -> Value {
        Value::Undefined
    }

    fn to_text(&self) -> String {
        format!("[object {}]", self.type_name())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

// ── Host ──────────────────────────────────────────────────────────────────────

pub trait Host {
    /// Builtin-function resolver: a callable named `key` that applies to
    /// `target`.  Consulted before the target's own members.
    fn resolve(&self, _key: &str, _target: &Value) -> Option<Value> {
        None
    }

    /// Last-resort global namespace for calls (`window[key]`).
    fn global(&self, _key: &str) -> Option<Value> {
        None
    }

    fn document(&self) -> Value {
        Value::Undefined
    }

    fn window(&self) -> Value {
        Value::Undefined
    }

    /// Element with the given id (without `#`), or `Null`.
    fn find_by_id(&self, _id: &str) -> Value {
        Value::Null
    }

    /// Every match of `selector` under `root`; a nullish root searches the
    /// whole document.
    fn query_all(&self, _root: &Value, selector: &str) -> Result<Value, HostError> {
        Err(HostError::new(format!("No document to query for '{selector}'")))
    }

    /// Nearest ancestor-or-self of `element` matching `selector`, or `Null`.
    fn closest(&self, _element: &Value, _selector: &str) -> Result<Value, HostError> {
        Ok(Value::Null)
    }

    fn create_element(&self, tag: &str) -> Result<Value, HostError> {
        Err(HostError::new(format!("Cannot create <{tag}> without a document")))
    }

    /// `new Name args` for non-element constructors.
    fn construct(&self, name: &str, _args: &[Value]) -> Result<Value, HostError> {
        Err(HostError::new(format!("{name} is not a constructor")))
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Raw | LogLevel::Info => tracing::info!(target: "act::script", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "act::script", "{message}"),
            LogLevel::Error => tracing::error!(target: "act::script", "{message}"),
        }
    }
}

/// A host with no document at all: only the core library is available.
#[derive(Debug, Default)]
pub struct NullHost;

impl Host for NullHost {}
