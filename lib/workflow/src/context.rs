//! The shared execution context.
//!
//! A string-keyed JSON map seeded from the trigger event and grown by each
//! node's output. Keys are whatever variable names the nodes declare; a
//! later node writing an existing key overwrites it, which is how runs
//! re-use a variable name on purpose.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The accumulated state of a workflow run.
///
/// Serializes as a plain JSON object so it can cross the step boundary
/// and land in storage unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext(Map<String, Value>);

impl ExecutionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Seeds a context from a JSON value. Non-object values (including
    /// null) produce an empty context.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }

    /// Returns the value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Stores `value` under `key`, replacing any existing value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Merges every entry of `other` into this context. Colliding keys
    /// take the incoming value.
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (key, value) in other {
            self.0.insert(key, value);
        }
    }

    /// Returns true if the context holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the context as a JSON value.
    #[must_use]
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Consumes the context, returning the underlying map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ExecutionContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
