//! Graph state: a schema-checked JSON map plus per-key reducers.
//!
//! Nodes receive a full [`State`] and return a [`PartialState`] holding only the keys
//! they changed. [`StateSchema::merge`] folds a partial update into the running state
//! using each key's [`Reducer`]; it is the only place state is written.

mod reducer;
mod schema;

pub use reducer::{Reducer, DEFAULT_APPEND_CAP};
pub use schema::{FieldKind, FieldSpec, StateSchema, StateTypeError, UnknownKeyPolicy, ERRORS_KEY};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Full graph state flowing between nodes.
///
/// Serializes as a plain JSON object so checkpoints can be inspected by external tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Map<String, Value>);

/// Keys changed by one node (or one parallel group). Same shape as [`State`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialState(Map<String, Value>);

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds state from a JSON value; anything other than an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, StateTypeError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StateTypeError::NotAnObject(schema::json_type_name(&other))),
        }
    }

    /// Builds state from any serializable struct (e.g. a per-workflow state record).
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, StateTypeError> {
        let value = serde_json::to_value(value)
            .map_err(|e| StateTypeError::Serialization(e.to_string()))?;
        Self::from_value(value)
    }

    /// Deserializes the whole state into a typed struct.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, StateTypeError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| StateTypeError::Serialization(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Reads one key as a typed value; `None` when absent or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub(crate) fn insert(&mut self, key: String, value: Value) {
        self.0.insert(key, value);
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }
}

impl PartialState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an update from a JSON object.
    pub fn from_value(value: Value) -> Result<Self, StateTypeError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StateTypeError::NotAnObject(schema::json_type_name(&other))),
        }
    }

    /// Builder-style insert: `PartialState::new().with("counter", 1)`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }
}

impl From<Map<String, Value>> for State {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Map<String, Value>> for PartialState {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<State> for PartialState {
    fn from(state: State) -> Self {
        Self(state.0)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for PartialState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
