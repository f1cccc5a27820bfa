//! State schema: declared field kinds and reducers, checked at merge time.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use super::reducer::Reducer;
use super::{PartialState, State};

/// Reserved key holding member failures collected by parallel groups.
pub const ERRORS_KEY: &str = "__errors__";

/// Merge-time type error. Fatal for the run: it means a node broke its reducer contract.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateTypeError {
    #[error("state key `{key}` expects {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: String,
        found: &'static str,
    },

    #[error("unknown state key `{0}`")]
    UnknownKey(String),

    #[error("state must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("state serialization failed: {0}")]
    Serialization(String),
}

/// Declared semantic type of a state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    #[default]
    Any,
    Bool,
    Integer,
    Number,
    String,
    List,
    Map,
}

impl FieldKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Any => true,
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::String => value.is_string(),
            FieldKind::List => value.is_array(),
            FieldKind::Map => value.is_object(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Any => "any",
            FieldKind::Bool => "bool",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::String => "string",
            FieldKind::List => "list",
            FieldKind::Map => "map",
        };
        f.write_str(name)
    }
}

/// One declared field: kind, reducer, nullability and an optional initial value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub reducer: Reducer,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// List field with the default append-bounded reducer.
    pub fn list() -> Self {
        Self::new(FieldKind::List).with_reducer(Reducer::append())
    }

    /// Map field with the deep-merge reducer.
    pub fn map() -> Self {
        Self::new(FieldKind::Map).with_reducer(Reducer::DeepMerge)
    }

    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn check(&self, key: &str, value: &Value) -> Result<(), StateTypeError> {
        if self.kind.accepts(value) || (value.is_null() && self.nullable) {
            return Ok(());
        }
        Err(StateTypeError::TypeMismatch {
            key: key.to_string(),
            expected: self.kind.to_string(),
            found: json_type_name(value),
        })
    }
}

/// What to do with update keys the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeyPolicy {
    /// Merge with `Replace` and no type check.
    #[default]
    Accept,
    /// Drop the key silently.
    Ignore,
    /// Fail the merge with [`StateTypeError::UnknownKey`].
    Reject,
}

/// Field name -> spec, plus the unknown-key policy. Built once per graph.
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    fields: BTreeMap<String, FieldSpec>,
    unknown_keys: UnknownKeyPolicy,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn with_unknown_keys(mut self, policy: UnknownKeyPolicy) -> Self {
        self.unknown_keys = policy;
        self
    }

    pub fn spec(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.get(key)
    }

    pub fn unknown_keys(&self) -> UnknownKeyPolicy {
        self.unknown_keys
    }

    fn resolve(&self, key: &str) -> Result<Option<FieldSpec>, StateTypeError> {
        if let Some(spec) = self.fields.get(key) {
            return Ok(Some(spec.clone()));
        }
        if key == ERRORS_KEY {
            return Ok(Some(FieldSpec::list()));
        }
        match self.unknown_keys {
            UnknownKeyPolicy::Accept => Ok(Some(FieldSpec::default())),
            UnknownKeyPolicy::Ignore => Ok(None),
            UnknownKeyPolicy::Reject => Err(StateTypeError::UnknownKey(key.to_string())),
        }
    }

    /// State seeded with every declared default.
    pub fn initial_state(&self) -> State {
        let mut state = State::new();
        for (name, spec) in &self.fields {
            if let Some(default) = &spec.default {
                state.insert(name.clone(), default.clone());
            }
        }
        state
    }

    /// Checks every key of a full state against its declared kind.
    pub fn validate(&self, state: &State) -> Result<(), StateTypeError> {
        for (key, value) in state.as_map() {
            if let Some(spec) = self.resolve(key)? {
                spec.check(key, value)?;
            }
        }
        Ok(())
    }

    /// Returns `current` with `update` folded in through each key's reducer.
    pub fn merge(&self, current: &State, update: &PartialState) -> Result<State, StateTypeError> {
        let mut next = current.clone();
        self.apply(&mut next, update)?;
        Ok(next)
    }

    /// In-place merge. All keys are reduced and checked before any is written, so a
    /// failed merge leaves `state` unchanged.
    pub fn apply(&self, state: &mut State, update: &PartialState) -> Result<(), StateTypeError> {
        let mut staged = Vec::with_capacity(update.len());
        for (key, value) in update.iter() {
            let Some(spec) = self.resolve(key)? else {
                continue;
            };
            if let Some(reduced) = spec.reducer.reduce(key, state.get(key), value)? {
                spec.check(key, &reduced)?;
                staged.push((key.clone(), reduced));
            }
        }
        for (key, value) in staged {
            match state.get_mut(&key) {
                Some(slot) => *slot = value,
                None => state.insert(key, value),
            }
        }
        Ok(())
    }

    /// Composes two partial updates (applied in order) into one.
    pub fn combine(
        &self,
        first: &PartialState,
        second: &PartialState,
    ) -> Result<PartialState, StateTypeError> {
        let mut out = first.clone();
        for (key, value) in second.iter() {
            let Some(spec) = self.resolve(key)? else {
                continue;
            };
            let combined = match out.get(key) {
                Some(existing) => spec.reducer.combine(key, existing, value)?,
                None => value.clone(),
            };
            out.set(key.clone(), combined);
        }
        Ok(out)
    }

    /// Folds an ordered update log over `base`.
    pub fn fold<'a>(
        &self,
        base: &State,
        updates: impl IntoIterator<Item = &'a PartialState>,
    ) -> Result<State, StateTypeError> {
        let mut state = base.clone();
        for update in updates {
            self.apply(&mut state, update)?;
        }
        Ok(state)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
