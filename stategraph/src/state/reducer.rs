//! Per-key merge rules.

use serde_json::{Map, Value};

use super::schema::{json_type_name, StateTypeError};

/// Cap used by [`Reducer::append`] when no explicit bound is given.
pub const DEFAULT_APPEND_CAP: usize = 100;

/// Merge rule applied when a partial update touches a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reducer {
    /// Update overwrites the current value.
    #[default]
    Replace,
    /// Lists: update items are appended; the oldest items are evicted beyond `max_len`.
    /// A non-list update is appended as a single item.
    AppendBounded { max_len: usize },
    /// Maps: recursively unioned; nested non-map values are overwritten.
    DeepMerge,
    /// Like `Replace`, but a `null` update leaves the field untouched.
    KeepOnNull,
}

impl Reducer {
    /// Append-bounded with [`DEFAULT_APPEND_CAP`].
    pub fn append() -> Self {
        Reducer::AppendBounded {
            max_len: DEFAULT_APPEND_CAP,
        }
    }

    /// Applies `update` to `current`. `Ok(None)` means the key is left untouched.
    pub(crate) fn reduce(
        &self,
        key: &str,
        current: Option<&Value>,
        update: &Value,
    ) -> Result<Option<Value>, StateTypeError> {
        match self {
            Reducer::Replace => Ok(Some(update.clone())),
            Reducer::KeepOnNull => {
                if update.is_null() {
                    Ok(None)
                } else {
                    Ok(Some(update.clone()))
                }
            }
            Reducer::AppendBounded { max_len } => {
                if update.is_null() {
                    return Ok(None);
                }
                let mut items = match current {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => return Err(mismatch(key, "list", other)),
                };
                items.extend(list_items(update));
                Ok(Some(Value::Array(keep_newest(items, *max_len))))
            }
            Reducer::DeepMerge => {
                let update = match update {
                    Value::Null => return Ok(None),
                    Value::Object(map) => map,
                    other => return Err(mismatch(key, "map", other)),
                };
                let mut base = match current {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(map)) => map.clone(),
                    Some(other) => return Err(mismatch(key, "map", other)),
                };
                deep_merge(&mut base, update);
                Ok(Some(Value::Object(base)))
            }
        }
    }

    /// Composes two updates for the same key so that applying the result once equals
    /// applying `first` then `second`.
    pub(crate) fn combine(
        &self,
        key: &str,
        first: &Value,
        second: &Value,
    ) -> Result<Value, StateTypeError> {
        match self {
            Reducer::Replace => Ok(second.clone()),
            Reducer::KeepOnNull => {
                if second.is_null() {
                    Ok(first.clone())
                } else {
                    Ok(second.clone())
                }
            }
            Reducer::AppendBounded { max_len } => {
                if first.is_null() && second.is_null() {
                    return Ok(Value::Null);
                }
                let mut items: Vec<Value> = list_items(first).collect();
                items.extend(list_items(second));
                Ok(Value::Array(keep_newest(items, *max_len)))
            }
            Reducer::DeepMerge => match (first, second) {
                (Value::Null, other) | (other, Value::Null) => match other {
                    Value::Null | Value::Object(_) => Ok(other.clone()),
                    other => Err(mismatch(key, "map", other)),
                },
                (Value::Object(a), Value::Object(b)) => {
                    let mut merged = a.clone();
                    deep_merge(&mut merged, b);
                    Ok(Value::Object(merged))
                }
                (Value::Object(_), other) | (other, _) => Err(mismatch(key, "map", other)),
            },
        }
    }
}

fn mismatch(key: &str, expected: &str, found: &Value) -> StateTypeError {
    StateTypeError::TypeMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        found: json_type_name(found),
    }
}

fn list_items(value: &Value) -> Box<dyn Iterator<Item = Value> + '_> {
    match value {
        Value::Null => Box::new(std::iter::empty()),
        Value::Array(items) => Box::new(items.iter().cloned()),
        other => Box::new(std::iter::once(other.clone())),
    }
}

fn keep_newest(mut items: Vec<Value>, max_len: usize) -> Vec<Value> {
    if items.len() > max_len {
        items.drain(..items.len() - max_len);
    }
    items
}

fn deep_merge(base: &mut Map<String, Value>, update: &Map<String, Value>) {
    for (k, v) in update {
        match (base.get_mut(k), v) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming)
            }
            _ => {
                base.insert(k.clone(), v.clone());
            }
        }
    }
}
