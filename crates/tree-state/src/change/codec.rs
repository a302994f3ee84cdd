//! JSON codec for state changes.
//!
//! A change in JSON form is a partial state whose mapping nodes may carry a
//! `"_reducerMode"` tag and whose array operations are mappings tagged with
//! `"_arrayOperation"`:
//!
//! ```json
//! {
//!   "settings": {"_reducerMode": "replace", "theme": "dark"},
//!   "todos": {"_arrayOperation": "update", "at": 0, "value": {"done": true}},
//!   "log": {"_arrayOperation": "push", "value": "started"},
//!   "queue": {"_arrayOperation": "pull"}
//! }
//! ```
//!
//! Tags are consumed here and never reach the state tree. Predicate
//! selectors and computed values exist only in the typed API.

use serde_json::{json, Map, Value};
use tree_state_path::ElementSelector;
use tree_state_util::{ObjectMap, StateArray, StateObject, StateValue};

use super::{ArrayOp, ChangeMap, ReducerMode, StateChange, UpdateValue};
use crate::StoreError;

pub const REDUCER_MODE_KEY: &str = "_reducerMode";
pub const ARRAY_OPERATION_KEY: &str = "_arrayOperation";

const AT_KEY: &str = "at";
const VALUE_KEY: &str = "value";

impl StateChange {
    /// See [`from_json`].
    pub fn from_json(value: &Value) -> Result<StateChange, StoreError> {
        from_json(value)
    }

    /// See [`to_json`].
    pub fn to_json(&self) -> Result<Value, StoreError> {
        to_json(self)
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────

/// Decode a JSON change description.
///
/// # Errors
///
/// - `StoreError::MalformedArrayOperation` for an unknown operation, an
///   `update` without `at`, or a missing `value`
/// - `StoreError::InvalidChange` for an unknown reducer mode or an array
///   operation nested inside a replaced subtree
pub fn from_json(value: &Value) -> Result<StateChange, StoreError> {
    let Value::Object(map) = value else {
        return Ok(StateChange::Leaf(StateValue::from(value)));
    };

    if let Some(op) = map.get(ARRAY_OPERATION_KEY) {
        return decode_array_op(op, map).map(StateChange::Array);
    }

    match decode_mode(map)? {
        ReducerMode::Merge => {
            let mut fields = ChangeMap::with_capacity(map.len());
            for (key, child) in map.iter().filter(|(k, _)| *k != REDUCER_MODE_KEY) {
                fields.insert(key.clone(), from_json(child)?);
            }
            Ok(StateChange::Merge(fields))
        }
        ReducerMode::Replace => Ok(StateChange::Replace(decode_fields(map)?)),
    }
}

fn decode_mode(map: &Map<String, Value>) -> Result<ReducerMode, StoreError> {
    match map.get(REDUCER_MODE_KEY) {
        None => Ok(ReducerMode::Merge),
        Some(mode) => mode
            .as_str()
            .and_then(ReducerMode::parse)
            .ok_or_else(|| StoreError::InvalidChange(format!("unknown reducer mode {mode}"))),
    }
}

fn decode_fields(map: &Map<String, Value>) -> Result<ObjectMap, StoreError> {
    let mut fields = ObjectMap::with_capacity(map.len());
    for (key, child) in map.iter().filter(|(k, _)| *k != REDUCER_MODE_KEY) {
        fields.insert(key.clone(), decode_plain(child)?);
    }
    Ok(fields)
}

/// A value inside a replaced subtree or a pushed element: reducer-mode tags
/// are dropped, array operations are rejected.
fn decode_plain(value: &Value) -> Result<StateValue, StoreError> {
    match value {
        Value::Object(map) => {
            if map.contains_key(ARRAY_OPERATION_KEY) {
                return Err(StoreError::InvalidChange(
                    "array operations cannot appear inside a plain value".into(),
                ));
            }
            Ok(StateValue::Object(StateObject::from_entries(decode_fields(map)?)))
        }
        Value::Array(items) => Ok(StateValue::Array(StateArray::from_items(
            items.iter().map(decode_plain).collect::<Result<_, _>>()?,
        ))),
        other => Ok(StateValue::from(other)),
    }
}

fn decode_index(v: &Value) -> Result<usize, StoreError> {
    let n = v.as_u64().ok_or_else(|| {
        StoreError::MalformedArrayOperation(format!("`at` must be a non-negative integer, got {v}"))
    })?;
    usize::try_from(n)
        .map_err(|_| StoreError::MalformedArrayOperation(format!("`at` is out of range for this platform, got {n}")))
}

fn decode_array_op(op: &Value, map: &Map<String, Value>) -> Result<ArrayOp, StoreError> {
    let name = op.as_str().ok_or_else(|| {
        StoreError::MalformedArrayOperation(format!("operation name must be a string, got {op}"))
    })?;
    let at = map.get(AT_KEY);
    let value = map.get(VALUE_KEY);

    match name {
        "update" => {
            let at = at.ok_or_else(|| {
                StoreError::MalformedArrayOperation("`update` needs an `at` index".into())
            })?;
            let value = value.ok_or_else(|| {
                StoreError::MalformedArrayOperation("`update` needs a `value`".into())
            })?;
            Ok(ArrayOp::Update {
                at: ElementSelector::Index(decode_index(at)?),
                value: UpdateValue::Change(Box::new(from_json(value)?)),
            })
        }
        "push" => {
            let value = value.ok_or_else(|| {
                StoreError::MalformedArrayOperation("`push` needs a `value`".into())
            })?;
            Ok(ArrayOp::Push {
                at: at.map(decode_index).transpose()?,
                value: decode_plain(value)?,
            })
        }
        "pull" => Ok(ArrayOp::Pull {
            at: at.map(decode_index).transpose()?.map(ElementSelector::Index),
        }),
        other => Err(StoreError::MalformedArrayOperation(format!(
            "unknown array operation `{other}`"
        ))),
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────

/// Encode a change into its JSON form.
///
/// A leaf object is encoded as a replace node, since that is what
/// overwriting with an object means.
///
/// # Errors
///
/// Returns `StoreError::InvalidChange` for predicate or finder selectors and
/// computed update values, which have no JSON form.
pub fn to_json(change: &StateChange) -> Result<Value, StoreError> {
    match change {
        StateChange::Leaf(StateValue::Object(obj)) => Ok(encode_replace(obj.iter())),
        StateChange::Leaf(value) => Ok(value.to_json()),
        StateChange::Merge(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (key, child) in fields {
                map.insert(key.clone(), to_json(child)?);
            }
            Ok(Value::Object(map))
        }
        StateChange::Replace(fields) => Ok(encode_replace(fields.iter())),
        StateChange::Array(op) => encode_array_op(op),
    }
}

fn encode_replace<'a>(fields: impl Iterator<Item = (&'a String, &'a StateValue)>) -> Value {
    let mut map = Map::new();
    map.insert(REDUCER_MODE_KEY.into(), json!(ReducerMode::Replace.as_str()));
    for (key, val) in fields {
        map.insert(key.clone(), val.to_json());
    }
    Value::Object(map)
}

fn encode_index(selector: &ElementSelector) -> Result<Value, StoreError> {
    match selector {
        ElementSelector::Index(idx) => Ok(json!(idx)),
        _ => Err(StoreError::InvalidChange(
            "predicate selectors have no JSON form".into(),
        )),
    }
}

fn encode_array_op(op: &ArrayOp) -> Result<Value, StoreError> {
    let mut map = Map::new();
    map.insert(ARRAY_OPERATION_KEY.into(), json!(op.op_name()));
    match op {
        ArrayOp::Update { at, value } => {
            map.insert(AT_KEY.into(), encode_index(at)?);
            let value = match value {
                UpdateValue::Change(change) => to_json(change)?,
                UpdateValue::Computed(_) => {
                    return Err(StoreError::InvalidChange(
                        "computed update values have no JSON form".into(),
                    ))
                }
            };
            map.insert(VALUE_KEY.into(), value);
        }
        ArrayOp::Push { at, value } => {
            if let Some(idx) = at {
                map.insert(AT_KEY.into(), json!(idx));
            }
            map.insert(VALUE_KEY.into(), value.to_json());
        }
        ArrayOp::Pull { at } => {
            if let Some(selector) = at {
                map.insert(AT_KEY.into(), encode_index(selector)?);
            }
        }
    }
    Ok(Value::Object(map))
}
