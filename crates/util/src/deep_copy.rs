use crate::value::{Atomic, ObjectMap, StateArray, StateObject, StateValue};

/// Creates a deep copy of a state value.
///
/// Every container in the copy is a new node with a fresh id, so the copy is
/// never "the same reference" as its source. Atomics are copied by their
/// dedicated logic: dates and binary by value, handles by identity.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use tree_state_util::{deep_copy, StateValue};
///
/// let original = StateValue::from(json!({"foo": [1, 2, 3]}));
/// let copy = deep_copy(&original);
///
/// assert_eq!(original, copy);
/// assert_ne!(original.node_id(), copy.node_id());
/// ```
pub fn deep_copy(value: &StateValue) -> StateValue {
    match value {
        StateValue::Null => StateValue::Null,
        StateValue::Bool(b) => StateValue::Bool(*b),
        StateValue::Number(n) => StateValue::Number(n.clone()),
        StateValue::String(s) => StateValue::String(s.clone()),
        StateValue::Array(arr) => {
            StateValue::Array(StateArray::from_items(arr.iter().map(deep_copy).collect()))
        }
        StateValue::Object(obj) => {
            let mut entries = ObjectMap::with_capacity(obj.len());
            for (key, val) in obj.iter() {
                entries.insert(key.clone(), deep_copy(val));
            }
            StateValue::Object(StateObject::from_entries(entries))
        }
        StateValue::Atomic(atomic) => StateValue::Atomic(copy_atomic(atomic)),
    }
}

fn copy_atomic(atomic: &Atomic) -> Atomic {
    match atomic {
        Atomic::Date(d) => Atomic::Date(*d),
        Atomic::Binary(bytes) => Atomic::Binary(bytes.clone()),
        Atomic::Handle(handle) => Atomic::Handle(handle.clone()),
    }
}
