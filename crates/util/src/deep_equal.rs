use serde_json::Number;

use crate::value::StateValue;

/// Performs a deep equality check between two state values.
///
/// Arrays are compared element by element, objects key by key regardless of
/// insertion order. Node ids are ignored. Atomics use their dedicated
/// comparison (see [`crate::Atomic::same_as`]).
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use tree_state_util::{deep_equal, StateValue};
///
/// let a = StateValue::from(json!({"foo": [1, 2, 3]}));
/// let b = StateValue::from(json!({"foo": [1, 2, 3]}));
/// let c = StateValue::from(json!({"foo": [1, 2, 4]}));
///
/// assert!(deep_equal(&a, &b));
/// assert!(!deep_equal(&a, &c));
/// ```
pub fn deep_equal(a: &StateValue, b: &StateValue) -> bool {
    match (a, b) {
        (StateValue::Null, StateValue::Null) => true,
        (StateValue::Bool(a), StateValue::Bool(b)) => a == b,
        (StateValue::Number(a), StateValue::Number(b)) => numbers_equal(a, b),
        (StateValue::String(a), StateValue::String(b)) => a == b,
        (StateValue::Atomic(a), StateValue::Atomic(b)) => a.same_as(b),

        (StateValue::Array(arr_a), StateValue::Array(arr_b)) => {
            if arr_a.len() != arr_b.len() {
                return false;
            }
            arr_a.iter().zip(arr_b.iter()).all(|(x, y)| deep_equal(x, y))
        }

        (StateValue::Object(obj_a), StateValue::Object(obj_b)) => {
            if obj_a.len() != obj_b.len() {
                return false;
            }
            for (key, val_a) in obj_a.iter() {
                match obj_b.get(key) {
                    Some(val_b) => {
                        if !deep_equal(val_a, val_b) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
            true
        }

        // Different kinds are never equal
        _ => false,
    }
}

/// Numbers compare by value, so `1` and `1.0` are equal. Integers are
/// compared exactly before falling back to `f64`.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Reference comparison.
///
/// Containers are the same node when their ids match; leaves fall back to
/// value comparison since they have no identity of their own.
pub fn same_node(a: &StateValue, b: &StateValue) -> bool {
    match (a.node_id(), b.node_id()) {
        (Some(id_a), Some(id_b)) => id_a == id_b,
        (None, None) => deep_equal(a, b),
        _ => false,
    }
}
