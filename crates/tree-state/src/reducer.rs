//! Applies a [`StateChange`] to a state tree in place.

use tree_state_path::ElementSelector;
use tree_state_util::{deep_copy, StateArray, StateObject, StateValue};

use crate::change::{ArrayOp, StateChange, UpdateValue};
use crate::StoreError;

/// Reduce `change` into `state`, returning `state` for chaining.
///
/// Merge nodes recurse field by field, creating missing fields. Leaves and
/// replace nodes overwrite the target with a deep copy of the given value,
/// so nothing written into the tree shares identity with the caller's data.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tree_state::{from_json, reduce};
/// use tree_state_util::StateValue;
///
/// let mut state = StateValue::from(json!({"a": {"b": 1, "c": 2}}));
/// reduce(&mut state, &from_json(&json!({"a": {"_reducerMode": "replace", "b": 1}})).unwrap()).unwrap();
/// assert_eq!(state, StateValue::from(json!({"a": {"b": 1}})));
/// ```
///
/// # Errors
///
/// Returns `StoreError::IndexOutOfBounds` when an `update` targets an index
/// past the end of the sequence. The tree may be partially updated in that
/// case.
pub fn reduce<'a>(
    state: &'a mut StateValue,
    change: &StateChange,
) -> Result<&'a mut StateValue, StoreError> {
    apply(state, change)?;
    Ok(state)
}

fn apply(state: &mut StateValue, change: &StateChange) -> Result<(), StoreError> {
    match change {
        StateChange::Leaf(value) => {
            *state = deep_copy(value);
            Ok(())
        }
        StateChange::Replace(fields) => {
            let entries = fields.iter().map(|(k, v)| (k.clone(), deep_copy(v))).collect();
            *state = StateValue::Object(StateObject::from_entries(entries));
            Ok(())
        }
        StateChange::Merge(fields) => {
            let obj = state.ensure_object();
            for (key, child) in fields {
                let slot = obj.entry(key.clone()).or_insert(StateValue::Null);
                apply(slot, child)?;
            }
            Ok(())
        }
        StateChange::Array(op) => apply_array_op(state.ensure_array(), op),
    }
}

// ── Array operations ──────────────────────────────────────────────────────

fn apply_array_op(arr: &mut StateArray, op: &ArrayOp) -> Result<(), StoreError> {
    match op {
        ArrayOp::Update { at, value } => apply_update(arr, at, value),
        ArrayOp::Push { at, value } => {
            let idx = at.map_or(arr.len(), |i| i.min(arr.len()));
            arr.insert(idx, deep_copy(value));
            Ok(())
        }
        ArrayOp::Pull { at } => {
            apply_pull(arr, at.as_ref());
            Ok(())
        }
    }
}

fn apply_update(
    arr: &mut StateArray,
    at: &ElementSelector,
    value: &UpdateValue,
) -> Result<(), StoreError> {
    let indices = match at {
        ElementSelector::Index(idx) if *idx >= arr.len() => {
            return Err(StoreError::IndexOutOfBounds {
                index: *idx,
                len: arr.len(),
            })
        }
        ElementSelector::Index(idx) => vec![*idx],
        // Matches are taken before any element is touched.
        selector => selector.all_indices(arr),
    };

    for idx in indices {
        let element = &mut arr[idx];
        let change = value.for_element(element);
        apply(element, &change)?;
    }
    Ok(())
}

fn apply_pull(arr: &mut StateArray, at: Option<&ElementSelector>) {
    match at {
        None => {
            arr.pop();
        }
        Some(ElementSelector::Index(idx)) => {
            if *idx < arr.len() {
                arr.remove(*idx);
            }
        }
        Some(ElementSelector::Matching(pred)) => arr.retain(|item| !pred.test(item)),
        Some(ElementSelector::Find(finder)) => {
            if let Some(idx) = finder.find(arr) {
                arr.remove(idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::from_json;
    use serde_json::json;
    use tree_state_path::{resolve, Path};

    fn v(doc: serde_json::Value) -> StateValue {
        StateValue::from(doc)
    }

    fn reduce_json(state: serde_json::Value, change: serde_json::Value) -> StateValue {
        let mut state = v(state);
        reduce(&mut state, &from_json(&change).unwrap()).unwrap();
        state
    }

    #[test]
    fn test_merge_recurses_and_creates() {
        let state = reduce_json(json!({"a": {"b": 1}}), json!({"a": {"c": 2}, "d": {"e": 3}}));
        assert_eq!(state, v(json!({"a": {"b": 1, "c": 2}, "d": {"e": 3}})));
    }

    #[test]
    fn test_merge_keeps_node_identity() {
        let mut state = v(json!({"a": {"b": 1}}));
        let before = state.get("a").and_then(StateValue::node_id);
        reduce(&mut state, &from_json(&json!({"a": {"b": 2}})).unwrap()).unwrap();
        assert_eq!(state.get("a").and_then(StateValue::node_id), before);
    }

    #[test]
    fn test_replace_wipes_finer_state() {
        let state = reduce_json(
            json!({"a": {"b": 1, "c": 2}}),
            json!({"a": {"_reducerMode": "replace", "b": 1}}),
        );
        assert_eq!(state, v(json!({"a": {"b": 1}})));
    }

    #[test]
    fn test_replace_allocates_new_node() {
        let mut state = v(json!({"a": {"b": 1}}));
        let before = state.get("a").and_then(StateValue::node_id);
        reduce(&mut state, &StateChange::merge([("a", StateChange::replace([("b", v(json!(1)))]))]))
            .unwrap();
        assert_ne!(state.get("a").and_then(StateValue::node_id), before);
    }

    #[test]
    fn test_null_clears_field() {
        let state = reduce_json(json!({"a": {"b": 1}}), json!({"a": null}));
        assert_eq!(state, v(json!({"a": null})));
    }

    #[test]
    fn test_leaf_array_overwrites() {
        let state = reduce_json(json!({"a": [1, 2, 3]}), json!({"a": [9]}));
        assert_eq!(state, v(json!({"a": [9]})));
    }

    #[test]
    fn test_merge_into_scalar_creates_object() {
        let state = reduce_json(json!({"a": 5}), json!({"a": {"b": 1}}));
        assert_eq!(state, v(json!({"a": {"b": 1}})));
    }

    #[test]
    fn test_written_values_are_copies() {
        let shared = v(json!({"x": 1}));
        let mut state = StateValue::object();
        reduce(&mut state, &StateChange::merge([("a", StateChange::Leaf(shared.clone()))])).unwrap();
        assert_eq!(state.get("a"), Some(&shared));
        assert_ne!(state.get("a").and_then(StateValue::node_id), shared.node_id());
    }

    #[test]
    fn test_update_by_index() {
        let state = reduce_json(
            json!({"list": [{"id": 1, "n": 0}, {"id": 2, "n": 0}]}),
            json!({"list": {"_arrayOperation": "update", "at": 1, "value": {"n": 5}}}),
        );
        assert_eq!(state, v(json!({"list": [{"id": 1, "n": 0}, {"id": 2, "n": 5}]})));
    }

    #[test]
    fn test_update_with_replace_mode() {
        let state = reduce_json(
            json!({"list": [{"id": 1, "n": 0}]}),
            json!({"list": {"_arrayOperation": "update", "at": 0, "value": {"_reducerMode": "replace", "id": 7}}}),
        );
        assert_eq!(state, v(json!({"list": [{"id": 7}]})));
    }

    #[test]
    fn test_update_by_predicate_hits_every_match() {
        let mut state = v(json!({"list": [{"t": "a"}, {"t": "b"}, {"t": "a"}]}));
        let op = ArrayOp::update(
            ElementSelector::matching(|e| e.get("t").and_then(StateValue::as_str) == Some("a")),
            StateChange::merge([("seen", StateChange::leaf(true))]),
        );
        reduce(&mut state, &StateChange::merge([("list", op.into())])).unwrap();
        assert_eq!(
            state,
            v(json!({"list": [{"t": "a", "seen": true}, {"t": "b"}, {"t": "a", "seen": true}]}))
        );
    }

    #[test]
    fn test_update_computed_from_element() {
        let mut state = v(json!({"counters": [1, 2]}));
        let op = ArrayOp::update_with(0, |current| StateChange::leaf(current.as_i64().unwrap_or(0) * 10));
        reduce(&mut state, &StateChange::merge([("counters", op.into())])).unwrap();
        assert_eq!(state, v(json!({"counters": [10, 2]})));
    }

    #[test]
    fn test_update_out_of_bounds() {
        let mut state = v(json!({"list": [1]}));
        let change = from_json(&json!({"list": {"_arrayOperation": "update", "at": 3, "value": 0}})).unwrap();
        let err = reduce(&mut state, &change).unwrap_err();
        assert_eq!(err, StoreError::IndexOutOfBounds { index: 3, len: 1 });
    }

    #[test]
    fn test_push_appends_and_inserts() {
        let state = reduce_json(
            json!({"a": [1, 3]}),
            json!({"a": {"_arrayOperation": "push", "at": 1, "value": 2}, "b": {"_arrayOperation": "push", "value": "x"}}),
        );
        assert_eq!(state, v(json!({"a": [1, 2, 3], "b": ["x"]})));
    }

    #[test]
    fn test_push_index_is_clamped() {
        let state = reduce_json(json!({"a": [1]}), json!({"a": {"_arrayOperation": "push", "at": 10, "value": 2}}));
        assert_eq!(state, v(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_pull_variants() {
        let state = reduce_json(
            json!({"a": [1, 2, 3], "b": [1, 2, 3], "c": [1, 2]}),
            json!({
                "a": {"_arrayOperation": "pull", "at": 0},
                "b": {"_arrayOperation": "pull"},
                "c": {"_arrayOperation": "pull", "at": 5}
            }),
        );
        assert_eq!(state, v(json!({"a": [2, 3], "b": [1, 2], "c": [1, 2]})));
    }

    #[test]
    fn test_pull_by_predicate_removes_all_matches() {
        let mut state = v(json!({"list": [1, 2, 1, 3, 1]}));
        let op = ArrayOp::pull(ElementSelector::matching(|e| e.as_i64() == Some(1)));
        reduce(&mut state, &StateChange::merge([("list", op.into())])).unwrap();
        assert_eq!(state, v(json!({"list": [2, 3]})));
    }

    #[test]
    fn test_pull_by_finder() {
        let mut state = v(json!({"list": [5, 9, 7]}));
        let op = ArrayOp::pull(ElementSelector::find(|items| {
            (0..items.len()).max_by_key(|&i| items[i].as_i64())
        }));
        reduce(&mut state, &StateChange::merge([("list", op.into())])).unwrap();
        assert_eq!(state, v(json!({"list": [5, 7]})));
    }

    #[test]
    fn test_array_op_on_missing_field_creates_array() {
        let state = reduce_json(json!({}), json!({"log": {"_arrayOperation": "push", "value": "hi"}}));
        assert_eq!(state, v(json!({"log": ["hi"]})));
    }

    #[test]
    fn test_wrapped_change_reaches_nested_element() {
        let mut state = v(json!({"users": [{"name": "a", "tags": []}]}));
        let change = StateChange::array(ArrayOp::push("admin"))
            .wrap_at(&Path::root().key("users").index(0).key("tags"));
        reduce(&mut state, &change).unwrap();
        let tags = resolve(&state, &Path::root().key("users").index(0).key("tags")).unwrap();
        assert_eq!(tags.value(), Some(&v(json!(["admin"]))));
    }

    #[test]
    fn test_atomics_are_written_as_leaves() {
        let date = chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap();
        let mut state = StateValue::object();
        reduce(&mut state, &StateChange::merge([("at", StateChange::leaf(StateValue::date(date)))]))
            .unwrap();
        assert_eq!(state.get("at"), Some(&StateValue::date(date)));
    }
}
