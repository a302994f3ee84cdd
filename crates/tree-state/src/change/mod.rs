//! Structured change descriptions.
//!
//! A [`StateChange`] is a recursive partial of the state tree. Each node is
//! classified once, when the change is built or decoded, into a leaf
//! overwrite, a merge node, a replace node or an array operation; the
//! reducer and the cache handlers dispatch on that tag instead of inspecting
//! value shapes at every level.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tree_state_path::{ElementSelector, Path, PathSegment};
use tree_state_util::{ObjectMap, StateValue};

pub mod codec;

pub use codec::{from_json, to_json, ARRAY_OPERATION_KEY, REDUCER_MODE_KEY};

/// Child changes of a merge node, keyed by field name.
pub type ChangeMap = IndexMap<String, StateChange>;

// ── Reducer mode ──────────────────────────────────────────────────────────

/// Merge policy of a mapping-shaped change node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReducerMode {
    /// Recurse field by field.
    #[default]
    Merge,
    /// Substitute the target subtree wholesale.
    Replace,
}

impl ReducerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReducerMode::Merge => "merge",
            ReducerMode::Replace => "replace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "merge" => Some(ReducerMode::Merge),
            "replace" => Some(ReducerMode::Replace),
            _ => None,
        }
    }
}

// ── Array operations ──────────────────────────────────────────────────────

/// Computes the change for an element from its current value.
#[derive(Clone)]
pub struct ComputeFn(Rc<dyn Fn(&StateValue) -> StateChange>);

impl ComputeFn {
    pub fn new(f: impl Fn(&StateValue) -> StateChange + 'static) -> Self {
        ComputeFn(Rc::new(f))
    }

    pub fn call(&self, current: &StateValue) -> StateChange {
        (self.0)(current)
    }
}

impl fmt::Debug for ComputeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ComputeFn")
    }
}

/// The change an `update` applies to each selected element.
#[derive(Debug, Clone)]
pub enum UpdateValue {
    Change(Box<StateChange>),
    Computed(ComputeFn),
}

impl UpdateValue {
    /// The change to apply to `current`.
    pub fn for_element(&self, current: &StateValue) -> Cow<'_, StateChange> {
        match self {
            UpdateValue::Change(change) => Cow::Borrowed(&**change),
            UpdateValue::Computed(f) => Cow::Owned(f.call(current)),
        }
    }
}

/// An operation on a sequence node.
#[derive(Debug, Clone)]
pub enum ArrayOp {
    /// Reduce `value` into every selected element.
    Update {
        at: ElementSelector,
        value: UpdateValue,
    },
    /// Insert `value` at `at`, or append when `at` is `None`.
    Push {
        at: Option<usize>,
        value: StateValue,
    },
    /// Remove the selected elements, or the last element when `at` is `None`.
    Pull { at: Option<ElementSelector> },
}

impl ArrayOp {
    pub fn update(at: impl Into<ElementSelector>, change: StateChange) -> Self {
        ArrayOp::Update {
            at: at.into(),
            value: UpdateValue::Change(Box::new(change)),
        }
    }

    pub fn update_with(
        at: impl Into<ElementSelector>,
        f: impl Fn(&StateValue) -> StateChange + 'static,
    ) -> Self {
        ArrayOp::Update {
            at: at.into(),
            value: UpdateValue::Computed(ComputeFn::new(f)),
        }
    }

    pub fn push(value: impl Into<StateValue>) -> Self {
        ArrayOp::Push {
            at: None,
            value: value.into(),
        }
    }

    pub fn push_at(index: usize, value: impl Into<StateValue>) -> Self {
        ArrayOp::Push {
            at: Some(index),
            value: value.into(),
        }
    }

    pub fn pull(at: impl Into<ElementSelector>) -> Self {
        ArrayOp::Pull { at: Some(at.into()) }
    }

    pub fn pull_last() -> Self {
        ArrayOp::Pull { at: None }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            ArrayOp::Update { .. } => "update",
            ArrayOp::Push { .. } => "push",
            ArrayOp::Pull { .. } => "pull",
        }
    }
}

// ── StateChange ───────────────────────────────────────────────────────────

/// A structured update to (a subtree of) the state.
#[derive(Debug, Clone)]
pub enum StateChange {
    /// Overwrite the target with this value. `Null` clears it; arrays and
    /// atomics given here are values, not operations.
    Leaf(StateValue),
    /// Merge the fields into the target object.
    Merge(ChangeMap),
    /// Substitute the target with an object of exactly these fields.
    Replace(ObjectMap),
    /// Operate on the target array.
    Array(ArrayOp),
}

impl StateChange {
    /// An empty merge, the identity change.
    pub fn empty() -> Self {
        StateChange::Merge(ChangeMap::new())
    }

    pub fn leaf(value: impl Into<StateValue>) -> Self {
        StateChange::Leaf(value.into())
    }

    /// A merge node with the given children.
    ///
    /// # Example
    ///
    /// ```
    /// use tree_state::StateChange;
    ///
    /// let change = StateChange::merge([
    ///     ("user", StateChange::merge([("name", StateChange::leaf("ada"))])),
    /// ]);
    /// assert!(change.is_merge());
    /// ```
    pub fn merge<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, StateChange)>,
        K: Into<String>,
    {
        StateChange::Merge(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// A replace node with the given fields.
    pub fn replace<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, StateValue)>,
        K: Into<String>,
    {
        StateChange::Replace(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array(op: ArrayOp) -> Self {
        StateChange::Array(op)
    }

    /// Interpret a partial state as a change: objects merge field by field,
    /// everything else overwrites.
    pub fn from_partial(partial: StateValue) -> Self {
        match partial {
            StateValue::Object(obj) => StateChange::Merge(
                obj.into_entries()
                    .into_iter()
                    .map(|(k, v)| (k, StateChange::from_partial(v)))
                    .collect(),
            ),
            other => StateChange::Leaf(other),
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, StateChange::Merge(_))
    }

    /// Reducer mode of a mapping-shaped node, `None` for leaves and array operations.
    pub fn reducer_mode(&self) -> Option<ReducerMode> {
        match self {
            StateChange::Merge(_) => Some(ReducerMode::Merge),
            StateChange::Replace(_) => Some(ReducerMode::Replace),
            _ => None,
        }
    }

    /// Nest this change so that it applies at `entry_path` instead of the root.
    ///
    /// Key segments become merge nodes, element segments become `update`
    /// operations on the selected elements.
    ///
    /// # Example
    ///
    /// ```
    /// use tree_state::StateChange;
    /// use tree_state_path::Path;
    ///
    /// let change = StateChange::leaf(true).wrap_at(&Path::from(["a", "b"]));
    /// assert!(change.touches(&Path::from(["a", "b"])));
    /// assert!(!change.touches(&Path::from(["a", "c"])));
    /// ```
    pub fn wrap_at(self, entry_path: &Path) -> StateChange {
        entry_path
            .segments()
            .iter()
            .rev()
            .fold(self, |inner, segment| match segment {
                PathSegment::Key(key) => {
                    let mut fields = ChangeMap::with_capacity(1);
                    fields.insert(key.clone(), inner);
                    StateChange::Merge(fields)
                }
                PathSegment::Element(selector) => StateChange::Array(ArrayOp::Update {
                    at: selector.clone(),
                    value: UpdateValue::Change(Box::new(inner)),
                }),
            })
    }

    /// Whether applying this change may alter the value at `path`.
    ///
    /// Walks the change tree along the path. Only a merge node lacking the
    /// next key proves the path untouched; replace nodes, leaves and array
    /// operations on the way substitute or reshuffle everything below them.
    pub fn touches(&self, path: &Path) -> bool {
        let mut current = self;
        for segment in path {
            match (current, segment) {
                (StateChange::Merge(fields), PathSegment::Key(key)) => match fields.get(key) {
                    Some(child) => current = child,
                    None => return false,
                },
                _ => return true,
            }
        }
        true
    }
}

impl From<ArrayOp> for StateChange {
    fn from(op: ArrayOp) -> Self {
        StateChange::Array(op)
    }
}

impl From<StateValue> for StateChange {
    fn from(value: StateValue) -> Self {
        StateChange::Leaf(value)
    }
}

impl TryFrom<serde_json::Value> for StateChange {
    type Error = crate::StoreError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        from_json(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_partial_nests_merges() {
        let change = StateChange::from_partial(StateValue::from(json!({"a": {"b": 5}, "c": [1]})));
        let StateChange::Merge(fields) = &change else {
            panic!("Expected merge");
        };
        assert!(fields["a"].is_merge());
        assert!(matches!(&fields["c"], StateChange::Leaf(StateValue::Array(_))));
    }

    #[test]
    fn test_wrap_at_keys() {
        let change = StateChange::leaf(1).wrap_at(&Path::from(["a", "b"]));
        let StateChange::Merge(outer) = &change else {
            panic!("Expected merge");
        };
        let StateChange::Merge(inner) = &outer["a"] else {
            panic!("Expected nested merge");
        };
        assert!(matches!(&inner["b"], StateChange::Leaf(v) if *v == StateValue::from(1)));
    }

    #[test]
    fn test_wrap_at_element_becomes_update() {
        let change = StateChange::leaf(1).wrap_at(&Path::root().key("list").index(2).key("n"));
        let StateChange::Merge(outer) = &change else {
            panic!("Expected merge");
        };
        match &outer["list"] {
            StateChange::Array(ArrayOp::Update {
                at: ElementSelector::Index(2),
                value: UpdateValue::Change(inner),
            }) => assert!(inner.touches(&Path::from(["n"]))),
            other => panic!("Expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_wrap_at_root_is_identity() {
        let change = StateChange::leaf("x").wrap_at(&Path::root());
        assert!(matches!(change, StateChange::Leaf(_)));
    }

    #[test]
    fn test_touches() {
        let change = StateChange::merge([
            ("a", StateChange::merge([("b", StateChange::leaf(1))])),
            ("r", StateChange::replace([("x", StateValue::from(1))])),
            ("list", ArrayOp::push(1).into()),
        ]);
        assert!(change.touches(&Path::root()));
        assert!(change.touches(&Path::from(["a"])));
        assert!(change.touches(&Path::from(["a", "b"])));
        assert!(change.touches(&Path::from(["a", "b", "deeper"])));
        assert!(!change.touches(&Path::from(["a", "c"])));
        assert!(!change.touches(&Path::from(["z"])));
        assert!(change.touches(&Path::from(["r", "gone"])));
        assert!(change.touches(&Path::root().key("list").index(0)));
    }

    #[test]
    fn test_computed_update_value() {
        let value = UpdateValue::Computed(ComputeFn::new(|current| {
            StateChange::leaf(current.as_i64().unwrap_or(0) + 1)
        }));
        match value.for_element(&StateValue::from(41)).as_ref() {
            StateChange::Leaf(v) => assert_eq!(v, &StateValue::from(42)),
            other => panic!("Expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_reducer_mode_parse() {
        assert_eq!(ReducerMode::parse("replace"), Some(ReducerMode::Replace));
        assert_eq!(ReducerMode::parse("merge").map(|m| m.as_str()), Some("merge"));
        assert_eq!(ReducerMode::parse("other"), None);
    }
}
