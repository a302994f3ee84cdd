//! The state tree value model.
//!
//! A [`StateValue`] is a JSON-like tree extended with [`Atomic`] leaves.
//! Containers ([`StateArray`], [`StateObject`]) carry a [`NodeId`] so the
//! subscription layer can tell a node that was merged in place from one that
//! was written wholesale.

use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Map, Number, Value};

/// Ordered field map of an object node.
pub type ObjectMap = IndexMap<String, StateValue>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a container node.
///
/// Allocated once when the node is created and preserved by `Clone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh, never before used id.
    pub fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

// ── Atomic leaves ─────────────────────────────────────────────────────────

/// A shared, opaque payload (a pending operation, an abort handle, ...).
///
/// Compared and copied by pointer identity only.
#[derive(Clone)]
pub struct OpaqueHandle(Arc<dyn Any + Send + Sync>);

impl OpaqueHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        OpaqueHandle(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// True when both handles point at the same payload.
    pub fn ptr_eq(&self, other: &OpaqueHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for OpaqueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueHandle({:p})", Arc::as_ptr(&self.0))
    }
}

/// Leaf types that are never traversed, merged or persisted field by field.
#[derive(Debug, Clone)]
pub enum Atomic {
    Date(DateTime<Utc>),
    /// Binary data (a blob or file body).
    Binary(Vec<u8>),
    Handle(OpaqueHandle),
}

impl Atomic {
    /// Dedicated comparison: dates by instant, binary by content, handles by identity.
    pub fn same_as(&self, other: &Atomic) -> bool {
        match (self, other) {
            (Atomic::Date(a), Atomic::Date(b)) => a == b,
            (Atomic::Binary(a), Atomic::Binary(b)) => a == b,
            (Atomic::Handle(a), Atomic::Handle(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Atomic::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            // JSON has no byte type.
            Atomic::Binary(bytes) => {
                Value::Array(bytes.iter().map(|b| Value::Number((*b).into())).collect())
            }
            Atomic::Handle(_) => Value::Null,
        }
    }
}

// ── Containers ────────────────────────────────────────────────────────────

/// An array node.
#[derive(Debug, Clone)]
pub struct StateArray {
    id: NodeId,
    items: Vec<StateValue>,
}

impl StateArray {
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn from_items(items: Vec<StateValue>) -> Self {
        StateArray {
            id: NodeId::next(),
            items,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn into_items(self) -> Vec<StateValue> {
        self.items
    }
}

impl Default for StateArray {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for StateArray {
    type Target = Vec<StateValue>;

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl DerefMut for StateArray {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.items
    }
}

/// An object node.
#[derive(Debug, Clone)]
pub struct StateObject {
    id: NodeId,
    entries: ObjectMap,
}

impl StateObject {
    pub fn new() -> Self {
        Self::from_entries(ObjectMap::new())
    }

    pub fn from_entries(entries: ObjectMap) -> Self {
        StateObject {
            id: NodeId::next(),
            entries,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn into_entries(self) -> ObjectMap {
        self.entries
    }
}

impl Default for StateObject {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for StateObject {
    type Target = ObjectMap;

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl DerefMut for StateObject {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entries
    }
}

// ── StateValue ────────────────────────────────────────────────────────────

/// A node of the state tree.
#[derive(Debug, Clone, Default)]
pub enum StateValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(StateArray),
    Object(StateObject),
    Atomic(Atomic),
}

impl StateValue {
    /// An empty object node.
    pub fn object() -> Self {
        StateValue::Object(StateObject::new())
    }

    /// An empty array node.
    pub fn array() -> Self {
        StateValue::Array(StateArray::new())
    }

    pub fn date(date: DateTime<Utc>) -> Self {
        StateValue::Atomic(Atomic::Date(date))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        StateValue::Atomic(Atomic::Binary(bytes.into()))
    }

    pub fn handle(handle: OpaqueHandle) -> Self {
        StateValue::Atomic(Atomic::Handle(handle))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, StateValue::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, StateValue::Array(_))
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, StateValue::Atomic(_))
    }

    pub fn as_object(&self) -> Option<&StateObject> {
        match self {
            StateValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut StateObject> {
        match self {
            StateValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&StateArray> {
        match self {
            StateValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut StateArray> {
        match self {
            StateValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Identity of the node, `None` for leaves.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            StateValue::Array(arr) => Some(arr.id()),
            StateValue::Object(obj) => Some(obj.id()),
            _ => None,
        }
    }

    /// Short name of the node kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            StateValue::Null => "null",
            StateValue::Bool(_) => "boolean",
            StateValue::Number(_) => "number",
            StateValue::String(_) => "string",
            StateValue::Array(_) => "array",
            StateValue::Object(_) => "object",
            StateValue::Atomic(_) => "atomic",
        }
    }

    /// Field lookup on an object node.
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.as_object().and_then(|obj| obj.get(key))
    }

    /// Turn this node into an object if it is not one already, and return it.
    ///
    /// A replaced node becomes a fresh, empty object.
    pub fn ensure_object(&mut self) -> &mut StateObject {
        if !self.is_object() {
            *self = StateValue::object();
        }
        match self {
            StateValue::Object(obj) => obj,
            _ => unreachable!("node was just made an object"),
        }
    }

    /// Turn this node into an array if it is not one already, and return it.
    pub fn ensure_array(&mut self) -> &mut StateArray {
        if !self.is_array() {
            *self = StateValue::array();
        }
        match self {
            StateValue::Array(arr) => arr,
            _ => unreachable!("node was just made an array"),
        }
    }

    /// Convert to plain JSON. Atomics are encoded lossily.
    pub fn to_json(&self) -> Value {
        match self {
            StateValue::Null => Value::Null,
            StateValue::Bool(b) => Value::Bool(*b),
            StateValue::Number(n) => Value::Number(n.clone()),
            StateValue::String(s) => Value::String(s.clone()),
            StateValue::Array(arr) => Value::Array(arr.iter().map(StateValue::to_json).collect()),
            StateValue::Object(obj) => {
                let mut map = Map::new();
                for (key, val) in obj.iter() {
                    map.insert(key.clone(), val.to_json());
                }
                Value::Object(map)
            }
            StateValue::Atomic(atomic) => atomic.to_json(),
        }
    }
}

impl PartialEq for StateValue {
    /// Structural equality. Node ids are not compared.
    fn eq(&self, other: &Self) -> bool {
        crate::deep_equal(self, other)
    }
}

impl From<&Value> for StateValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => StateValue::Null,
            Value::Bool(b) => StateValue::Bool(*b),
            Value::Number(n) => StateValue::Number(n.clone()),
            Value::String(s) => StateValue::String(s.clone()),
            Value::Array(arr) => {
                StateValue::Array(StateArray::from_items(arr.iter().map(StateValue::from).collect()))
            }
            Value::Object(obj) => {
                let mut entries = ObjectMap::with_capacity(obj.len());
                for (key, val) in obj {
                    entries.insert(key.clone(), StateValue::from(val));
                }
                StateValue::Object(StateObject::from_entries(entries))
            }
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        StateValue::from(&value)
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        StateValue::Bool(b)
    }
}

impl From<i64> for StateValue {
    fn from(n: i64) -> Self {
        StateValue::Number(n.into())
    }
}

impl From<u64> for StateValue {
    fn from(n: u64) -> Self {
        StateValue::Number(n.into())
    }
}

impl From<i32> for StateValue {
    fn from(n: i32) -> Self {
        StateValue::Number(n.into())
    }
}

impl From<f64> for StateValue {
    /// Non-finite floats have no JSON representation and become `Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(StateValue::Number).unwrap_or(StateValue::Null)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::String(s.to_string())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        StateValue::String(s)
    }
}

impl From<StateObject> for StateValue {
    fn from(obj: StateObject) -> Self {
        StateValue::Object(obj)
    }
}

impl From<StateArray> for StateValue {
    fn from(arr: StateArray) -> Self {
        StateValue::Array(arr)
    }
}

impl From<ObjectMap> for StateValue {
    fn from(entries: ObjectMap) -> Self {
        StateValue::Object(StateObject::from_entries(entries))
    }
}

impl From<Vec<StateValue>> for StateValue {
    fn from(items: Vec<StateValue>) -> Self {
        StateValue::Array(StateArray::from_items(items))
    }
}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StateValue::Null => serializer.serialize_unit(),
            StateValue::Bool(b) => serializer.serialize_bool(*b),
            StateValue::Number(n) => n.serialize(serializer),
            StateValue::String(s) => serializer.serialize_str(s),
            StateValue::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for item in arr.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            StateValue::Object(obj) => {
                let mut map = serializer.serialize_map(Some(obj.len()))?;
                for (key, val) in obj.iter() {
                    map.serialize_entry(key, val)?;
                }
                map.end()
            }
            StateValue::Atomic(atomic) => atomic.to_json().serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_order() {
        let value = StateValue::from(json!({"z": 1, "a": 2, "m": 3}));
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_json_roundtrip() {
        let doc = json!({"a": [1, 2, {"b": null}], "c": "x", "d": true});
        assert_eq!(StateValue::from(&doc).to_json(), doc);
    }

    #[test]
    fn test_clone_keeps_node_ids() {
        let value = StateValue::from(json!({"a": [1]}));
        let cloned = value.clone();
        assert_eq!(value.node_id(), cloned.node_id());
        assert_eq!(
            value.get("a").unwrap().node_id(),
            cloned.get("a").unwrap().node_id()
        );
    }

    #[test]
    fn test_fresh_nodes_get_distinct_ids() {
        let a = StateValue::object();
        let b = StateValue::object();
        assert_ne!(a.node_id(), b.node_id());
        assert_eq!(StateValue::from(1).node_id(), None);
    }

    #[test]
    fn test_ensure_object_replaces_other_kinds() {
        let mut value = StateValue::from(5);
        value.ensure_object().insert("a".into(), StateValue::from(1));
        assert_eq!(value, StateValue::from(json!({"a": 1})));

        let mut existing = StateValue::from(json!({"x": 1}));
        let id = existing.node_id();
        existing.ensure_object();
        assert_eq!(existing.node_id(), id);
    }

    #[test]
    fn test_ensure_array() {
        let mut value = StateValue::Null;
        value.ensure_array().push(StateValue::from("x"));
        assert_eq!(value, StateValue::from(json!(["x"])));
    }

    #[test]
    fn test_atomic_to_json() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(StateValue::date(date).to_json(), json!("2024-03-01T12:00:00.000Z"));
        assert_eq!(StateValue::binary(vec![1u8, 2]).to_json(), json!([1, 2]));
        assert_eq!(StateValue::handle(OpaqueHandle::new(3u8)).to_json(), json!(null));
    }

    #[test]
    fn test_handle_identity() {
        let h = OpaqueHandle::new(String::from("pending"));
        let same = h.clone();
        let other = OpaqueHandle::new(String::from("pending"));
        assert!(h.ptr_eq(&same));
        assert!(!h.ptr_eq(&other));
        assert_eq!(h.downcast_ref::<String>().map(String::as_str), Some("pending"));
    }

    #[test]
    fn test_serialize_matches_to_json() {
        let value = StateValue::from(json!({"a": [1, "two", false]}));
        assert_eq!(serde_json::to_value(&value).unwrap(), value.to_json());
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert!(StateValue::from(f64::NAN).is_null());
        assert_eq!(StateValue::from(1.5), StateValue::from(json!(1.5)));
    }
}
