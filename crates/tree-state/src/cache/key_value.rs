//! Cache handler persisting one entry per leaf path into a key-value store.
//!
//! Layout: the key is the dotted path of the leaf under
//! `tree-state.<cache name>.`, the value a JSON envelope
//! `{"v": <value>, "t": "string" | "number" | "boolean" | "array"}` so each
//! entry decodes back to the kind it was written as. Objects are spread
//! over their leaves; arrays are stored whole.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, warn};
use tree_state_path::{format_dotted, is_under, parse_dotted, Path};
use tree_state_util::{ObjectMap, StateValue};

use super::storage::KeyValueStorage;
use super::CacheHandler;
use crate::change::StateChange;
use crate::store::Store;
use crate::CacheError;

/// First component of every persisted key.
pub const KEY_PREFIX: &str = "tree-state";

const DEFAULT_NAME: &str = "kv";

// ── Entry envelope ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    String,
    Number,
    Boolean,
    Array,
}

/// A persisted leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub v: Value,
    pub t: EntryType,
}

impl PersistedEntry {
    /// Envelope for a persistable leaf. `None` for null, objects and atomics.
    pub fn from_value(value: &StateValue) -> Option<Self> {
        let t = match value {
            StateValue::String(_) => EntryType::String,
            StateValue::Number(_) => EntryType::Number,
            StateValue::Bool(_) => EntryType::Boolean,
            StateValue::Array(_) => EntryType::Array,
            _ => return None,
        };
        Some(PersistedEntry {
            v: value.to_json(),
            t,
        })
    }

    /// Decode according to the type tag. Booleans and numbers written as
    /// strings are accepted.
    pub fn into_value(self) -> Option<StateValue> {
        match (self.t, self.v) {
            (EntryType::String, v @ Value::String(_)) => Some(StateValue::from(v)),
            (EntryType::Array, v @ Value::Array(_)) => Some(StateValue::from(v)),
            (EntryType::Boolean, Value::Bool(b)) => Some(StateValue::Bool(b)),
            (EntryType::Boolean, Value::String(s)) => Some(StateValue::Bool(s == "true")),
            (EntryType::Number, Value::Number(n)) => Some(StateValue::Number(n)),
            (EntryType::Number, Value::String(s)) => parse_number(&s).map(StateValue::Number),
            _ => None,
        }
    }
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

// ── Handler ───────────────────────────────────────────────────────────────

/// [`CacheHandler`] over any [`KeyValueStorage`].
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use serde_json::json;
/// use tree_state::cache::{CacheHandler, KeyValueCacheHandler, MemoryStorage};
/// use tree_state::{SetOptions, StateChange, Store, StoreConfig};
/// use tree_state_util::StateValue;
///
/// let handler = Rc::new(KeyValueCacheHandler::new(MemoryStorage::new()));
/// let store = Store::new(StateValue::object(), StoreConfig::default(), vec![handler.clone() as Rc<dyn CacheHandler>]).unwrap();
///
/// let change = StateChange::from_json(&json!({"theme": "dark"})).unwrap();
/// store.set_with(change, SetOptions::default().cache_handler("kv")).unwrap();
///
/// assert_eq!(handler.storage().keys(), ["tree-state.theme"]);
/// ```
pub struct KeyValueCacheHandler<S> {
    name: String,
    storage: S,
}

impl<S: KeyValueStorage> KeyValueCacheHandler<S> {
    /// A handler registered under the name `kv`.
    pub fn new(storage: S) -> Self {
        Self::with_name(DEFAULT_NAME, storage)
    }

    pub fn with_name(name: impl Into<String>, storage: S) -> Self {
        KeyValueCacheHandler {
            name: name.into(),
            storage,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn prefix(store: &Store) -> Vec<String> {
        let mut prefix = vec![KEY_PREFIX.to_string()];
        if let Some(name) = store.config().cache.name.as_deref().filter(|n| !n.is_empty()) {
            prefix.push(name.to_string());
        }
        prefix
    }

    fn key(prefix: &[String], path: &[String]) -> String {
        let mut full = prefix.to_vec();
        full.extend(path.iter().cloned());
        format_dotted(&full)
    }

    /// Remove the entry at `path` and every entry below it.
    fn unset(&self, prefix: &[String], path: &[String]) -> Result<(), CacheError> {
        let key = Self::key(prefix, path);
        for (stored, _) in self.storage.scan(&key)? {
            if is_under(&stored, &key) {
                self.storage.delete(&stored)?;
            }
        }
        Ok(())
    }

    /// Replace whatever is stored at `path` with `value`.
    fn write(&self, prefix: &[String], path: &mut Vec<String>, value: &StateValue) -> Result<(), CacheError> {
        self.unset(prefix, path)?;
        self.put(prefix, path, value)
    }

    fn put(&self, prefix: &[String], path: &mut Vec<String>, value: &StateValue) -> Result<(), CacheError> {
        match value {
            StateValue::Null | StateValue::Atomic(_) => Ok(()),
            StateValue::Object(obj) => self.put_fields(prefix, path, obj),
            leaf => {
                if path.is_empty() {
                    return Err(CacheError::Unpersistable(format!(
                        "the state root must be an object, got {}",
                        leaf.kind()
                    )));
                }
                let Some(entry) = PersistedEntry::from_value(leaf) else {
                    return Ok(());
                };
                let bytes = serde_json::to_vec(&entry)?;
                self.storage.set(&Self::key(prefix, path), &bytes)
            }
        }
    }

    fn put_fields(&self, prefix: &[String], path: &mut Vec<String>, fields: &ObjectMap) -> Result<(), CacheError> {
        for (key, child) in fields {
            path.push(key.clone());
            let res = self.put(prefix, path, child);
            path.pop();
            res?;
        }
        Ok(())
    }

    fn persist(
        &self,
        store: &Store,
        prefix: &[String],
        path: &mut Vec<String>,
        change: &StateChange,
    ) -> Result<(), CacheError> {
        match change {
            StateChange::Merge(fields) => {
                for (key, child) in fields {
                    path.push(key.clone());
                    let res = self.persist(store, prefix, path, child);
                    path.pop();
                    res?;
                }
                Ok(())
            }
            StateChange::Replace(fields) => {
                self.unset(prefix, path)?;
                self.put_fields(prefix, path, fields)
            }
            StateChange::Leaf(value) => self.write(prefix, path, value),
            StateChange::Array(_) => {
                let array = store
                    .get(&Path::from_keys(path.iter().cloned()))
                    .map_err(|e| CacheError::Unpersistable(e.to_string()))?;
                self.write(prefix, path, &array)
            }
        }
    }
}

impl<S: KeyValueStorage> CacheHandler for KeyValueCacheHandler<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, store: &Store) -> Result<StateValue, CacheError> {
        let prefix = Self::prefix(store);
        let base = format!("{}.", format_dotted(&prefix));
        let mut partial = StateValue::object();

        for (key, bytes) in self.storage.scan(&base)? {
            let path = parse_dotted(&key[base.len()..]);
            let decoded = serde_json::from_slice::<PersistedEntry>(&bytes)
                .map_err(|e| e.to_string())
                .and_then(|entry| entry.into_value().ok_or_else(|| "value does not match its type tag".to_string()));
            match decoded {
                Ok(value) => set_at(&mut partial, &path, value),
                Err(error) => warn!(handler = %self.name, key = %key, error = %error, "skipping unreadable cache entry"),
            }
        }

        debug!(handler = %self.name, "loaded cached state");
        Ok(partial)
    }

    fn set(&self, change: &StateChange, store: &Store) -> Result<(), CacheError> {
        let prefix = Self::prefix(store);
        self.persist(store, &prefix, &mut Vec::new(), change)
    }
}

fn set_at(root: &mut StateValue, path: &[String], value: StateValue) {
    let Some((last, init)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for key in init {
        current = current
            .ensure_object()
            .entry(key.clone())
            .or_insert(StateValue::Null);
    }
    current.ensure_object().insert(last.clone(), value);
}
