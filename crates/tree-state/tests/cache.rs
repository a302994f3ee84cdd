use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tree_state::{
    CacheError, CacheHandler, KeyValueCacheHandler, KeyValueStorage, MemoryStorage, SetOptions,
    StateChange, Store, StoreConfig,
};
use tree_state_path::Path;
use tree_state_util::StateValue;

/// Handler returning a fixed partial state and refusing every write.
struct Fixed {
    name: &'static str,
    partial: serde_json::Value,
}

impl CacheHandler for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    fn load(&self, _store: &Store) -> Result<StateValue, CacheError> {
        Ok(StateValue::from(&self.partial))
    }

    fn set(&self, _change: &StateChange, _store: &Store) -> Result<(), CacheError> {
        Err(CacheError::Storage("read-only".into()))
    }
}

struct Broken;

impl CacheHandler for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn load(&self, _store: &Store) -> Result<StateValue, CacheError> {
        Err(CacheError::Storage("disk gone".into()))
    }

    fn set(&self, _change: &StateChange, _store: &Store) -> Result<(), CacheError> {
        Ok(())
    }
}

fn fixed(name: &'static str, partial: serde_json::Value) -> Rc<dyn CacheHandler> {
    Rc::new(Fixed { name, partial })
}

// ── Log capture ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn with_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, captured.text())
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[test]
fn cache_load_seeds_state() {
    let store = Store::new(
        StateValue::object(),
        StoreConfig::default(),
        vec![fixed("fixed", json!({"a": {"b": 5}}))],
    )
    .unwrap();
    assert_eq!(store.get(&Path::from(["a", "b"])).unwrap(), StateValue::from(5));
}

#[test]
fn loads_fold_in_registration_order() {
    let store = Store::new(
        StateValue::from(json!({"c": 3})),
        StoreConfig::default(),
        vec![
            fixed("first", json!({"a": 1, "b": {"x": 1}})),
            fixed("second", json!({"a": 2, "b": {"y": 2}})),
        ],
    )
    .unwrap();
    assert_eq!(
        store.get(&Path::root()).unwrap(),
        StateValue::from(json!({"c": 3, "a": 2, "b": {"x": 1, "y": 2}}))
    );
    assert_eq!(store.cache_handler_names(), ["first", "second"]);
}

#[test]
fn failing_load_is_logged_and_skipped() {
    let (store, logs) = with_logs(|| {
        Store::new(
            StateValue::from(json!({"a": 1})),
            StoreConfig::default(),
            vec![Rc::new(Broken) as Rc<dyn CacheHandler>],
        )
    });
    assert_eq!(store.unwrap().get(&Path::from(["a"])).unwrap(), StateValue::from(1));
    assert!(logs.contains("cache handler failed to load"), "{logs}");
    assert!(logs.contains("disk gone"), "{logs}");
}

#[test]
fn unknown_cache_handler_is_warned_and_change_applied() {
    let store = Store::default();
    let (result, logs) = with_logs(|| {
        store.set_with(
            StateChange::from_json(&json!({"a": 1})).unwrap(),
            SetOptions::default().cache_handler("missing"),
        )
    });
    result.unwrap();
    assert_eq!(store.get(&Path::from(["a"])).unwrap(), StateValue::from(1));
    assert!(logs.contains("WARN"), "{logs}");
    assert!(!logs.contains("ERROR"), "{logs}");
    assert!(logs.contains("cache handler is not registered"), "{logs}");
    assert!(logs.contains("missing"), "{logs}");
}

#[test]
fn persistence_failure_does_not_abort_mutation() {
    let store = Store::new(StateValue::object(), StoreConfig::default(), vec![fixed("fixed", json!({}))]).unwrap();
    let (result, logs) = with_logs(|| {
        store.set_with(
            StateChange::merge([("k", StateChange::leaf("v"))]),
            SetOptions::default().cache_handler("fixed"),
        )
    });
    result.unwrap();
    assert_eq!(store.get(&Path::from(["k"])).unwrap(), StateValue::from("v"));
    assert!(logs.contains("failed to persist change"), "{logs}");
    assert!(logs.contains("read-only"), "{logs}");
}

#[test]
fn key_value_state_survives_a_restart() {
    let storage = Rc::new(MemoryStorage::new());
    let handler = KeyValueCacheHandler::new(storage.clone());
    let store = Store::new(
        StateValue::object(),
        StoreConfig::default(),
        vec![Rc::new(handler) as Rc<dyn CacheHandler>],
    )
    .unwrap();
    let persist = SetOptions::default().cache_handler("kv");

    store
        .set_with(
            StateChange::from_json(&json!({
                "settings": {"theme": "dark", "fontSize": 14, "compact": false},
                "recent": ["a.txt"]
            }))
            .unwrap(),
            persist.clone(),
        )
        .unwrap();
    store
        .set_with(
            StateChange::from_json(&json!({"recent": {"_arrayOperation": "push", "at": 0, "value": "b.txt"}}))
                .unwrap(),
            persist.clone(),
        )
        .unwrap();
    store
        .set_with(StateChange::leaf("light"), persist.entry_path(Path::from(["settings", "theme"])))
        .unwrap();
    // Not routed to the handler, so memory only.
    store.set(StateChange::from_json(&json!({"session": "abc"})).unwrap()).unwrap();

    assert_eq!(storage.len(), 4);

    let reloaded = Store::new(
        StateValue::object(),
        StoreConfig::default(),
        vec![Rc::new(KeyValueCacheHandler::new(storage)) as Rc<dyn CacheHandler>],
    )
    .unwrap();
    assert_eq!(
        reloaded.get(&Path::root()).unwrap(),
        StateValue::from(json!({
            "recent": ["b.txt", "a.txt"],
            "settings": {"compact": false, "fontSize": 14, "theme": "light"}
        }))
    );
}

#[test]
fn named_caches_do_not_see_each_other() {
    let storage = Rc::new(MemoryStorage::new());
    storage
        .set("tree-state.other.a", br#"{"v":1,"t":"number"}"#)
        .unwrap();
    storage.set("tree-state.mine.a", br#"{"v":2,"t":"number"}"#).unwrap();

    let mut config = StoreConfig::default();
    config.cache.name = Some("mine".into());
    let store = Store::new(
        StateValue::object(),
        config,
        vec![Rc::new(KeyValueCacheHandler::new(storage)) as Rc<dyn CacheHandler>],
    )
    .unwrap();
    assert_eq!(store.get(&Path::root()).unwrap(), StateValue::from(json!({"a": 2})));
}
