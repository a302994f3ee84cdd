//! The store handle.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};
use tree_state_path::{resolve, Path, Resolution};
use tree_state_util::{deep_copy, StateValue};

use crate::cache::CacheHandler;
use crate::change::StateChange;
use crate::config::StoreConfig;
use crate::reducer::reduce;
use crate::registry::SubscriptionRegistry;
use crate::subscription::{Callback, Entry, StateUpdate, SubscribeOptions, Subscription};
use crate::StoreError;

/// Options for [`Store::set_with`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Persist the change through the cache handler registered under this name.
    pub cache_handler_name: Option<String>,
    /// Apply the change at this path instead of the root.
    pub entry_path: Option<Path>,
}

impl SetOptions {
    pub fn cache_handler(mut self, name: impl Into<String>) -> Self {
        self.cache_handler_name = Some(name.into());
        self
    }

    pub fn entry_path(mut self, path: impl Into<Path>) -> Self {
        self.entry_path = Some(path.into());
        self
    }
}

/// Options for [`Store::get_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Return a deep copy with fresh node identities.
    pub deep_copy: bool,
}

/// Owned counterpart of [`Resolution`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(StateValue),
    NotFound,
    Null,
}

impl From<Resolution<'_>> for Lookup {
    fn from(resolution: Resolution<'_>) -> Self {
        match resolution {
            Resolution::Found(value) => Lookup::Found(value.clone()),
            Resolution::NotFound => Lookup::NotFound,
            Resolution::Null => Lookup::Null,
        }
    }
}

struct Inner {
    state: RefCell<StateValue>,
    config: StoreConfig,
    handlers: IndexMap<String, Rc<dyn CacheHandler>>,
    registry: Rc<SubscriptionRegistry>,
}

/// A reactive, path-addressed state container.
///
/// `Store` is a cheap handle: clones share the same state, subscriptions and
/// cache handlers. Everything runs synchronously on the caller's thread;
/// callbacks may call back into the store.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use serde_json::json;
/// use tree_state::{StateChange, Store};
/// use tree_state_path::Path;
/// use tree_state_util::StateValue;
///
/// let store = Store::default();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let log = seen.clone();
/// store
///     .subscribe(["a", "b"], move |update| log.borrow_mut().push(update.current))
///     .unwrap();
///
/// store.set(StateChange::from_json(&json!({"a": {"b": 1}})).unwrap()).unwrap();
/// store.set(StateChange::from_json(&json!({"a": {"b": 1}})).unwrap()).unwrap();
/// store.set(StateChange::from_json(&json!({"a": {"b": 2}})).unwrap()).unwrap();
///
/// assert_eq!(*seen.borrow(), [StateValue::Null, StateValue::from(1), StateValue::from(2)]);
/// assert_eq!(store.get(&Path::from(["a", "b"])).unwrap(), StateValue::from(2));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<Inner>,
}

impl Default for Store {
    fn default() -> Self {
        Store::from_parts(StateValue::object(), StoreConfig::default(), IndexMap::new())
    }
}

impl Store {
    /// Build a store, folding each handler's `load` result into `initial` in
    /// registration order.
    ///
    /// A handler that fails to load is logged and skipped. Handlers sharing a
    /// name replace earlier ones in routing, but each is still loaded.
    ///
    /// # Errors
    ///
    /// Propagates reducer errors while folding loaded state.
    pub fn new(
        initial: StateValue,
        config: StoreConfig,
        handlers: Vec<Rc<dyn CacheHandler>>,
    ) -> Result<Store, StoreError> {
        let mut by_name = IndexMap::with_capacity(handlers.len());
        for handler in &handlers {
            if by_name.insert(handler.name().to_string(), handler.clone()).is_some() {
                warn!(handler = %handler.name(), "cache handler registered twice, the last one wins");
            }
        }
        let store = Store::from_parts(initial, config, by_name);

        for handler in &handlers {
            match handler.load(&store) {
                Ok(partial) if partial.is_null() => {}
                Ok(partial) => {
                    let change = StateChange::from_partial(partial);
                    reduce(&mut store.inner.state.borrow_mut(), &change)?;
                    debug!(handler = %handler.name(), "folded cached state");
                }
                Err(e) => {
                    warn!(handler = %handler.name(), error = %e, "cache handler failed to load");
                }
            }
        }

        Ok(store)
    }

    fn from_parts(
        initial: StateValue,
        config: StoreConfig,
        handlers: IndexMap<String, Rc<dyn CacheHandler>>,
    ) -> Store {
        Store {
            inner: Rc::new(Inner {
                state: RefCell::new(initial),
                config,
                handlers,
                registry: Rc::new(SubscriptionRegistry::default()),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Names of the registered cache handlers, in registration order.
    pub fn cache_handler_names(&self) -> Vec<&str> {
        self.inner.handlers.keys().map(String::as_str).collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// Reduce `change` into the state and notify subscribers.
    pub fn set(&self, change: StateChange) -> Result<(), StoreError> {
        self.set_with(change, SetOptions::default())
    }

    /// Reduce `change` into the state and notify subscribers.
    ///
    /// With `entry_path` the change is first nested so that it applies at
    /// that path. The change is reduced into a copy of the state that only
    /// replaces the live state once the whole change succeeded. Computed
    /// values run against that copy, so they may read the store.
    ///
    /// With `cache_handler_name` the committed change is then handed to that
    /// handler; an unknown name or a handler failure is logged and the change
    /// stays applied in memory.
    ///
    /// # Errors
    ///
    /// - `StoreError::IndexOutOfBounds` from an `update` past the end of a
    ///   sequence. Nothing is applied, persisted or notified.
    /// - `StoreError::Path` when a subscription's path no longer matches the
    ///   shape of the tree (the change is applied and other subscribers are
    ///   still notified)
    pub fn set_with(&self, change: StateChange, options: SetOptions) -> Result<(), StoreError> {
        let change = match &options.entry_path {
            Some(path) => change.wrap_at(path),
            None => change,
        };

        let mut next = self.inner.state.borrow().clone();
        reduce(&mut next, &change)?;
        *self.inner.state.borrow_mut() = next;

        if let Some(name) = options.cache_handler_name.as_deref() {
            self.persist(name, &change);
        }

        self.inner.registry.on_mutation(&self.inner.state, &change)
    }

    fn persist(&self, name: &str, change: &StateChange) {
        let Some(handler) = self.inner.handlers.get(name).cloned() else {
            warn!(handler = %name, "cache handler is not registered, change will not be persisted");
            return;
        };
        if let Err(e) = handler.set(change, self) {
            warn!(handler = %name, error = %e, "failed to persist change");
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// The value at `path`, `Null` when absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Path` when `path` does not match the tree's shape.
    pub fn get(&self, path: &Path) -> Result<StateValue, StoreError> {
        self.get_with(path, GetOptions::default())
    }

    pub fn get_with(&self, path: &Path, options: GetOptions) -> Result<StateValue, StoreError> {
        let state = self.inner.state.borrow();
        let value = resolve(&state, path)?.cloned_or_null();
        Ok(if options.deep_copy {
            deep_copy(&value)
        } else {
            value
        })
    }

    /// Like [`Store::get`], keeping "not found" and "null" apart.
    pub fn lookup(&self, path: &Path) -> Result<Lookup, StoreError> {
        let state = self.inner.state.borrow();
        Ok(Lookup::from(resolve(&state, path)?))
    }

    // ── Subscriptions ─────────────────────────────────────────────────────

    /// Subscribe with the store's default options.
    pub fn subscribe(
        &self,
        path: impl Into<Path>,
        callback: impl Fn(StateUpdate) + 'static,
    ) -> Result<Subscription, StoreError> {
        self.subscribe_with(path, self.inner.config.default_subscribe_options, callback)
    }

    /// Subscribe to the value at `path`.
    ///
    /// With `get_initial_value` the callback runs once before this returns.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Path` when `path` does not match the tree's shape.
    pub fn subscribe_with(
        &self,
        path: impl Into<Path>,
        options: SubscribeOptions,
        callback: impl Fn(StateUpdate) + 'static,
    ) -> Result<Subscription, StoreError> {
        let path = path.into();
        let callback: Callback = Rc::new(callback);
        let (entry, initial) = {
            let state = self.inner.state.borrow();
            let resolution = resolve(&state, &path)?;
            Entry::new(path, options, callback, resolution)
        };

        self.inner.registry.register(entry.clone());
        if let Some(update) = initial {
            entry.notify(update);
        }
        Ok(Subscription::new(entry, Rc::downgrade(&self.inner.registry)))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("cache_handlers", &self.cache_handler_names())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
