//! Reactive, path-addressed state container.
//!
//! A [`Store`] owns one state tree. Callers subscribe to sub-paths of the
//! tree and apply structured [`StateChange`]s: merges, replacements and
//! array operations. After every change each subscription whose value moved
//! is notified, and changes routed to a named [`cache::CacheHandler`] are
//! mirrored to an external store, which seeds the state again on the next
//! start.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use serde_json::json;
//! use tree_state::{ArrayOp, StateChange, Store, SubscribeOptions};
//! use tree_state_path::Path;
//! use tree_state_util::StateValue;
//!
//! let store = Store::default();
//! store.set(StateChange::from_json(&json!({"todos": [{"title": "write", "done": false}]})).unwrap()).unwrap();
//!
//! let fired = Rc::new(RefCell::new(0));
//! let counter = fired.clone();
//! let options = SubscribeOptions::default().initial_value(false).nested_changes(true);
//! store.subscribe_with(["todos"], options, move |_| *counter.borrow_mut() += 1).unwrap();
//!
//! let done = ArrayOp::update(0, StateChange::merge([("done", StateChange::leaf(true))]));
//! store.set(StateChange::merge([("todos", done.into())])).unwrap();
//!
//! assert_eq!(*fired.borrow(), 1);
//! assert_eq!(
//!     store.get(&Path::root().key("todos").index(0).key("done")).unwrap(),
//!     StateValue::from(true)
//! );
//! ```
//!
//! The crate logs through `tracing` and never installs a subscriber.

pub mod cache;
pub mod change;
pub mod config;
mod error;
pub mod reducer;
mod registry;
pub mod store;
pub mod subscription;

pub use cache::{CacheHandler, KeyValueCacheHandler, KeyValueStorage, MemoryStorage};
pub use change::{
    from_json, to_json, ArrayOp, ChangeMap, ComputeFn, ReducerMode, StateChange, UpdateValue,
    ARRAY_OPERATION_KEY, REDUCER_MODE_KEY,
};
pub use config::{CacheConfig, StoreConfig};
pub use error::{CacheError, StoreError};
pub use reducer::reduce;
pub use store::{GetOptions, Lookup, SetOptions, Store};
pub use subscription::{StateUpdate, SubscribeOptions, Subscription};
