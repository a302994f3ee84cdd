//! The persistence boundary.
//!
//! A [`CacheHandler`] is loaded once when the store is built, folding its
//! partial state into the initial state, and is handed every change a caller
//! routes to it by name. Handler failures never abort a mutation: the store
//! logs them and carries on in memory.

pub mod key_value;
pub mod storage;

pub use key_value::{EntryType, KeyValueCacheHandler, PersistedEntry, KEY_PREFIX};
pub use storage::{KeyValueStorage, MemoryStorage};

use tree_state_util::StateValue;

use crate::change::StateChange;
use crate::store::Store;
use crate::CacheError;

/// A named persistence participant.
pub trait CacheHandler {
    /// Name callers use in `SetOptions::cache_handler_name`.
    fn name(&self) -> &str;

    /// Partial state to fold into the initial state.
    fn load(&self, store: &Store) -> Result<StateValue, CacheError>;

    /// Persist `change`. Called once the change has been reduced, so `store`
    /// already shows the resulting state.
    fn set(&self, change: &StateChange, store: &Store) -> Result<(), CacheError>;
}
